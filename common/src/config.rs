//! 設定管理
//!
//! McpConfig設定構造体

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::CommonError;
use crate::protocol::ServiceEntry;

/// タイマー間隔の上限（秒）。1年
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// MCP設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpConfig {
    /// 基本レート（秒）。個別の間隔が未指定の場合に使用する (デフォルト: 1)
    #[serde(default = "default_rate")]
    pub rate_secs: u64,

    /// ヘルスチェック間隔（秒）。未指定ならレートから算出
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_interval_secs: Option<u64>,

    /// ディスカバリ間隔（秒）。未指定ならレートから算出
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_interval_secs: Option<u64>,

    /// 外部サービスレジストリのURL。未指定なら`services`を静的に使用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,

    /// レジストリ問い合わせのタイムアウト（秒）(デフォルト: 10)
    #[serde(default = "default_registry_timeout")]
    pub registry_timeout_secs: u64,

    /// 1エンドポイントあたりのプローブタイムアウト（ミリ秒）(デフォルト: 2000)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// シャットダウン時に実行中タスクを待つ最大時間（秒）(デフォルト: 5)
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    /// 静的に定義されたサービス一覧
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
}

fn default_rate() -> u64 {
    1
}

fn default_registry_timeout() -> u64 {
    10
}

fn default_probe_timeout() -> u64 {
    2000
}

fn default_shutdown_grace() -> u64 {
    5
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            rate_secs: default_rate(),
            health_check_interval_secs: None,
            discovery_interval_secs: None,
            registry_url: None,
            registry_timeout_secs: default_registry_timeout(),
            probe_timeout_ms: default_probe_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
            services: Vec::new(),
        }
    }
}

impl McpConfig {
    /// JSON設定ファイルを読み込む
    pub fn from_file(path: &Path) -> Result<Self, CommonError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CommonError::Config(format!("{}: {}", path.display(), e)))?;
        let config: McpConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// レートから算出した基本間隔（最小1秒）
    fn rate_interval(&self) -> Duration {
        Duration::from_secs(self.rate_secs.max(1))
    }

    /// ヘルスチェック間隔
    pub fn health_check_interval(&self) -> Duration {
        self.health_check_interval_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.rate_interval())
    }

    /// ディスカバリ間隔
    pub fn discovery_interval(&self) -> Duration {
        self.discovery_interval_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.rate_interval())
    }

    /// レジストリ問い合わせのタイムアウト
    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_timeout_secs)
    }

    /// プローブタイムアウト
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// シャットダウン猶予
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// 設定値を検証
    pub fn validate(&self) -> Result<(), CommonError> {
        if self.rate_secs > MAX_INTERVAL_SECS {
            return Err(CommonError::Validation(format!(
                "rate must not exceed {} seconds",
                MAX_INTERVAL_SECS
            )));
        }
        check_interval("health check interval", self.health_check_interval_secs)?;
        check_interval("discovery interval", self.discovery_interval_secs)?;
        if self.registry_timeout_secs == 0 {
            return Err(CommonError::Validation(
                "registry timeout must be greater than zero".to_string(),
            ));
        }
        if self.probe_timeout_ms == 0 {
            return Err(CommonError::Validation(
                "probe timeout must be greater than zero".to_string(),
            ));
        }
        if let Some(url) = &self.registry_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(CommonError::Validation(format!(
                    "registry url must start with http:// or https://: {}",
                    url
                )));
            }
        }
        Ok(())
    }
}

fn check_interval(label: &str, secs: Option<u64>) -> Result<(), CommonError> {
    match secs {
        Some(0) => Err(CommonError::Validation(format!(
            "{} must be greater than zero",
            label
        ))),
        Some(secs) if secs > MAX_INTERVAL_SECS => Err(CommonError::Validation(format!(
            "{} must not exceed {} seconds",
            label, MAX_INTERVAL_SECS
        ))),
        _ => Ok(()),
    }
}

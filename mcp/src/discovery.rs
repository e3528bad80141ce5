//! サービスディスカバリ
//!
//! 外部サービスレジストリからカタログを取得し、ローカルレジストリを更新する。
//! 取得・検証のいずれかで失敗した場合、ローカルレジストリには一切書き込まない。

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use service_mcp_common::protocol::ServiceCatalog;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::{McpError, McpResult};
use crate::registry::{ReplaceSummary, ServiceRegistry};

/// ディスカバリエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// レジストリに接続できない（タイムアウト含む）
    #[error("Registry unreachable: {0}")]
    Unreachable(String),

    /// レジストリが異常ステータスを返した
    #[error("Registry returned status {0}")]
    Status(u16),

    /// レスポンスが不正
    #[error("Malformed registry response: {0}")]
    Malformed(String),
}

/// サービスカタログの取得元
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// 現在のカタログを取得
    async fn fetch_catalog(&self) -> Result<ServiceCatalog, DiscoveryError>;

    /// ログ用の取得元表記
    fn describe(&self) -> String;
}

/// HTTP/JSONのサービスレジストリ
///
/// `GET {base_url}/services`で[`ServiceCatalog`]を取得する。
#[derive(Debug, Clone)]
pub struct HttpRegistrySource {
    client: Client,
    url: String,
}

impl HttpRegistrySource {
    /// 新しい取得元を作成
    pub fn new(base_url: &str, timeout: Duration) -> McpResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| McpError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/services", base_url.trim_end_matches('/')),
        })
    }

    /// 問い合わせ先URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RegistrySource for HttpRegistrySource {
    async fn fetch_catalog(&self) -> Result<ServiceCatalog, DiscoveryError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| DiscoveryError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DiscoveryError::Unreachable(e.to_string()))?;

        serde_json::from_slice(&body).map_err(|e| DiscoveryError::Malformed(e.to_string()))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// 固定のカタログを返す取得元（設定ファイルの静的定義用）
#[derive(Debug, Clone, Default)]
pub struct StaticRegistrySource {
    catalog: ServiceCatalog,
}

impl StaticRegistrySource {
    /// 新しい取得元を作成
    pub fn new(catalog: ServiceCatalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl RegistrySource for StaticRegistrySource {
    async fn fetch_catalog(&self) -> Result<ServiceCatalog, DiscoveryError> {
        Ok(self.catalog.clone())
    }

    fn describe(&self) -> String {
        format!("static ({} services)", self.catalog.services.len())
    }
}

/// 1回のディスカバリの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// 取得したサービス数
    pub discovered: usize,
    /// レジストリへの反映内容
    pub summary: ReplaceSummary,
}

/// ディスカバリエージェント
#[derive(Clone)]
pub struct Discoverer {
    registry: ServiceRegistry,
    source: Arc<dyn RegistrySource>,
}

impl Discoverer {
    /// 新しいDiscovererを作成
    pub fn new(registry: ServiceRegistry, source: Arc<dyn RegistrySource>) -> Self {
        Self { registry, source }
    }

    /// 更新対象のレジストリ
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// ディスカバリを1回実行
    pub async fn discover(&self) -> Result<DiscoveryReport, DiscoveryError> {
        debug!(source = %self.source.describe(), "Discovering services");

        let catalog = self.source.fetch_catalog().await?;
        validate_catalog(&catalog)?;

        let seen_at = Utc::now();
        let discovered = catalog.services.len();
        let services = catalog
            .services
            .into_iter()
            .map(|entry| entry.into_service_info(seen_at))
            .collect();
        let summary = self.registry.replace_all(services).await;

        if summary.added + summary.changed + summary.removed > 0 {
            info!(
                discovered,
                added = summary.added,
                changed = summary.changed,
                removed = summary.removed,
                "Service registry updated"
            );
        } else {
            debug!(discovered, "Service registry unchanged");
        }

        Ok(DiscoveryReport {
            discovered,
            summary,
        })
    }
}

/// カタログを検証
///
/// 名前・アドレスが空、ポートが0、名前の重複はいずれも不正とする。
fn validate_catalog(catalog: &ServiceCatalog) -> Result<(), DiscoveryError> {
    let mut names = HashSet::with_capacity(catalog.services.len());
    for entry in &catalog.services {
        if entry.name.trim().is_empty() {
            return Err(DiscoveryError::Malformed(
                "service with empty name".to_string(),
            ));
        }
        if entry.address.trim().is_empty() {
            return Err(DiscoveryError::Malformed(format!(
                "service '{}' has an empty address",
                entry.name
            )));
        }
        if entry.port == 0 {
            return Err(DiscoveryError::Malformed(format!(
                "service '{}' has port 0",
                entry.name
            )));
        }
        if !names.insert(entry.name.as_str()) {
            return Err(DiscoveryError::Malformed(format!(
                "duplicate service name '{}'",
                entry.name
            )));
        }
    }
    Ok(())
}

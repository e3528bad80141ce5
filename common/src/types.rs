//! 共通型定義
//!
//! ServiceInfo, ServiceStatus, Protocol等のコアデータ型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// エンドポイントのプロトコル
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP接続のみで疎通確認する
    #[default]
    Tcp,
    /// HTTP GETで疎通確認する
    Http,
}

impl Protocol {
    /// Protocolを文字列に変換
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Http => "http",
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "http" => Ok(Self::Http),
            other => Err(format!("unknown protocol: {}", other)),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// サービスのヘルス状態
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// 初期状態（未確認）
    #[default]
    Unknown,
    /// 稼働中
    Healthy,
    /// 応答なし
    Unhealthy,
}

impl ServiceStatus {
    /// ServiceStatusを文字列に変換
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// ローカルレジストリが保持するサービス情報
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceInfo {
    /// サービス名（レジストリ内で一意）
    pub name: String,
    /// 説明
    #[serde(default)]
    pub description: String,
    /// ホスト名またはIPアドレス
    pub address: String,
    /// ポート番号
    pub port: u16,
    /// プロトコル
    #[serde(default)]
    pub protocol: Protocol,
    /// HTTPヘルスチェックのパス（`Protocol::Http`のみ使用）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_path: Option<String>,
    /// ヘルス状態
    #[serde(default)]
    pub status: ServiceStatus,
    /// 連続失敗回数
    #[serde(default)]
    pub consecutive_failures: u32,
    /// ディスカバリで最後に確認された時刻
    pub last_seen: DateTime<Utc>,
    /// 最終ヘルスチェック時刻
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

impl ServiceInfo {
    /// 新しいサービス情報を作成（ヘルス状態は未確認）
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            address: address.into(),
            port,
            protocol: Protocol::Tcp,
            health_path: None,
            status: ServiceStatus::Unknown,
            consecutive_failures: 0,
            last_seen: Utc::now(),
            last_checked: None,
        }
    }

    /// 説明を設定
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// HTTPヘルスチェックを設定
    pub fn with_http_health(mut self, path: impl Into<String>) -> Self {
        self.protocol = Protocol::Http;
        self.health_path = Some(path.into());
        self
    }

    /// `address:port`形式のエンドポイント文字列
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// 接続先（アドレス・ポート・プロトコル）が同一か
    pub fn same_endpoint(&self, other: &ServiceInfo) -> bool {
        self.address == other.address
            && self.port == other.port
            && self.protocol == other.protocol
            && self.health_path == other.health_path
    }
}

impl std::fmt::Display for ServiceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}://{}, {})",
            self.name,
            self.protocol,
            self.endpoint(),
            self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_from_str() {
        assert_eq!("tcp".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("HTTP".parse::<Protocol>().unwrap(), Protocol::Http);
        assert!("udp".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_service_info_defaults() {
        let info = ServiceInfo::new("users", "10.0.0.5", 8080);
        assert_eq!(info.status, ServiceStatus::Unknown);
        assert_eq!(info.protocol, Protocol::Tcp);
        assert_eq!(info.consecutive_failures, 0);
        assert_eq!(info.endpoint(), "10.0.0.5:8080");
        assert!(info.last_checked.is_none());
    }

    #[test]
    fn test_same_endpoint_ignores_health_fields() {
        let a = ServiceInfo::new("users", "10.0.0.5", 8080);
        let mut b = a.clone().with_description("moved description");
        b.status = ServiceStatus::Unhealthy;
        b.consecutive_failures = 3;
        assert!(a.same_endpoint(&b));

        let c = ServiceInfo::new("users", "10.0.0.5", 8081);
        assert!(!a.same_endpoint(&c));

        let d = a.clone().with_http_health("/health");
        assert!(!a.same_endpoint(&d));
    }

    #[test]
    fn test_service_status_serialization() {
        let json = serde_json::to_string(&ServiceStatus::Unhealthy).unwrap();
        assert_eq!(json, "\"unhealthy\"");
    }
}

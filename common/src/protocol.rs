//! 通信プロトコル定義
//!
//! MCP↔外部サービスレジストリ間の通信メッセージ

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Protocol, ServiceInfo, ServiceStatus};

/// サービスカタログ（`GET /services`のレスポンス）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServiceCatalog {
    /// 登録済みサービス一覧
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
}

/// カタログ内の1サービス
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceEntry {
    /// サービス名
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
    /// HTTPヘルスチェックのパス
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_path: Option<String>,
}

impl ServiceEntry {
    /// ローカルレジストリ用のServiceInfoへ変換
    ///
    /// ヘルス状態は未確認から始まる。既存エントリとの統合はレジストリ側で行う。
    pub fn into_service_info(self, seen_at: DateTime<Utc>) -> ServiceInfo {
        ServiceInfo {
            name: self.name,
            description: self.description,
            address: self.address,
            port: self.port,
            protocol: self.protocol,
            health_path: self.health_path,
            status: ServiceStatus::Unknown,
            consecutive_failures: 0,
            last_seen: seen_at,
            last_checked: None,
        }
    }
}

impl From<&ServiceInfo> for ServiceEntry {
    fn from(info: &ServiceInfo) -> Self {
        Self {
            name: info.name.clone(),
            description: info.description.clone(),
            address: info.address.clone(),
            port: info.port,
            protocol: info.protocol,
            health_path: info.health_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_deserialization_applies_defaults() {
        let json = r#"{"services":[{"name":"users","address":"10.0.0.5","port":8080}]}"#;
        let catalog: ServiceCatalog = serde_json::from_str(json).unwrap();

        assert_eq!(catalog.services.len(), 1);
        let entry = &catalog.services[0];
        assert_eq!(entry.protocol, Protocol::Tcp);
        assert_eq!(entry.description, "");
        assert!(entry.health_path.is_none());
    }

    #[test]
    fn test_empty_catalog() {
        let catalog: ServiceCatalog = serde_json::from_str("{}").unwrap();
        assert!(catalog.services.is_empty());
    }

    #[test]
    fn test_into_service_info() {
        let entry = ServiceEntry {
            name: "orders".to_string(),
            description: "order api".to_string(),
            address: "orders.local".to_string(),
            port: 9000,
            protocol: Protocol::Http,
            health_path: Some("/healthz".to_string()),
        };
        let now = Utc::now();
        let info = entry.into_service_info(now);

        assert_eq!(info.name, "orders");
        assert_eq!(info.protocol, Protocol::Http);
        assert_eq!(info.health_path.as_deref(), Some("/healthz"));
        assert_eq!(info.status, ServiceStatus::Unknown);
        assert_eq!(info.last_seen, now);
    }
}

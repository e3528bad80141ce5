//! テスト用のレジストリ取得元・プローブ

#![allow(dead_code)]

use async_trait::async_trait;
use service_mcp::discovery::{DiscoveryError, RegistrySource};
use service_mcp::health::{HealthProbe, ProbeError};
use service_mcp_common::protocol::{ServiceCatalog, ServiceEntry};
use service_mcp_common::types::{Protocol, ServiceInfo};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// テスト用のカタログエントリ
pub fn entry(name: &str, port: u16) -> ServiceEntry {
    ServiceEntry {
        name: name.to_string(),
        description: format!("{} service", name),
        address: "127.0.0.1".to_string(),
        port,
        protocol: Protocol::Tcp,
        health_path: None,
    }
}

/// 応答までに`delay`かかる取得元
pub struct SlowSource {
    pub delay: Duration,
    pub catalog: ServiceCatalog,
    pub calls: AtomicUsize,
}

impl SlowSource {
    pub fn new(delay: Duration, services: Vec<ServiceEntry>) -> Self {
        Self {
            delay,
            catalog: ServiceCatalog { services },
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RegistrySource for SlowSource {
    async fn fetch_catalog(&self) -> Result<ServiceCatalog, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.catalog.clone())
    }

    fn describe(&self) -> String {
        "slow".to_string()
    }
}

/// 常に到達不能を返す取得元
pub struct UnreachableSource;

#[async_trait]
impl RegistrySource for UnreachableSource {
    async fn fetch_catalog(&self) -> Result<ServiceCatalog, DiscoveryError> {
        Err(DiscoveryError::Unreachable("connection refused".to_string()))
    }

    fn describe(&self) -> String {
        "unreachable".to_string()
    }
}

/// 実行中のプローブ数を記録するプローブ
#[derive(Default)]
pub struct TrackingProbe {
    pub delay: Duration,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub total: AtomicUsize,
}

impl TrackingProbe {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }
}

#[async_trait]
impl HealthProbe for TrackingProbe {
    async fn probe(&self, _service: &ServiceInfo) -> Result<(), ProbeError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//! ヘルスチェック
//!
//! レジストリに登録された全エンドポイントをプローブし、結果をレジストリに反映する。
//! スイープ全体はミューテックスで直列化される（重なったスイープは待機し、破棄されない）。
//! 1エンドポイントの失敗は他のエンドポイントのチェックを中断しない。

use async_trait::async_trait;
use reqwest::Client;
use service_mcp_common::types::{Protocol, ServiceInfo};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::error::{McpError, McpResult};
use crate::registry::{HealthRecord, ServiceRegistry};

/// HTTPヘルスチェックのデフォルトパス
const DEFAULT_HEALTH_PATH: &str = "/";

/// プローブエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// タイムアウト
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    /// 接続失敗
    #[error("Connection failed: {0}")]
    Connect(String),

    /// 異常ステータス
    #[error("Unhealthy status {0}")]
    Status(u16),

    /// プローブタスク自体が異常終了した
    #[error("Probe task failed: {0}")]
    Task(String),
}

/// エンドポイントのプローブ
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// 1エンドポイントを確認する。到達可能なら`Ok(())`
    async fn probe(&self, service: &ServiceInfo) -> Result<(), ProbeError>;
}

/// 何もしないプローブ（常に成功）
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProbe;

#[async_trait]
impl HealthProbe for NoopProbe {
    async fn probe(&self, _service: &ServiceInfo) -> Result<(), ProbeError> {
        Ok(())
    }
}

/// TCP接続のみで確認するプローブ
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn probe(&self, service: &ServiceInfo) -> Result<(), ProbeError> {
        TcpStream::connect((service.address.as_str(), service.port))
            .await
            .map(|_| ())
            .map_err(|e| ProbeError::Connect(e.to_string()))
    }
}

/// HTTP GETで確認するプローブ（2xxを正常とみなす）
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    /// 新しいプローブを作成
    pub fn new() -> McpResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| McpError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn url(service: &ServiceInfo) -> String {
        let path = service.health_path.as_deref().unwrap_or(DEFAULT_HEALTH_PATH);
        if path.starts_with('/') {
            format!("http://{}{}", service.endpoint(), path)
        } else {
            format!("http://{}/{}", service.endpoint(), path)
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, service: &ServiceInfo) -> Result<(), ProbeError> {
        let response = self
            .client
            .get(Self::url(service))
            .send()
            .await
            .map_err(|e| ProbeError::Connect(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status(status.as_u16()))
        }
    }
}

/// サービスのプロトコルに応じてTCP/HTTPを切り替えるプローブ
#[derive(Debug, Clone)]
pub struct ProtocolProbe {
    tcp: TcpProbe,
    http: HttpProbe,
}

impl ProtocolProbe {
    /// 新しいプローブを作成
    pub fn new() -> McpResult<Self> {
        Ok(Self {
            tcp: TcpProbe,
            http: HttpProbe::new()?,
        })
    }
}

#[async_trait]
impl HealthProbe for ProtocolProbe {
    async fn probe(&self, service: &ServiceInfo) -> Result<(), ProbeError> {
        match service.protocol {
            Protocol::Tcp => self.tcp.probe(service).await,
            Protocol::Http => self.http.probe(service).await,
        }
    }
}

/// 1回のスイープの結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// チェックしたエンドポイント数
    pub checked: usize,
    /// 正常
    pub healthy: usize,
    /// 異常
    pub unhealthy: usize,
    /// プローブ中に変更・削除されたため反映しなかった数
    pub discarded: usize,
}

/// ヘルスチェッカー
#[derive(Clone)]
pub struct HealthChecker {
    registry: ServiceRegistry,
    probe: Arc<dyn HealthProbe>,
    probe_timeout: Duration,
    lock: Arc<Mutex<()>>,
}

impl HealthChecker {
    /// 新しいヘルスチェッカーを作成
    pub fn new(
        registry: ServiceRegistry,
        probe: Arc<dyn HealthProbe>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            probe,
            probe_timeout,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// 全エンドポイントを1回チェック
    ///
    /// 先行するスイープが実行中なら、その完了を待ってから実行する（到着順）。
    pub async fn run_sweep(&self) -> SweepReport {
        let _guard = self.lock.lock().await;

        let services = self.registry.list().await;
        if services.is_empty() {
            debug!("No services to health check");
            return SweepReport::default();
        }

        let mut probes = JoinSet::new();
        let mut pending = HashMap::with_capacity(services.len());
        for service in services {
            let probe = self.probe.clone();
            let probe_timeout = self.probe_timeout;
            let target = service.clone();
            let handle = probes.spawn(async move {
                match tokio::time::timeout(probe_timeout, probe.probe(&target)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProbeError::Timeout(probe_timeout)),
                }
            });
            pending.insert(handle.id(), service);
        }

        let mut report = SweepReport::default();
        while let Some(joined) = probes.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => {
                    error!("Health probe task failed: {}", e);
                    (e.id(), Err(ProbeError::Task(e.to_string())))
                }
            };
            let Some(service) = pending.remove(&id) else {
                continue;
            };
            report.checked += 1;

            if let Err(e) = &result {
                debug!(
                    service = %service.name,
                    endpoint = %service.endpoint(),
                    error = %e,
                    "Health check failed"
                );
            }

            match self.registry.record_health(&service, result.is_ok()).await {
                Ok(HealthRecord::Applied(_)) if result.is_ok() => report.healthy += 1,
                Ok(HealthRecord::Applied(_)) => report.unhealthy += 1,
                Ok(HealthRecord::Stale) | Err(McpError::ServiceNotFound(_)) => {
                    report.discarded += 1
                }
                Err(e) => {
                    error!(service = %service.name, "Failed to record health: {}", e);
                    report.discarded += 1;
                }
            }
        }

        if report.unhealthy > 0 {
            info!(
                checked = report.checked,
                healthy = report.healthy,
                unhealthy = report.unhealthy,
                "Health check completed with failures"
            );
        } else {
            debug!(checked = report.checked, "Health check completed");
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_mcp_common::types::ServiceStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// 名前が"bad"で始まるサービスだけ失敗するプローブ
    struct SelectiveProbe;

    #[async_trait]
    impl HealthProbe for SelectiveProbe {
        async fn probe(&self, service: &ServiceInfo) -> Result<(), ProbeError> {
            if service.name.starts_with("bad") {
                Err(ProbeError::Connect("refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct SlowProbe(Duration);

    #[async_trait]
    impl HealthProbe for SlowProbe {
        async fn probe(&self, _service: &ServiceInfo) -> Result<(), ProbeError> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    /// 名前が"boom"で始まるサービスでパニックするプローブ
    struct PanickingProbe;

    #[async_trait]
    impl HealthProbe for PanickingProbe {
        async fn probe(&self, service: &ServiceInfo) -> Result<(), ProbeError> {
            if service.name.starts_with("boom") {
                panic!("probe exploded for {}", service.name);
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingProbe {
        running: AtomicUsize,
        max_running: AtomicUsize,
        total: AtomicUsize,
    }

    #[async_trait]
    impl HealthProbe for CountingProbe {
        async fn probe(&self, _service: &ServiceInfo) -> Result<(), ProbeError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.total.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_empty_registry_sweep() {
        let checker = HealthChecker::new(
            ServiceRegistry::new(),
            Arc::new(NoopProbe),
            Duration::from_secs(1),
        );
        assert_eq!(checker.run_sweep().await, SweepReport::default());
    }

    #[tokio::test]
    async fn test_panicking_probe_is_recorded_against_its_endpoint() {
        let registry = ServiceRegistry::new();
        registry.upsert(ServiceInfo::new("boom-orders", "127.0.0.1", 1)).await;
        registry.upsert(ServiceInfo::new("users", "127.0.0.1", 2)).await;

        let checker =
            HealthChecker::new(registry.clone(), Arc::new(PanickingProbe), Duration::from_secs(1));
        let report = checker.run_sweep().await;

        assert_eq!(report.checked, 2);
        assert_eq!(report.healthy, 1);
        assert_eq!(report.unhealthy, 1);

        let failed = registry.get_service_info("boom-orders").await.unwrap();
        assert_eq!(failed.status, ServiceStatus::Unhealthy);
        assert_eq!(failed.consecutive_failures, 1);
        assert!(failed.last_checked.is_some());
        assert_eq!(
            registry.get_service_info("users").await.unwrap().status,
            ServiceStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_others() {
        let registry = ServiceRegistry::new();
        registry.upsert(ServiceInfo::new("users", "127.0.0.1", 1)).await;
        registry.upsert(ServiceInfo::new("bad-orders", "127.0.0.1", 2)).await;
        registry.upsert(ServiceInfo::new("billing", "127.0.0.1", 3)).await;

        let checker =
            HealthChecker::new(registry.clone(), Arc::new(SelectiveProbe), Duration::from_secs(1));
        let report = checker.run_sweep().await;

        assert_eq!(report.checked, 3);
        assert_eq!(report.healthy, 2);
        assert_eq!(report.unhealthy, 1);
        assert_eq!(
            registry.get_service_info("bad-orders").await.unwrap().status,
            ServiceStatus::Unhealthy
        );
        assert_eq!(
            registry.get_service_info("billing").await.unwrap().status,
            ServiceStatus::Healthy
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_marks_unhealthy() {
        let registry = ServiceRegistry::new();
        registry.upsert(ServiceInfo::new("slow", "127.0.0.1", 1)).await;

        let checker = HealthChecker::new(
            registry.clone(),
            Arc::new(SlowProbe(Duration::from_secs(30))),
            Duration::from_millis(100),
        );
        let report = checker.run_sweep().await;

        assert_eq!(report.unhealthy, 1);
        let info = registry.get_service_info("slow").await.unwrap();
        assert_eq!(info.status, ServiceStatus::Unhealthy);
        assert_eq!(info.consecutive_failures, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_sweeps_are_serialized_not_dropped() {
        const SWEEPS: usize = 8;
        let registry = ServiceRegistry::new();
        registry.upsert(ServiceInfo::new("users", "127.0.0.1", 1)).await;

        let probe = Arc::new(CountingProbe::default());
        let checker = HealthChecker::new(registry, probe.clone(), Duration::from_secs(5));

        let handles: Vec<_> = (0..SWEEPS)
            .map(|_| {
                let checker = checker.clone();
                tokio::spawn(async move { checker.run_sweep().await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().checked, 1);
        }

        assert_eq!(probe.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(probe.total.load(Ordering::SeqCst), SWEEPS);
    }

    #[tokio::test]
    async fn test_tcp_probe() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let up = ServiceInfo::new("up", "127.0.0.1", port);
        assert!(TcpProbe.probe(&up).await.is_ok());

        drop(listener);
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let closed_port = closed.local_addr().unwrap().port();
        drop(closed);
        let down = ServiceInfo::new("down", "127.0.0.1", closed_port);
        assert!(matches!(
            TcpProbe.probe(&down).await,
            Err(ProbeError::Connect(_))
        ));
    }

    #[tokio::test]
    async fn test_http_probe_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let addr = server.address();
        let probe = HttpProbe::new().unwrap();

        let ok = ServiceInfo::new("ok", addr.ip().to_string(), addr.port())
            .with_http_health("/healthz");
        assert!(probe.probe(&ok).await.is_ok());

        let broken = ServiceInfo::new("broken", addr.ip().to_string(), addr.port())
            .with_http_health("broken");
        assert_eq!(probe.probe(&broken).await, Err(ProbeError::Status(500)));
    }

    #[tokio::test]
    async fn test_protocol_probe_dispatches_by_protocol() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let addr = server.address();
        let probe = ProtocolProbe::new().unwrap();

        let http = ServiceInfo::new("http", addr.ip().to_string(), addr.port())
            .with_http_health("/health");
        assert!(probe.probe(&http).await.is_ok());

        // TCP接続はHTTPリクエストを発行しない
        let tcp = ServiceInfo::new("tcp", addr.ip().to_string(), addr.port());
        assert!(probe.probe(&tcp).await.is_ok());
    }
}

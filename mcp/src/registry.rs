//! ローカルサービスレジストリ
//!
//! ディスカバリで取得したサービス情報をメモリ内で管理する。
//! プロセスにつき1つのレジストリを[`ServiceRegistry::global`]で提供し、
//! 利用側には`clone()`したハンドルを渡す（内部状態は共有される）。

use chrono::Utc;
use once_cell::sync::OnceCell;
use service_mcp_common::types::{ServiceInfo, ServiceStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{McpError, McpResult};

static GLOBAL_REGISTRY: OnceCell<ServiceRegistry> = OnceCell::new();
#[cfg(test)]
static GLOBAL_INIT_COUNT: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

/// メンバー置き換えの結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    /// 新規追加されたサービス数
    pub added: usize,
    /// 接続先が変わったサービス数（ヘルス状態はリセット）
    pub changed: usize,
    /// 接続先が変わらず、ヘルス状態を引き継いだサービス数
    pub refreshed: usize,
    /// ソースから消えたため削除されたサービス数
    pub removed: usize,
}

/// ヘルスチェック結果の反映結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthRecord {
    /// 反映済み（反映後の状態）
    Applied(ServiceStatus),
    /// プローブ中に接続先が変わったため破棄
    Stale,
}

/// サービスレジストリ
#[derive(Clone, Debug, Default)]
pub struct ServiceRegistry {
    services: Arc<RwLock<HashMap<String, ServiceInfo>>>,
}

impl ServiceRegistry {
    /// 新しい（空の）レジストリを作成
    pub fn new() -> Self {
        Self {
            services: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// プロセス全体で共有されるレジストリを取得
    ///
    /// 初回呼び出し時に一度だけ生成される。同時に初回呼び出しが発生しても安全。
    pub fn global() -> &'static ServiceRegistry {
        GLOBAL_REGISTRY.get_or_init(|| {
            #[cfg(test)]
            GLOBAL_INIT_COUNT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            debug!("Initializing process-wide service registry");
            ServiceRegistry::new()
        })
    }

    /// 2つのハンドルが同じレジストリを指しているか
    pub fn same_instance(&self, other: &ServiceRegistry) -> bool {
        Arc::ptr_eq(&self.services, &other.services)
    }

    /// サービス情報を取得
    ///
    /// 未登録の名前には`McpError::ServiceNotFound`を返す。
    pub async fn get_service_info(&self, name: &str) -> McpResult<ServiceInfo> {
        let services = self.services.read().await;
        services
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::ServiceNotFound(name.to_string()))
    }

    /// 全サービスを名前順で取得
    pub async fn list(&self) -> Vec<ServiceInfo> {
        let services = self.services.read().await;
        let mut list: Vec<ServiceInfo> = services.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// 登録サービス数
    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    /// 空かどうか
    pub async fn is_empty(&self) -> bool {
        self.services.read().await.is_empty()
    }

    /// サービスを登録または上書き
    pub async fn upsert(&self, info: ServiceInfo) {
        let mut services = self.services.write().await;
        services.insert(info.name.clone(), info);
    }

    /// メンバーを丸ごと置き換える
    ///
    /// 1回の書き込みロック内で行うため、読み手が中間状態を見ることはない。
    /// 接続先が同じサービスはヘルス状態を引き継ぐ。
    pub async fn replace_all(&self, incoming: Vec<ServiceInfo>) -> ReplaceSummary {
        let mut services = self.services.write().await;
        let mut previous = std::mem::take(&mut *services);
        let mut summary = ReplaceSummary::default();

        for mut info in incoming {
            match previous.remove(&info.name) {
                Some(old) if old.same_endpoint(&info) => {
                    info.status = old.status;
                    info.consecutive_failures = old.consecutive_failures;
                    info.last_checked = old.last_checked;
                    summary.refreshed += 1;
                }
                Some(_) => summary.changed += 1,
                None => summary.added += 1,
            }
            services.insert(info.name.clone(), info);
        }

        summary.removed = previous.len();
        summary
    }

    /// ヘルスチェック結果を反映
    ///
    /// `probed`はプローブ時点のスナップショット。接続先が変わっていれば結果は破棄する。
    pub async fn record_health(
        &self,
        probed: &ServiceInfo,
        healthy: bool,
    ) -> McpResult<HealthRecord> {
        let mut services = self.services.write().await;
        let entry = services
            .get_mut(&probed.name)
            .ok_or_else(|| McpError::ServiceNotFound(probed.name.clone()))?;

        if !entry.same_endpoint(probed) {
            return Ok(HealthRecord::Stale);
        }

        entry.last_checked = Some(Utc::now());
        if healthy {
            entry.status = ServiceStatus::Healthy;
            entry.consecutive_failures = 0;
        } else {
            entry.status = ServiceStatus::Unhealthy;
            entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        }
        Ok(HealthRecord::Applied(entry.status))
    }
}

#[cfg(test)]
pub(crate) fn global_init_count() -> usize {
    GLOBAL_INIT_COUNT.load(std::sync::atomic::Ordering::SeqCst)
}

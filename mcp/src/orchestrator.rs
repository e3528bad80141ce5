//! MCP制御ループ
//!
//! 2つの独立したタイマー（ヘルスチェック・ディスカバリ）と終了シグナルを1つのループで待ち受け、
//! ティックごとに処理を別タスクとして起動する。ループ自身は処理の完了を待たない。
//!
//! - ヘルスチェック: 毎ティック起動し、[`HealthChecker`]のミューテックスで直列化（破棄しない）
//! - ディスカバリ: [`SingleFlight`]で多重実行を防止（実行中なら今回分はスキップ）
//! - 終了時: 実行中タスクを`shutdown_grace`まで待ち、残りは中断する

use service_mcp_common::config::{McpConfig, MAX_INTERVAL_SECS};
use service_mcp_common::protocol::ServiceCatalog;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::discovery::{Discoverer, HttpRegistrySource, RegistrySource, StaticRegistrySource};
use crate::error::{McpError, McpResult};
use crate::health::{HealthChecker, ProtocolProbe};
use crate::registry::ServiceRegistry;
use crate::shutdown::ShutdownController;
use crate::single_flight::{FlightOutcome, SingleFlight};

/// 制御ループの設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    health_interval: Duration,
    discovery_interval: Duration,
    shutdown_grace: Duration,
}

impl OrchestratorConfig {
    /// デフォルトのシャットダウン猶予
    pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

    /// タイマー間隔の上限
    pub const MAX_INTERVAL: Duration = Duration::from_secs(MAX_INTERVAL_SECS);

    /// 新しい設定を作成（いずれの間隔も0より大きく、[`Self::MAX_INTERVAL`]以下であること）
    pub fn new(health_interval: Duration, discovery_interval: Duration) -> McpResult<Self> {
        check_interval("health check interval", health_interval)?;
        check_interval("discovery interval", discovery_interval)?;
        Ok(Self {
            health_interval,
            discovery_interval,
            shutdown_grace: Self::DEFAULT_SHUTDOWN_GRACE,
        })
    }

    /// McpConfigから作成
    pub fn from_mcp_config(config: &McpConfig) -> McpResult<Self> {
        config.validate()?;
        Ok(Self::new(config.health_check_interval(), config.discovery_interval())?
            .with_shutdown_grace(config.shutdown_grace()))
    }

    /// シャットダウン猶予を設定
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// ヘルスチェック間隔
    pub fn health_interval(&self) -> Duration {
        self.health_interval
    }

    /// ディスカバリ間隔
    pub fn discovery_interval(&self) -> Duration {
        self.discovery_interval
    }

    /// シャットダウン猶予
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }
}

/// 制御ループの統計
#[derive(Debug, Default)]
pub struct OrchestratorStats {
    health_dispatched: AtomicU64,
    health_completed: AtomicU64,
    discovery_dispatched: AtomicU64,
    discovery_started: AtomicU64,
    discovery_succeeded: AtomicU64,
    discovery_skipped: AtomicU64,
    discovery_failed: AtomicU64,
}

/// 統計のスナップショット
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// 起動したヘルスチェックタスク数
    pub health_dispatched: u64,
    /// 完了したヘルスチェック数
    pub health_completed: u64,
    /// 起動したディスカバリタスク数
    pub discovery_dispatched: u64,
    /// ディスカバリ本体が実際に開始した回数
    pub discovery_started: u64,
    /// 成功したディスカバリ数
    pub discovery_succeeded: u64,
    /// 実行中のためスキップしたディスカバリ数
    pub discovery_skipped: u64,
    /// 失敗したディスカバリ数（エラーコールバックの呼び出し回数）
    pub discovery_failed: u64,
}

impl OrchestratorStats {
    /// 現在値を取得
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            health_dispatched: self.health_dispatched.load(Ordering::SeqCst),
            health_completed: self.health_completed.load(Ordering::SeqCst),
            discovery_dispatched: self.discovery_dispatched.load(Ordering::SeqCst),
            discovery_started: self.discovery_started.load(Ordering::SeqCst),
            discovery_succeeded: self.discovery_succeeded.load(Ordering::SeqCst),
            discovery_skipped: self.discovery_skipped.load(Ordering::SeqCst),
            discovery_failed: self.discovery_failed.load(Ordering::SeqCst),
        }
    }
}

/// 制御ループ終了時のまとめ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// 終了時点（ドレイン後）の統計
    pub stats: StatsSnapshot,
    /// 終了シグナル受信時に実行中だったタスク数
    pub in_flight_at_stop: usize,
    /// 猶予内に終わらず中断したタスク数
    pub aborted: usize,
}

/// Master Control Program
pub struct Orchestrator {
    config: OrchestratorConfig,
    discoverer: Discoverer,
    health: HealthChecker,
    flight: SingleFlight,
    stats: Arc<OrchestratorStats>,
    shutdown: ShutdownController,
}

impl Orchestrator {
    /// 新しい制御ループを作成
    pub fn new(
        config: OrchestratorConfig,
        discoverer: Discoverer,
        health: HealthChecker,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            config,
            discoverer,
            health,
            flight: SingleFlight::new(),
            stats: Arc::new(OrchestratorStats::default()),
            shutdown,
        }
    }

    /// McpConfigから取得元・プローブを組み立てて作成
    ///
    /// `registry_url`があればHTTPレジストリを、なければ設定ファイルの`services`を使う。
    pub fn from_config(
        config: &McpConfig,
        registry: ServiceRegistry,
        shutdown: ShutdownController,
    ) -> McpResult<Self> {
        let loop_config = OrchestratorConfig::from_mcp_config(config)?;

        let source: Arc<dyn RegistrySource> = match &config.registry_url {
            Some(url) => Arc::new(HttpRegistrySource::new(url, config.registry_timeout())?),
            None => Arc::new(StaticRegistrySource::new(ServiceCatalog {
                services: config.services.clone(),
            })),
        };
        let discoverer = Discoverer::new(registry.clone(), source);
        let health = HealthChecker::new(
            registry,
            Arc::new(ProtocolProbe::new()?),
            config.probe_timeout(),
        );

        Ok(Self::new(loop_config, discoverer, health, shutdown))
    }

    /// 統計へのハンドル
    pub fn stats(&self) -> Arc<OrchestratorStats> {
        self.stats.clone()
    }

    /// ディスカバリ用ガード
    pub fn discovery_guard(&self) -> SingleFlight {
        self.flight.clone()
    }

    /// 終了シグナルまでループを実行
    pub async fn run(self) -> RunSummary {
        let now = Instant::now();
        let health_period = self.config.health_interval;
        let discovery_period = self.config.discovery_interval;

        // 最初のティックは1周期後
        let mut health_timer = interval_at(now + health_period, health_period);
        health_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut discovery_timer = interval_at(now + discovery_period, discovery_period);
        discovery_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut tasks: JoinSet<()> = JoinSet::new();

        info!(
            health_interval_ms = health_period.as_millis() as u64,
            discovery_interval_ms = discovery_period.as_millis() as u64,
            "Master control loop started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.wait() => {
                    info!("Termination requested, stopping master control loop");
                    break;
                }
                _ = health_timer.tick() => self.dispatch_health_check(&mut tasks),
                _ = discovery_timer.tick() => self.dispatch_discovery(&mut tasks),
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_task_result(joined),
            }
        }

        let in_flight_at_stop = tasks.len();
        let aborted = drain(&mut tasks, self.config.shutdown_grace).await;
        let stats = self.stats.snapshot();

        info!(
            health_completed = stats.health_completed,
            discovery_succeeded = stats.discovery_succeeded,
            discovery_skipped = stats.discovery_skipped,
            discovery_failed = stats.discovery_failed,
            aborted,
            "Master control loop stopped"
        );

        RunSummary {
            stats,
            in_flight_at_stop,
            aborted,
        }
    }

    fn dispatch_health_check(&self, tasks: &mut JoinSet<()>) {
        self.stats.health_dispatched.fetch_add(1, Ordering::SeqCst);
        let health = self.health.clone();
        let stats = self.stats.clone();

        tasks.spawn(async move {
            health.run_sweep().await;
            stats.health_completed.fetch_add(1, Ordering::SeqCst);
        });
    }

    fn dispatch_discovery(&self, tasks: &mut JoinSet<()>) {
        self.stats.discovery_dispatched.fetch_add(1, Ordering::SeqCst);
        debug!("Trying to run discovery");
        let flight = self.flight.clone();
        let discoverer = self.discoverer.clone();
        let stats = self.stats.clone();

        tasks.spawn(async move {
            let outcome = flight
                .try_run_with_fallback(
                    || async {
                        stats.discovery_started.fetch_add(1, Ordering::SeqCst);
                        discoverer.discover().await
                    },
                    |err| {
                        stats.discovery_failed.fetch_add(1, Ordering::SeqCst);
                        error!(error = %err, "Discovery error");
                    },
                )
                .await;

            match outcome {
                FlightOutcome::Ran(_) => {
                    stats.discovery_succeeded.fetch_add(1, Ordering::SeqCst);
                }
                FlightOutcome::Skipped => {
                    stats.discovery_skipped.fetch_add(1, Ordering::SeqCst);
                    debug!("Discovery already in progress, skipping tick");
                }
                FlightOutcome::Failed(_) => {}
            }
        });
    }
}

fn check_interval(label: &str, interval: Duration) -> McpResult<()> {
    if interval.is_zero() {
        return Err(McpError::InvalidConfig(format!(
            "{} must be greater than zero",
            label
        )));
    }
    if interval > OrchestratorConfig::MAX_INTERVAL {
        return Err(McpError::InvalidConfig(format!(
            "{} must not exceed {} seconds",
            label, MAX_INTERVAL_SECS
        )));
    }
    Ok(())
}

fn log_task_result(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("Dispatched task panicked: {}", e);
        } else {
            debug!("Dispatched task cancelled: {}", e);
        }
    }
}

/// 実行中タスクを猶予時間まで待ち、残りを中断する。中断した数を返す
async fn drain(tasks: &mut JoinSet<()>, grace: Duration) -> usize {
    if tasks.is_empty() {
        return 0;
    }

    info!(
        in_flight = tasks.len(),
        grace_ms = grace.as_millis() as u64,
        "Waiting for in-flight tasks"
    );

    let finished = tokio::time::timeout(grace, async {
        while let Some(joined) = tasks.join_next().await {
            log_task_result(joined);
        }
    })
    .await;

    if finished.is_ok() {
        return 0;
    }

    let remaining = tasks.len();
    warn!(remaining, "Shutdown grace period elapsed, aborting in-flight tasks");
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    remaining
}

//! ロギング初期化
//!
//! `MCP_LOG_LEVEL`（未設定なら`RUST_LOG`、さらに未設定なら`info`）でフィルタを決定する。
//! `MCP_LOG_DIR`が設定されている場合は日次ローテーションのファイル出力も追加する。

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// MCP専用のログレベル環境変数
pub const LOG_LEVEL_ENV: &str = "MCP_LOG_LEVEL";

/// ログファイル名のプレフィックス
const LOG_FILE_PREFIX: &str = "service-mcp.log";

/// デフォルトのログレベル
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::INFO;

/// ロギング初期化エラー
#[derive(Debug, Error)]
pub enum LoggingError {
    /// グローバルsubscriberの設定に失敗
    #[error("Failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// フィルタを構築
///
/// `MCP_LOG_LEVEL` → `RUST_LOG` → `info`の順。未設定または不正な値の場合は次の候補を使う。
pub fn build_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(DEFAULT_LOG_LEVEL.into())
        .with_env_var(LOG_LEVEL_ENV)
        .try_from_env()
        .or_else(|_| {
            EnvFilter::builder()
                .with_default_directive(DEFAULT_LOG_LEVEL.into())
                .try_from_env()
        })
        .unwrap_or_else(|_| EnvFilter::default().add_directive(DEFAULT_LOG_LEVEL.into()))
}

/// グローバルsubscriberを初期化
///
/// ファイル出力を有効にした場合は`WorkerGuard`を返す。
/// ドロップするとバッファがフラッシュされるため、プロセス終了まで保持すること。
pub fn init() -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = build_filter();

    let (file_layer, guard) = match std::env::var("MCP_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

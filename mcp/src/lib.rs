//! Service MCP (Master Control Program)
//!
//! サービスディスカバリとヘルスチェックを定期実行する制御プロセス

#![warn(missing_docs)]

/// エラー型定義
pub mod error;

/// 設定管理（環境変数ヘルパー）
pub mod config;

/// ロギング初期化ユーティリティ
pub mod logging;

/// CLIインターフェース
pub mod cli;

/// ローカルサービスレジストリ
pub mod registry;

/// サービスディスカバリ
pub mod discovery;

/// 多重実行防止ガード（シングルフライト）
pub mod single_flight;

/// ヘルスチェック
pub mod health;

/// 定期実行ループ（MCP本体）
pub mod orchestrator;

/// Shutdown controller
pub mod shutdown;

pub use error::{McpError, McpResult};
pub use service_mcp_common as common;

//! Service MCP Common Library
//!
//! MCP本体と外部レジストリ間で共有される型定義

#![warn(missing_docs)]

/// 共通型定義（サービス情報・ヘルス状態）
pub mod types;

/// 外部レジストリとの通信プロトコル
pub mod protocol;

/// 設定管理
pub mod config;

/// エラー型定義
pub mod error;

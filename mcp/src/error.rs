//! エラー型定義
//!
//! MCPレイヤーの統一エラー型（thiserror使用）

use service_mcp_common::error::CommonError;
use thiserror::Error;

/// MCP error type
#[derive(Debug, Error)]
pub enum McpError {
    /// Common layer error
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Service not found in the local registry
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// MCP result type
pub type McpResult<T> = Result<T, McpError>;

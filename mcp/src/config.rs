//! Configuration management via environment variables
//!
//! Provides helper functions for reading environment variables with fallback
//! to deprecated variable names with warning logs, and the layered loader
//! (file → environment) for [`McpConfig`].

use std::path::Path;
use std::str::FromStr;

use service_mcp_common::config::McpConfig;

use crate::error::McpResult;

/// Get an environment variable with fallback to a deprecated name
///
/// If the new variable name is set, returns its value.
/// If only the old (deprecated) variable name is set, returns its value
/// and logs a deprecation warning.
///
/// # Example
/// ```
/// use service_mcp::config::get_env_with_fallback;
///
/// let url = get_env_with_fallback("MCP_REGISTRY_URL", "REGISTRY_URL");
/// ```
pub fn get_env_with_fallback(new_name: &str, old_name: &str) -> Option<String> {
    if let Ok(val) = std::env::var(new_name) {
        return Some(val);
    }
    if let Ok(val) = std::env::var(old_name) {
        tracing::warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            old_name,
            new_name
        );
        return Some(val);
    }
    None
}

/// Get an environment variable with fallback, parsing to a specific type
///
/// An unset or unparsable variable yields `None`, so the caller can keep
/// whatever value it already has.
pub fn get_env_with_fallback_opt<T: FromStr>(new_name: &str, old_name: &str) -> Option<T> {
    let raw = get_env_with_fallback(new_name, old_name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(
                variable = new_name,
                value = %raw,
                "Ignoring environment variable with invalid value"
            );
            None
        }
    }
}

/// 環境変数で設定を上書き
pub fn apply_env_overrides(config: &mut McpConfig) {
    if let Some(rate) = get_env_with_fallback_opt("MCP_RATE_SECS", "MCP_RATE") {
        config.rate_secs = rate;
    }
    if let Some(secs) =
        get_env_with_fallback_opt("MCP_HEALTH_CHECK_INTERVAL_SECS", "HEALTH_CHECK_INTERVAL")
    {
        config.health_check_interval_secs = Some(secs);
    }
    if let Some(secs) =
        get_env_with_fallback_opt("MCP_DISCOVERY_INTERVAL_SECS", "DISCOVERY_INTERVAL")
    {
        config.discovery_interval_secs = Some(secs);
    }
    if let Some(url) = get_env_with_fallback("MCP_REGISTRY_URL", "REGISTRY_URL") {
        config.registry_url = Some(url);
    }
    if let Some(secs) =
        get_env_with_fallback_opt("MCP_REGISTRY_TIMEOUT_SECS", "REGISTRY_TIMEOUT_SECS")
    {
        config.registry_timeout_secs = secs;
    }
    if let Some(ms) = get_env_with_fallback_opt("MCP_PROBE_TIMEOUT_MS", "PROBE_TIMEOUT_MS") {
        config.probe_timeout_ms = ms;
    }
    if let Some(secs) =
        get_env_with_fallback_opt("MCP_SHUTDOWN_GRACE_SECS", "SHUTDOWN_GRACE_SECS")
    {
        config.shutdown_grace_secs = secs;
    }
}

/// 設定を読み込む
///
/// 設定ファイル（任意）→ 環境変数の順に適用する。CLI引数による上書きと検証は呼び出し側で行う。
pub fn load(path: Option<&Path>) -> McpResult<McpConfig> {
    let mut config = match path {
        Some(path) => McpConfig::from_file(path)?,
        None => McpConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

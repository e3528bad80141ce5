//! CLI module for service-mcp
//!
//! Command-line flags take precedence over the configuration file and
//! environment variables.

use clap::Parser;
use service_mcp_common::config::McpConfig;
use std::path::PathBuf;

/// Service MCP - periodic service discovery and health checking
#[derive(Parser, Debug, Default)]
#[command(name = "service-mcp")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    MCP_RATE_SECS                   Base tick rate in seconds (default: 1)
    MCP_HEALTH_CHECK_INTERVAL_SECS  Health check interval (default: rate)
    MCP_DISCOVERY_INTERVAL_SECS     Discovery interval (default: rate)
    MCP_REGISTRY_URL                External service registry URL
    MCP_REGISTRY_TIMEOUT_SECS       Registry request timeout (default: 10)
    MCP_PROBE_TIMEOUT_MS            Per-endpoint probe timeout (default: 2000)
    MCP_SHUTDOWN_GRACE_SECS         In-flight task drain on shutdown (default: 5)
    MCP_LOG_LEVEL                   Log level (default: info)
    MCP_LOG_DIR                     Also write daily rolling log files here
"#)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base tick rate in seconds
    #[arg(long, value_name = "SECS")]
    pub rate: Option<u64>,

    /// Health check interval in seconds
    #[arg(long, value_name = "SECS")]
    pub health_interval: Option<u64>,

    /// Discovery interval in seconds
    #[arg(long, value_name = "SECS")]
    pub discovery_interval: Option<u64>,

    /// External service registry URL
    #[arg(long, value_name = "URL")]
    pub registry_url: Option<String>,

    /// Maximum time to wait for in-flight tasks on shutdown, in seconds
    #[arg(long, value_name = "SECS")]
    pub shutdown_grace: Option<u64>,

    /// Per-endpoint probe timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub probe_timeout: Option<u64>,
}

impl Cli {
    /// 指定されたフラグで設定を上書き
    pub fn apply_overrides(&self, config: &mut McpConfig) {
        if let Some(rate) = self.rate {
            config.rate_secs = rate;
        }
        if let Some(secs) = self.health_interval {
            config.health_check_interval_secs = Some(secs);
        }
        if let Some(secs) = self.discovery_interval {
            config.discovery_interval_secs = Some(secs);
        }
        if let Some(url) = &self.registry_url {
            config.registry_url = Some(url.clone());
        }
        if let Some(secs) = self.shutdown_grace {
            config.shutdown_grace_secs = secs;
        }
        if let Some(ms) = self.probe_timeout {
            config.probe_timeout_ms = ms;
        }
    }
}

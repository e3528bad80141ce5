//! Service MCP Entry Point

use clap::Parser;
use service_mcp::cli::Cli;
use service_mcp::orchestrator::Orchestrator;
use service_mcp::registry::ServiceRegistry;
use service_mcp::shutdown::{spawn_signal_listener, ShutdownController};
use service_mcp::{config, logging};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // ファイル出力用のガードはプロセス終了まで保持する
    let _log_guard = logging::init().expect("failed to initialize logging");

    info!("Initializing Master Control Program v{}", env!("CARGO_PKG_VERSION"));

    let mut mcp_config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    cli.apply_overrides(&mut mcp_config);

    let shutdown = ShutdownController::default();
    let registry = ServiceRegistry::global().clone();

    let orchestrator = match Orchestrator::from_config(&mcp_config, registry, shutdown.clone()) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    match &mcp_config.registry_url {
        Some(url) => info!(registry_url = %url, "Using external service registry"),
        None => info!(
            services = mcp_config.services.len(),
            "No registry URL configured, using statically defined services"
        ),
    }

    let signal_listener = spawn_signal_listener(shutdown);
    let summary = orchestrator.run().await;
    signal_listener.abort();

    info!(
        health_checks = summary.stats.health_completed,
        discoveries = summary.stats.discovery_succeeded,
        "Master Control Program shutdown complete"
    );
}

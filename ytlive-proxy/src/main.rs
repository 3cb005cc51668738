//! ytlive-proxy: caching live stream resolver and relay.
//!
//! Resolves channel handles to their current live broadcast and serves the
//! stream to players by redirect or by relaying bytes.

use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

mod cache;
mod config;
mod logging;
mod metrics;
mod orchestrator;
mod relay;
mod resolver;
mod scheduler;
mod web;

use config::{AppConfig, Args};
use metrics::Metrics;
use orchestrator::Orchestrator;
use relay::Relay;
use resolver::YtDlpResolver;
use scheduler::RefreshScheduler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (config, config_path) = match AppConfig::load(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    if let Some(path) = &config_path {
        eprintln!("Loaded config from: {}", path.display());
    }

    let _log_guard = logging::init_logging(
        &config.logging.log_dir,
        config.logging.retention_days,
        args.verbose,
        Some(config.logging.level.as_str()),
    )?;

    let warnings = match config.validate() {
        Ok(warnings) => warnings,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };
    for warning in &warnings {
        warn!("{}", warning);
    }

    info!("ytlive-proxy starting...");
    info!("  Listen address: {}", config.server.listen);
    info!("  Resolver: {}", config.resolver.binary);
    info!(
        "  Cache TTL: channel {}s, stream {}s",
        config.cache.channel_ttl_secs, config.cache.stream_ttl_secs
    );
    info!(
        "  Background refresh: {} (every {}s, {} channel(s): {})",
        if config.refresh.enabled { "enabled" } else { "disabled" },
        config.refresh.interval_secs,
        config.refresh.channels.len(),
        config.refresh.channels.join(", ")
    );
    info!("  Log directory: {}", config.logging.log_dir.display());

    let config = Arc::new(config);
    let metrics = Metrics::new();

    let resolver = Arc::new(YtDlpResolver::new(config.ytdlp_config()));
    let orchestrator = Arc::new(Orchestrator::new(
        resolver,
        config.orchestrator_config(),
        Arc::clone(&metrics),
    ));
    let relay = Arc::new(Relay::new(config.relay_config(), Arc::clone(&metrics))?);

    let scheduler = Arc::new(RefreshScheduler::new(
        Arc::clone(&orchestrator),
        config.refresh_config(),
        Arc::clone(&metrics),
    ));
    let scheduler_handle = Arc::clone(&scheduler).start();

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let web_state = Arc::new(web::WebState::new(
        orchestrator,
        Arc::clone(&scheduler),
        relay,
        Arc::clone(&config),
        Arc::clone(&metrics),
    ));
    let served = web::start_web_server(config.server.listen, web_state, shutdown.clone()).await;

    // Stop the refresher whether the server exited cleanly or not.
    scheduler.shutdown();
    if let Err(e) = scheduler_handle.await {
        error!("Refresh scheduler task failed: {}", e);
    }
    metrics.print_report();

    if let Err(e) = served {
        error!("HTTP server error: {}", e);
        return Err(e);
    }
    info!("ytlive-proxy stopped");
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C, or SIGTERM on unix.
async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}

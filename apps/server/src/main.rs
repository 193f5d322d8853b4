//! Tandem Server - standalone session authority.
//!
//! Hosts the session registry behind the HTTP API so members on any device
//! can create, join and follow listening sessions.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tandem_core::{bootstrap_services, start_server};
use tokio::signal;

use crate::config::ServerConfig;

/// Tandem Server - authority for synchronized listening sessions.
#[derive(Parser, Debug)]
#[command(name = "tandem-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "TANDEM_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "TANDEM_BIND_PORT")]
    port: Option<u16>,

    /// Let non-host members control playback (overrides config file).
    #[arg(long)]
    allow_member_control: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Tandem Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if args.allow_member_control {
        config.allow_member_control = true;
    }

    log::info!(
        "Configuration: bind_port={}, membership_timeout={}s, allow_member_control={}",
        config.bind_port,
        config.membership_timeout_secs,
        config.allow_member_control
    );

    let services =
        bootstrap_services(config.to_core_config()).context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    let app_state = services.app_state();
    let shutdown = services.cancel_token.child_token();
    let mut server_handle = tokio::spawn(async move { start_server(app_state, shutdown).await });

    tokio::select! {
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
        }
        result = &mut server_handle => {
            // The server only returns early on a bind or I/O failure.
            services.shutdown().await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e).context("Server failed"),
                Err(e) => Err(e).context("Server task panicked"),
            };
        }
    }

    services.shutdown().await;
    if let Err(e) = server_handle.await {
        log::warn!("Server task ended abnormally: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

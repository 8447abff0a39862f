//! Risk resilience daemon.
//!
//! ```text
//!   config.toml ──▶ load_config ──▶ ResilienceLayer ──▶ admin API (axum)
//!                                        │                  ▲
//!                                        ▼                  │
//!                              bulkhead / fallback /   Bearer api_key
//!                              provider pool stats
//! ```
//!
//! Serves metrics and the admin API until SIGINT/SIGTERM, then drains the
//! admin listener and closes provider connections.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use risk_resilience::admin::{setup_admin_router, AdminState};
use risk_resilience::config::{load_config, ResilienceConfig};
use risk_resilience::lifecycle::{signals, ResilienceLayer, Shutdown};
use risk_resilience::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "risk-resilience")]
#[command(about = "Bulkheads, fallbacks and provider pools for risk assessment", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ResilienceConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!("risk-resilience v{} starting", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        tracing::info!(path = %path.display(), "Configuration loaded");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let layer = Arc::new(ResilienceLayer::from_config(&config)?);

    let shutdown = Shutdown::new();
    let stopped = shutdown.signalled();
    signals::spawn_signal_handler(&shutdown);

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");

        let router = setup_admin_router(AdminState::new(layer.clone(), &config.admin.api_key));
        axum::serve(listener, router)
            .with_graceful_shutdown(stopped)
            .await?;
    } else {
        stopped.await;
    }

    tracing::info!("Shutting down");
    layer.shutdown();
    Ok(())
}

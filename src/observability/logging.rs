//! Structured logging.
//!
//! # Design Decisions
//! - `tracing` events carry `service` / `provider` / `attempt` fields
//! - `RUST_LOG` wins over the configured level
//! - Safe to call more than once; later calls are ignored

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber with `level` as the fallback filter.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("risk_resilience={level},tower_http={level}").into());

    if tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_err()
    {
        tracing::debug!("Logging already initialised");
    }
}

//! Admin API: read-only statistics plus fallback toggles.
//!
//! # Routes
//! - `GET  /admin/status`
//! - `GET  /admin/bulkheads`
//! - `GET  /admin/fallbacks`
//! - `GET  /admin/providers`
//! - `GET  /admin/health`
//! - `POST /admin/fallbacks/{service}/enable` and `/disable`
//!
//! Every route requires `Authorization: Bearer <api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::lifecycle::ResilienceLayer;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub layer: Arc<ResilienceLayer>,
    pub api_key: Arc<str>,
    pub started_at: Instant,
}

impl AdminState {
    pub fn new(layer: Arc<ResilienceLayer>, api_key: &str) -> Self {
        Self {
            layer,
            api_key: Arc::from(api_key),
            started_at: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/bulkheads", get(get_bulkheads))
        .route("/admin/fallbacks", get(get_fallbacks))
        .route("/admin/fallbacks/{service}/enable", post(enable_fallback))
        .route("/admin/fallbacks/{service}/disable", post(disable_fallback))
        .route("/admin/providers", get(get_providers))
        .route("/admin/health", get(get_health))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

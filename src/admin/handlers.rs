use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::bulkhead::BulkheadReport;
use crate::fallback::{FallbackReport, HandlerStats};
use crate::transport::{PoolStats, ProviderStats};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub bulkheads: usize,
    pub fallback_strategies: usize,
    pub providers: usize,
}

#[derive(Serialize)]
pub struct ProvidersView {
    pub pool: PoolStats,
    pub providers: Vec<ProviderStats>,
}

#[derive(Serialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        bulkheads: state.layer.bulkheads.reports().len(),
        fallback_strategies: state.layer.fallbacks.reports().len(),
        providers: state.layer.pool.list_providers().len(),
    })
}

pub async fn get_bulkheads(State(state): State<AdminState>) -> Json<Vec<BulkheadReport>> {
    Json(state.layer.bulkheads.reports())
}

pub async fn get_fallbacks(State(state): State<AdminState>) -> Json<Vec<FallbackReport>> {
    Json(state.layer.fallbacks.reports())
}

pub async fn get_providers(State(state): State<AdminState>) -> Json<ProvidersView> {
    Json(ProvidersView {
        pool: state.layer.pool.get_stats(),
        providers: state.layer.pool.all_provider_stats(),
    })
}

/// 200 when every provider is healthy, 503 otherwise.
pub async fn get_health(
    State(state): State<AdminState>,
) -> (StatusCode, Json<Vec<ProviderHealth>>) {
    let mut report: Vec<ProviderHealth> = state
        .layer
        .pool
        .health()
        .await
        .into_iter()
        .map(|(provider, result)| ProviderHealth {
            provider,
            healthy: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        })
        .collect();
    report.sort_by(|a, b| a.provider.cmp(&b.provider));

    let status = if report.iter().all(|p| p.healthy) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn enable_fallback(
    State(state): State<AdminState>,
    Path(service): Path<String>,
) -> Result<Json<HandlerStats>, StatusCode> {
    toggle_fallback(&state, &service, true)
}

pub async fn disable_fallback(
    State(state): State<AdminState>,
    Path(service): Path<String>,
) -> Result<Json<HandlerStats>, StatusCode> {
    toggle_fallback(&state, &service, false)
}

fn toggle_fallback(
    state: &AdminState,
    service: &str,
    enabled: bool,
) -> Result<Json<HandlerStats>, StatusCode> {
    let strategy = state.layer.fallback();
    let result = if enabled {
        strategy.enable_fallback(service)
    } else {
        strategy.disable_fallback(service)
    };
    if let Err(e) = result {
        tracing::debug!(service = %service, error = %e, "Fallback toggle failed");
        return Err(StatusCode::NOT_FOUND);
    }
    strategy
        .get_handler_stats(service)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (store reachable, hub running)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    let store_ok = check_store_health(&state).await;
    let hub_ok = state.connection_count().await.is_some();

    if store_ok && hub_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health
///
/// Full health status with component details.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store_ok = check_store_health(&state).await;
    let connections = state.connection_count().await;
    let hub_ok = connections.is_some();

    let overall_status = if store_ok && hub_ok {
        "healthy"
    } else if store_ok || hub_ok {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(HealthResponse {
        status: overall_status.to_string(),
        store: status_str(store_ok).to_string(),
        hub: status_str(hub_ok).to_string(),
        connections: connections.unwrap_or(0),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn status_str(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

async fn check_store_health(state: &AppState) -> bool {
    let store = Arc::clone(&state.store);
    match tokio::task::spawn_blocking(move || store.health_check()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Store health check failed");
            false
        }
        Err(e) => {
            tracing::warn!(error = %e, "Store health check panicked");
            false
        }
    }
}

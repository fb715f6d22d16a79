use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

use palaver_shared::errors::AppResult;
use palaver_shared::middleware::Caller;
use palaver_shared::types::api::{HealthCheck, HealthResponse};

use crate::policy::{self, Operation};
use crate::AppState;

/// GET /health - service status with a store round-trip
pub async fn health_check(State(state): State<Arc<AppState>>, caller: Caller) -> AppResult<Json<HealthResponse>> {
    policy::authorize(Operation::Health, &caller)?;
    let store = match state.store.ping() {
        Ok(()) => HealthCheck::healthy("store"),
        Err(e) => {
            tracing::warn!(error = %e, "store health check failed");
            HealthCheck::unhealthy("store", "store unreachable")
        }
    };
    Ok(Json(
        HealthResponse::healthy("palaver-chat", env!("CARGO_PKG_VERSION")).with_checks(vec![store]),
    ))
}

/// GET /metrics - Prometheus exposition
pub async fn metrics(State(state): State<Arc<AppState>>, caller: Caller) -> AppResult<impl IntoResponse> {
    policy::authorize(Operation::Metrics, &caller)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    ))
}

//! Health check and metrics endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use boxoffice_runtime::{HealthCheck, HealthStatus};
use serde::Serialize;

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK to indicate the service is running.
/// This endpoint does NOT check the engine or the backing store.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness response body.
#[derive(Debug, Serialize)]
pub struct Readiness {
    /// Worst status across all components
    pub status: HealthStatus,
    /// Per-component results
    pub checks: Vec<HealthCheck>,
}

/// Readiness from the engine's health checks.
///
/// # Status Codes
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
///
/// # Endpoint
///
/// ```text
/// GET /health/ready
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "degraded",
///   "checks": [
///     { "component": "inventory", "status": "healthy", "message": "812 seats unsold" },
///     { "component": "write_behind", "status": "degraded", "message": "3 orders dead-lettered" }
///   ]
/// }
/// ```
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let checks = state.engine.health().await;
    let status = checks
        .iter()
        .fold(HealthStatus::Healthy, |acc, check| acc.worst(check.status));

    let code = match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (code, Json(Readiness { status, checks }))
}

/// Prometheus exposition, 404 when no recorder is installed.
#[allow(clippy::unused_async)]
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

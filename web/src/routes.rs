//! Router configuration.

use crate::handlers::{admin, buy, health, pages};
use crate::middleware::with_request_tracing;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

/// Build the complete router.
///
/// | Route                  | Handler                                   |
/// |------------------------|-------------------------------------------|
/// | `GET /`                | cached top page                           |
/// | `GET /artist/:id`      | cached artist page                        |
/// | `GET /ticket/:id`      | cached ticket page                        |
/// | `POST /buy`            | sell one seat                             |
/// | `GET /admin`           | admin page                                |
/// | `POST /admin`          | restore initial dataset, 302 to `/`       |
/// | `GET /admin/order.csv` | order export                              |
/// | `GET /health`          | liveness                                  |
/// | `GET /health/ready`    | readiness from engine health              |
/// | `GET /metrics`         | Prometheus exposition                     |
pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(pages::top))
        .route("/artist/:id", get(pages::artist))
        .route("/ticket/:id", get(pages::ticket))
        .route("/buy", post(buy::buy))
        .route("/admin", get(admin::page).post(admin::reset))
        .route("/admin/order.csv", get(admin::orders_csv))
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness))
        .route("/metrics", get(health::metrics));

    with_request_tracing(routes).with_state(state)
}

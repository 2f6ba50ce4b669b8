//! Request tracking and tracing layers.
//!
//! Every request gets an `x-request-id` (kept from the client when present,
//! otherwise a fresh UUID), a tracing span carrying it, and the same id on the
//! response.
//!
//! # Example
//!
//! ```ignore
//! use boxoffice_web::middleware::with_request_tracing;
//!
//! let app = with_request_tracing(Router::new().route("/", get(top)));
//! ```

use axum::{Router, body::Body, http::Request};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Span for one HTTP request, tagged with its request id.
pub fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %request.method(),
        uri = %request.uri(),
    )
}

/// Wrap `router` with request id assignment, tracing and id propagation.
pub fn with_request_tracing<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(PropagateRequestIdLayer::x_request_id()),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tower::ServiceExt;

    fn app() -> Router {
        with_request_tracing(Router::new().route("/test", get(|| async { "ok" })))
    }

    #[tokio::test]
    async fn test_request_id_generated_if_missing() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app().oneshot(request).await.unwrap();

        let id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .expect("request id header should be present")
            .to_str()
            .unwrap();
        assert_eq!(id.len(), 36);
    }

    #[tokio::test]
    async fn test_request_id_preserved_from_request() {
        let request = Request::builder()
            .uri("/test")
            .header(REQUEST_ID_HEADER, "load-test-17")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(
            response.headers().get(REQUEST_ID_HEADER).unwrap(),
            "load-test-17"
        );
    }
}

//! End-to-end tests of the HTTP shell over the in-memory backing store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use boxoffice_runtime::{
    EngineOptions, RenderCacheConfig, SaleEngine, WriteBehindConfig, WriteBehindQueue,
};
use boxoffice_testing::helpers::init_test_tracing;
use boxoffice_testing::{Dataset, InMemoryBackingStore, fixtures};
use boxoffice_web::{AppState, PageCaches, REQUEST_ID_HEADER, build_router};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

struct Harness {
    server: TestServer,
    engine: SaleEngine,
    store: Arc<InMemoryBackingStore>,
    _shutdown: watch::Sender<bool>,
}

async fn harness(dataset: Dataset) -> Harness {
    init_test_tracing();
    let store = Arc::new(InMemoryBackingStore::new(dataset));
    let (handle, worker) = WriteBehindQueue::new(store.clone(), WriteBehindConfig::default());
    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(worker.run(shutdown_rx.clone()));

    let options = EngineOptions {
        shuffle_seed: Some(11),
        ..EngineOptions::default()
    };
    let engine = SaleEngine::bootstrap(store.as_ref(), handle, options)
        .await
        .unwrap();
    let config = RenderCacheConfig {
        interval: Duration::from_millis(10),
    };
    let (pages, _refreshers) = PageCaches::spawn(&engine, config, &shutdown_rx);

    let app = build_router(AppState::new(engine.clone(), store.clone(), pages));
    Harness {
        server: TestServer::new(app).unwrap(),
        engine,
        store,
        _shutdown: shutdown,
    }
}

async fn buy(server: &TestServer, variation: &str, member: &str) -> String {
    let response = server
        .post("/buy")
        .form(&[("variation_id", variation), ("member_id", member)])
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.text()
}

/// Poll `path` until its body contains `needle` (pages refresh every 10ms).
async fn eventually_contains(server: &TestServer, path: &str, needle: &str) -> String {
    for _ in 0..200 {
        let body = server.get(path).await.text();
        if body.contains(needle) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    unreachable!("{path} never contained {needle}");
}

#[tokio::test]
async fn test_top_page_lists_artists() {
    let h = harness(fixtures::festival(2, 1, 1, 3)).await;

    let response = h.server.get("/").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.text();
    assert!(body.contains("<a href=\"/artist/1\">Artist 1</a>"));
    assert!(body.contains("<a href=\"/artist/2\">Artist 2</a>"));
    assert!(body.contains("id=\"recent-sales\""));
}

#[tokio::test]
async fn test_artist_page_counts_remaining_seats() {
    let h = harness(fixtures::festival(1, 2, 2, 5)).await;

    let body = h.server.get("/artist/1").await.text();
    assert!(body.contains("<a href=\"/ticket/1\">Artist 1 Live 1</a> <span class=\"count\">10</span>"));

    buy(&h.server, "1", "alice").await;
    eventually_contains(&h.server, "/artist/1", "<span class=\"count\">9</span>").await;
}

#[tokio::test]
async fn test_unknown_pages_are_not_found() {
    let h = harness(fixtures::single_variation(1)).await;

    for path in ["/artist/99", "/ticket/99", "/ticket/abc"] {
        let response = h.server.get(path).await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND, "{path}");
        assert!(response.text().contains("Not found"));
    }
}

#[tokio::test]
async fn test_ticket_page_shows_seat_map() {
    let h = harness(fixtures::single_variation(3)).await;

    let body = h.server.get("/ticket/1").await.text();
    assert!(body.contains("<span class=\"vacancy\">3</span>"));
    assert!(body.contains("<td id=\"00-02\" class=\"available\">"));
    assert!(body.contains("<td id=\"00-03\" class=\"unavailable\">"));
    assert!(body.contains("<td id=\"63-63\" class=\"unavailable\">"));
    assert!(body.contains("name=\"variation_id\" value=\"1\""));

    let page = buy(&h.server, "1", "alice").await;
    let seat = ["00-00", "00-01", "00-02"]
        .into_iter()
        .find(|seat| page.contains(seat))
        .expect("confirmation names the seat");

    let body = eventually_contains(&h.server, "/ticket/1", "<span class=\"vacancy\">2</span>").await;
    assert!(body.contains(&format!("<td id=\"{seat}\" class=\"unavailable\">")));
}

#[tokio::test]
async fn test_buy_until_sold_out() {
    let h = harness(fixtures::single_variation(2)).await;

    assert!(buy(&h.server, "1", "alice").await.contains("<span class=\"member\">alice</span>"));
    assert!(buy(&h.server, "1", "bob").await.contains("Thank you!"));
    assert!(buy(&h.server, "1", "carol").await.contains("Sold out"));
}

#[tokio::test]
async fn test_bad_variation_is_sold_out() {
    let h = harness(fixtures::single_variation(2)).await;

    assert!(buy(&h.server, "not-a-number", "alice").await.contains("Sold out"));
    assert!(buy(&h.server, "404", "alice").await.contains("Sold out"));
    assert_eq!(h.engine.remaining(boxoffice_core::VariationId::new(1)).await, 2);
}

#[tokio::test]
async fn test_member_id_is_escaped() {
    let h = harness(fixtures::single_variation(1)).await;

    let page = buy(&h.server, "1", "<b>mallory</b>").await;
    assert!(page.contains("&lt;b&gt;mallory&lt;/b&gt;"));
    assert!(!page.contains("<b>mallory"));
}

#[tokio::test]
async fn test_order_csv_export() {
    let h = harness(fixtures::single_variation(5)).await;
    buy(&h.server, "1", "alice").await;
    buy(&h.server, "1", "bob").await;
    h.engine.persistence().flush().await.unwrap();

    let response = h.server.get("/admin/order.csv").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let content_type = response.header("content-type");
    assert!(content_type.to_str().unwrap().starts_with("text/csv"));

    let body = response.text();
    let lines: Vec<_> = body.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("1,alice,"));
    assert!(lines[1].starts_with("2,bob,"));
    assert!(lines[1].contains(",1,2012-11-03 10:00:00"));
}

#[tokio::test]
async fn test_admin_reset_restores_initial_dataset() {
    let h = harness(fixtures::single_variation(3)).await;
    buy(&h.server, "1", "alice").await;
    buy(&h.server, "1", "bob").await;

    let admin = h.server.get("/admin").await;
    assert!(admin.text().contains("action=\"/admin\""));

    let response = h.server.post("/admin").await;
    assert_eq!(response.status_code(), StatusCode::FOUND);
    assert_eq!(response.header("location"), "/");

    assert_eq!(h.engine.remaining(boxoffice_core::VariationId::new(1)).await, 3);
    assert_eq!(h.store.unsold_count(), 3);
    assert!(h.engine.recent_sales().await.is_empty());
    eventually_contains(&h.server, "/ticket/1", "<span class=\"vacancy\">3</span>").await;
}

#[tokio::test]
async fn test_admin_reset_failure_renders_failure_page() {
    let h = harness(fixtures::single_variation(3)).await;
    h.store.set_unavailable(true);

    let response = h.server.post("/admin").await;

    assert!(response.status_code().is_server_error());
    let body = response.text();
    assert!(body.contains("Something went wrong"));
    assert!(!body.contains("unavailable"));
    assert_eq!(h.engine.remaining(boxoffice_core::VariationId::new(1)).await, 3);
}

#[tokio::test]
async fn test_health_endpoints() {
    let h = harness(fixtures::single_variation(3)).await;

    let live = h.server.get("/health").await;
    assert_eq!(live.status_code(), StatusCode::OK);
    assert_eq!(live.text(), "ok");

    let ready = h.server.get("/health/ready").await;
    assert_eq!(ready.status_code(), StatusCode::OK);
    let body = ready.text();
    assert!(body.contains("\"status\":\"healthy\""));
    assert!(body.contains("3 seats unsold"));
}

#[tokio::test]
async fn test_metrics_without_recorder_is_not_found() {
    let h = harness(fixtures::single_variation(1)).await;
    assert_eq!(h.server.get("/metrics").await.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let h = harness(fixtures::single_variation(1)).await;

    let response = h
        .server
        .get("/")
        .add_header(
            HeaderName::from_static(REQUEST_ID_HEADER),
            HeaderValue::from_static("abc-123"),
        )
        .await;

    assert_eq!(response.header(REQUEST_ID_HEADER), "abc-123");
}

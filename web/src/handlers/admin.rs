//! Administrative endpoints: reset and order export.

use crate::{WebResult, pages, state::AppState};
use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse},
};
use boxoffice_core::ExportedOrder;
use std::fmt::Write;

/// `GET /admin`
#[allow(clippy::unused_async)]
pub async fn page() -> Html<String> {
    Html(pages::admin())
}

/// `POST /admin`: restore the initial dataset, reload, redirect to `/`.
///
/// Pending orders are flushed before the store is touched.
pub async fn reset(State(state): State<AppState>) -> WebResult<impl IntoResponse> {
    state.engine.restore_initial(state.store.as_ref()).await?;
    tracing::info!("Initial dataset restored");
    Ok((StatusCode::FOUND, [(header::LOCATION, "/")]))
}

/// `GET /admin/order.csv`: `order_id,member_id,seat,variation_id,updated_at`.
pub async fn orders_csv(State(state): State<AppState>) -> WebResult<impl IntoResponse> {
    let orders = state.store.export_orders().await?;
    Ok((
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        to_csv(&orders),
    ))
}

/// One line per order, without a header row.
#[must_use]
pub fn to_csv(orders: &[ExportedOrder]) -> String {
    let mut out = String::with_capacity(orders.len() * 64);
    for order in orders {
        let _ = writeln!(
            out,
            "{},{},{},{},{}",
            order.order_id,
            csv_field(&order.member_id),
            csv_field(&order.seat_label),
            order.variation_id,
            order.updated_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

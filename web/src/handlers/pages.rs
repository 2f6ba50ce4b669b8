//! Cached browsing pages.

use crate::{AppError, WebResult, state::AppState};
use axum::{
    extract::{Path, State},
    response::Html,
};
use boxoffice_core::{ArtistId, TicketId};
use std::sync::Arc;

fn parse_id(raw: &str, resource: &str) -> WebResult<i64> {
    raw.parse().map_err(|_| AppError::not_found(resource, raw))
}

fn html(page: &Arc<str>) -> Html<String> {
    Html(String::from(&**page))
}

/// `GET /`
pub async fn top(State(state): State<AppState>) -> WebResult<Html<String>> {
    state
        .pages
        .top
        .get(())
        .await
        .map(|page| html(&page))
        .ok_or_else(|| AppError::internal("top page missing"))
}

/// `GET /artist/:id`
pub async fn artist(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<Html<String>> {
    let id = ArtistId::new(parse_id(&id, "Artist")?);
    state
        .pages
        .artists
        .get(id)
        .await
        .map(|page| html(&page))
        .ok_or_else(|| AppError::not_found("Artist", id))
}

/// `GET /ticket/:id`
pub async fn ticket(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<Html<String>> {
    let id = TicketId::new(parse_id(&id, "Ticket")?);
    state
        .pages
        .tickets
        .get(id)
        .await
        .map(|page| html(&page))
        .ok_or_else(|| AppError::not_found("Ticket", id))
}

//! `POST /buy`

use crate::{pages, state::AppState};
use axum::{Form, extract::State, response::Html};
use boxoffice_core::VariationId;
use boxoffice_runtime::SaleOutcome;
use serde::Deserialize;

/// Purchase form.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BuyForm {
    /// Raw variation id; anything that is not an integer is sold out
    pub variation_id: String,
    /// Buyer's member id
    pub member_id: String,
}

/// Sell one seat. Answers with the confirmation or the sold-out page.
pub async fn buy(State(state): State<AppState>, Form(form): Form<BuyForm>) -> Html<String> {
    let Ok(variation) = form.variation_id.trim().parse::<i64>() else {
        tracing::debug!(variation_id = %form.variation_id, "Unparsable variation id");
        return Html(pages::sold_out());
    };

    match state.engine.sell(&form.member_id, VariationId::new(variation)).await {
        SaleOutcome::Sold(receipt) => Html(pages::complete(&form.member_id, &receipt.seat_label)),
        SaleOutcome::SoldOut => Html(pages::sold_out()),
    }
}

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Serialize;

use crate::{
    api::state::AppState,
    error::Result,
    payments::redsys::SignedParameters,
};

#[derive(Debug, Serialize)]
pub struct CardPaymentForm {
    /// Where the payer's browser posts `fields`.
    pub url: String,
    pub order: String,
    pub fields: SignedParameters,
}

pub async fn card_payment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CardPaymentForm>> {
    let request = state
        .service_context
        .billing_service
        .first_payment_form(id, Utc::now())
        .await?;

    Ok(Json(CardPaymentForm {
        url: request.url,
        order: request.merchant_order_id,
        fields: request.fields,
    }))
}

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;

use crate::{
    api::state::AppState,
    payments::redsys::{CallbackAck, GatewayCallback},
};

/// Gateway payment notification. Always answers 200 with `OK`/`KO`; a `KO`
/// makes the gateway retry, so failures are logged rather than returned.
pub async fn redsys_callback(
    State(state): State<AppState>,
    body: Bytes,
) -> impl IntoResponse {
    let billing = &state.service_context.billing_service;

    let callback = match GatewayCallback::parse(&body) {
        Ok(callback) => callback,
        Err(e) => {
            tracing::warn!("Rejected gateway callback: {}", e);
            return ack_response(billing.callback_ack(None, false));
        }
    };

    let paid = match billing.process_callback(&callback, Utc::now()).await {
        Ok(paid) => paid,
        Err(e) => {
            tracing::error!(
                "Failed to process gateway callback for {:?}: {}",
                callback.order_id(),
                e
            );
            false
        }
    };

    ack_response(billing.callback_ack(Some(&callback), paid))
}

fn ack_response(ack: CallbackAck) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, ack.content_type())],
        ack.body().to_string(),
    )
}

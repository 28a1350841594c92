pub mod handlers;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::CorsLayer,
    trace::TraceLayer,
};
use std::sync::Arc;

use crate::service::ServiceContext;
use state::AppState;

pub fn create_app(service_context: Arc<ServiceContext>) -> Router {
    let app_state = AppState::new(service_context);

    Router::new()
        .route("/health", get(handlers::root::health_check))

        // Gateway notifications (no auth, verified by signature)
        .route("/orders/callback/redsys", post(handlers::orders::redsys_callback))

        .route("/collaborations/:id/card-payment", post(handlers::collaborations::card_payment))

        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

// src/handlers/mod.rs
use axum::{
    routing::{get, patch, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::state::AppState;

pub mod auth;
pub mod channel_handler;
pub mod driver_handler;
pub mod payment_handler;
pub mod ride_handler;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/rides", post(ride_handler::create_ride))
        .route("/rides/:id", get(ride_handler::get_ride))
        .route("/rides/:id/status", patch(ride_handler::update_status))
        .route("/rides/:id/complete", post(ride_handler::complete_ride))
        .route("/rides/:id/cancel", post(ride_handler::cancel_ride))
        .route("/rides/:id/offer-response", post(driver_handler::respond_to_offer))
        .route("/payments/confirm", post(payment_handler::confirm_payment))
        .route("/drivers/presence", put(driver_handler::update_presence))
        .route(
            "/channels/me",
            put(channel_handler::register_channel).delete(channel_handler::unregister_channel),
        )
        .route("/wallets/me", get(payment_handler::my_wallet))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "sparrow-rides" }))
}

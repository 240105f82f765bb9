// src/handlers/payment_handler.rs
use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{
    errors::SparrowResult,
    handlers::auth::AuthenticatedActor,
    models::{
        ride::{ConfirmPaymentRequest, RideResponse},
        wallet::WalletResponse,
    },
    state::AppState,
};

pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(request): Json<ConfirmPaymentRequest>,
) -> SparrowResult<Json<RideResponse>> {
    let ride = state.ride_service.confirm_payment(&actor, request).await?;
    Ok(Json(RideResponse::for_viewer(ride, &actor)))
}

pub async fn my_wallet(
    State(state): State<Arc<AppState>>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> SparrowResult<Json<WalletResponse>> {
    Ok(Json(state.ride_service.wallet(&actor).await?))
}

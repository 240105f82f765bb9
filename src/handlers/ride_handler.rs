// src/handlers/ride_handler.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::{
    errors::SparrowResult,
    handlers::auth::AuthenticatedActor,
    models::ride::{CancelRideRequest, CompleteRideRequest, RideRequest, RideResponse, StatusUpdateRequest},
    state::AppState,
};

pub async fn create_ride(
    State(state): State<Arc<AppState>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(request): Json<RideRequest>,
) -> SparrowResult<(StatusCode, Json<RideResponse>)> {
    let ride = state.ride_service.create_ride(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(RideResponse::for_viewer(ride, &actor))))
}

pub async fn get_ride(
    State(state): State<Arc<AppState>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(ride_id): Path<String>,
) -> SparrowResult<Json<RideResponse>> {
    let ride = state.ride_service.get_ride(&ride_id, &actor).await?;
    Ok(Json(RideResponse::for_viewer(ride, &actor)))
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(ride_id): Path<String>,
    Json(request): Json<StatusUpdateRequest>,
) -> SparrowResult<Json<RideResponse>> {
    let ride = state.ride_service.update_status(&ride_id, &actor, request).await?;
    Ok(Json(RideResponse::for_viewer(ride, &actor)))
}

pub async fn complete_ride(
    State(state): State<Arc<AppState>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(ride_id): Path<String>,
    Json(request): Json<CompleteRideRequest>,
) -> SparrowResult<Json<RideResponse>> {
    let ride = state.ride_service.complete_ride(&ride_id, &actor, request).await?;
    Ok(Json(RideResponse::for_viewer(ride, &actor)))
}

pub async fn cancel_ride(
    State(state): State<Arc<AppState>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(ride_id): Path<String>,
    Json(request): Json<CancelRideRequest>,
) -> SparrowResult<Json<RideResponse>> {
    let ride = state.ride_service.cancel_ride(&ride_id, &actor, request.reason).await?;
    Ok(Json(RideResponse::for_viewer(ride, &actor)))
}

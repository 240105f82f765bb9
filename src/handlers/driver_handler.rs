// src/handlers/driver_handler.rs
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::{
    errors::{SparrowError as AppError, SparrowResult},
    handlers::auth::AuthenticatedActor,
    models::{
        driver::{DriverPresence, DriverStatus, OfferReply, OfferReplyAck, PresenceUpdate},
        Actor,
    },
    services::messaging_service::ChannelHandle,
    state::AppState,
};

fn driver_id(actor: &Actor) -> SparrowResult<&str> {
    match actor {
        Actor::Driver(id) => Ok(id.as_str()),
        _ => Err(AppError::forbidden("driver role required")),
    }
}

pub async fn update_presence(
    State(state): State<Arc<AppState>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(update): Json<PresenceUpdate>,
) -> SparrowResult<Json<DriverPresence>> {
    let driver_id = driver_id(&actor)?;
    match (update.status, &update.channel) {
        (DriverStatus::Offline, _) => state.channels.disconnect(driver_id),
        (DriverStatus::Online, Some(channel)) => {
            state.channels.connect(driver_id, ChannelHandle(channel.clone()))
        }
        (DriverStatus::Online, None) => {}
    }
    Ok(Json(state.driver_service.update_presence(driver_id, &update)))
}

/// Driver's answer to a pending offer. Late or duplicate answers are
/// acknowledged with `delivered: false` and change nothing.
pub async fn respond_to_offer(
    State(state): State<Arc<AppState>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(ride_id): Path<String>,
    Json(reply): Json<OfferReply>,
) -> SparrowResult<Json<OfferReplyAck>> {
    let driver_id = driver_id(&actor)?;
    let delivered = state.response_hub.respond(&ride_id, driver_id, reply);
    tracing::debug!(
        "Offer reply from {} for ride {} (accepted: {}, delivered: {})",
        driver_id, ride_id, reply.accepted, delivered
    );
    Ok(Json(OfferReplyAck { delivered }))
}

// src/handlers/channel_handler.rs
use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{
    errors::{SparrowError as AppError, SparrowResult},
    handlers::auth::AuthenticatedActor,
    models::{
        messages::{ChannelRegistration, ChannelStatus},
        Actor,
    },
    services::messaging_service::ChannelHandle,
    state::AppState,
};

fn user_id(actor: &Actor) -> SparrowResult<&str> {
    actor
        .user_id()
        .ok_or_else(|| AppError::forbidden("the system actor has no push channel"))
}

/// Registers the caller's push channel, replacing any earlier one.
pub async fn register_channel(
    State(state): State<Arc<AppState>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(registration): Json<ChannelRegistration>,
) -> SparrowResult<Json<ChannelStatus>> {
    let user_id = user_id(&actor)?;
    if registration.channel.trim().is_empty() {
        return Err(AppError::validation_error("channel", "Channel handle is required"));
    }

    state
        .channels
        .connect(user_id, ChannelHandle(registration.channel.clone()));
    tracing::debug!("Push channel for {} registered", actor);

    Ok(Json(ChannelStatus {
        user_id: user_id.to_string(),
        channel: Some(registration.channel),
    }))
}

pub async fn unregister_channel(
    State(state): State<Arc<AppState>>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> SparrowResult<Json<ChannelStatus>> {
    let user_id = user_id(&actor)?;
    state.channels.disconnect(user_id);
    tracing::debug!("Push channel for {} removed", actor);

    Ok(Json(ChannelStatus {
        user_id: user_id.to_string(),
        channel: None,
    }))
}

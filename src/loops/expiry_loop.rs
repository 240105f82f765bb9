//! Request expiry loop.
//!
//! Cancels rides still searching after their request window closes, so a
//! dispatch episode that died with its process does not leave riders waiting.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::interval;

use crate::state::AppState;

pub async fn run_request_expiry_loop(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval(state.config.expiry_sweep_interval);
    tracing::info!(
        "Request expiry loop started (every {:?}, ttl {} min)",
        state.config.expiry_sweep_interval, state.config.request_ttl_min
    );

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Request expiry loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                match state.ride_service.expire_stale_requests().await {
                    Ok(0) => {}
                    Ok(expired) => tracing::info!("Expired {} stale ride requests", expired),
                    Err(err) => tracing::warn!("Request expiry sweep failed: {}", err),
                }
            }
        }
    }
}

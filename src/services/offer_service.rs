// src/services/offer_service.rs
//! Timed ride offers: push an offer to one driver, then wait for that
//! driver's correlated answer or the timeout, whichever comes first.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::{
    models::{driver::DriverCandidate, driver::OfferReply, messages::RideEvent, ride::Ride},
    services::{geo_service::RouteEstimate, messaging_service::NotificationService},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OfferKey {
    pub ride_id: String,
    pub driver_id: String,
}

impl OfferKey {
    pub fn new(ride_id: &str, driver_id: &str) -> Self {
        Self {
            ride_id: ride_id.to_string(),
            driver_id: driver_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferOutcome {
    Accepted,
    Declined,
    TimedOut,
    /// Delivery failed; the dispatch loop treats this like a decline.
    Failed(String),
}

/// Pending offers waiting for a driver's reply, keyed by (ride, driver).
#[derive(Debug, Default)]
pub struct ResponseHub {
    pending: DashMap<OfferKey, oneshot::Sender<OfferReply>>,
}

impl ResponseHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: OfferKey) -> oneshot::Receiver<OfferReply> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(key, tx);
        rx
    }

    /// Routes a driver's reply to the waiting offer. Returns false, and
    /// changes nothing, when no offer is waiting (already answered, timed
    /// out, or never made).
    pub fn respond(&self, ride_id: &str, driver_id: &str, reply: OfferReply) -> bool {
        match self.pending.remove(&OfferKey::new(ride_id, driver_id)) {
            Some((_, tx)) => tx.send(reply).is_ok(),
            None => {
                tracing::debug!("Dropping reply from {} for ride {}: no pending offer", driver_id, ride_id);
                false
            }
        }
    }

    pub fn cancel(&self, key: &OfferKey) {
        self.pending.remove(key);
    }

    /// `None` on timeout.
    pub async fn await_response(
        &self,
        key: &OfferKey,
        rx: oneshot::Receiver<OfferReply>,
        timeout: Duration,
    ) -> Option<OfferReply> {
        let result = tokio::time::timeout(timeout, rx).await;
        // Receiver is gone now; drop the entry unless a newer offer replaced it
        self.pending.remove_if(key, |_, tx| tx.is_closed());
        match result {
            Ok(Ok(reply)) => Some(reply),
            _ => None,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
pub trait OfferProtocol: Send + Sync {
    /// Exactly one outcome per call, no internal retries.
    async fn offer(
        &self,
        ride: &Ride,
        candidate: &DriverCandidate,
        pickup_leg: &RouteEstimate,
        timeout: Duration,
    ) -> OfferOutcome;
}

/// Offers pushed through the notification channel, answered through the
/// response hub.
pub struct RealtimeOfferProtocol {
    hub: Arc<ResponseHub>,
    notifier: Arc<dyn NotificationService>,
}

impl RealtimeOfferProtocol {
    pub fn new(hub: Arc<ResponseHub>, notifier: Arc<dyn NotificationService>) -> Self {
        Self { hub, notifier }
    }
}

#[async_trait]
impl OfferProtocol for RealtimeOfferProtocol {
    async fn offer(
        &self,
        ride: &Ride,
        candidate: &DriverCandidate,
        pickup_leg: &RouteEstimate,
        timeout: Duration,
    ) -> OfferOutcome {
        let key = OfferKey::new(&ride.id, &candidate.driver_id);
        // Register before sending so an instant reply is not lost
        let rx = self.hub.register(key.clone());

        let event = RideEvent::RideOffer {
            ride_id: ride.id.clone(),
            pickup: ride.pickup.clone(),
            drop: ride.drop.clone(),
            category: ride.category,
            fare: ride.fare,
            distance_km: ride.distance_km,
            pickup_distance_km: pickup_leg.distance_km,
            pickup_duration_min: pickup_leg.duration_min,
            expires_in_ms: timeout.as_millis() as u64,
        };

        if let Err(e) = self.notifier.notify(&candidate.driver_id, &event).await {
            self.hub.cancel(&key);
            return OfferOutcome::Failed(e.to_string());
        }

        match self.hub.await_response(&key, rx, timeout).await {
            Some(OfferReply { accepted: true }) => OfferOutcome::Accepted,
            Some(OfferReply { accepted: false }) => OfferOutcome::Declined,
            None => OfferOutcome::TimedOut,
        }
    }
}

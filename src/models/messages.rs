// src/models/messages.rs
use serde::{Deserialize, Serialize};

use crate::models::ride::{CancelledBy, PaymentMode, Place, VehicleCategory};

/// Every event pushed to riders and drivers. The `event` tag is the
/// name seen by clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RideEvent {
    RideOffer {
        ride_id: String,
        pickup: Place,
        drop: Place,
        category: VehicleCategory,
        fare: i64,
        distance_km: f64,
        pickup_distance_km: f64,
        pickup_duration_min: f64,
        expires_in_ms: u64,
    },
    DriverAssigned {
        ride_id: String,
        driver_id: String,
        pickup_distance_km: f64,
        pickup_duration_min: f64,
    },
    RideUnavailable {
        ride_id: String,
    },
    DriverArrived {
        ride_id: String,
    },
    RideStarted {
        ride_id: String,
        extra_charges: i64,
        fare: i64,
    },
    RideCompleted {
        ride_id: String,
        total_amount: i64,
        payment_mode: PaymentMode,
    },
    PaymentRequested {
        ride_id: String,
        order_id: String,
        amount: i64,
    },
    PaymentConfirmed {
        ride_id: String,
        amount: i64,
    },
    RideCancelled {
        ride_id: String,
        cancelled_by: CancelledBy,
        reason: Option<String>,
        fee: i64,
    },
    NoDriverFound {
        ride_id: String,
    },
}

impl RideEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RideEvent::RideOffer { .. } => "ride_offer",
            RideEvent::DriverAssigned { .. } => "driver_assigned",
            RideEvent::RideUnavailable { .. } => "ride_unavailable",
            RideEvent::DriverArrived { .. } => "driver_arrived",
            RideEvent::RideStarted { .. } => "ride_started",
            RideEvent::RideCompleted { .. } => "ride_completed",
            RideEvent::PaymentRequested { .. } => "payment_requested",
            RideEvent::PaymentConfirmed { .. } => "payment_confirmed",
            RideEvent::RideCancelled { .. } => "ride_cancelled",
            RideEvent::NoDriverFound { .. } => "no_driver_found",
        }
    }

    pub fn ride_id(&self) -> &str {
        match self {
            RideEvent::RideOffer { ride_id, .. }
            | RideEvent::DriverAssigned { ride_id, .. }
            | RideEvent::RideUnavailable { ride_id }
            | RideEvent::DriverArrived { ride_id }
            | RideEvent::RideStarted { ride_id, .. }
            | RideEvent::RideCompleted { ride_id, .. }
            | RideEvent::PaymentRequested { ride_id, .. }
            | RideEvent::PaymentConfirmed { ride_id, .. }
            | RideEvent::RideCancelled { ride_id, .. }
            | RideEvent::NoDriverFound { ride_id } => ride_id,
        }
    }
}

/// A client app announcing where its events should be pushed.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChannelRegistration {
    /// Device token or socket id understood by the push gateway.
    pub channel: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChannelStatus {
    pub user_id: String,
    pub channel: Option<String>,
}

// src/models/driver.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ride::{Coordinates, VehicleCategory};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Offline, // Not taking rides
    Online,  // Available for offers
}

/// Last known presence of a driver as reported by the driver app.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DriverPresence {
    pub driver_id: String,
    pub status: DriverStatus,
    pub location: Coordinates,
    pub category: VehicleCategory,
    pub updated_at: DateTime<Utc>,
}

/// Read-only snapshot handed to the dispatch loop for one search iteration.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DriverCandidate {
    pub driver_id: String,
    pub location: Coordinates,
    pub category: VehicleCategory,
    /// Straight-line distance from the pickup point.
    pub distance_km: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub status: DriverStatus,
    pub location: Coordinates,
    pub category: VehicleCategory,
    /// Push channel handle (device token or socket id) for this driver.
    #[serde(default)]
    pub channel: Option<String>,
}

/// A driver's answer to a ride offer.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct OfferReply {
    pub accepted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OfferReplyAck {
    /// False when the offer had already timed out or been answered.
    pub delivered: bool,
}

// src/models/ride.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::actor::Actor;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Searching,      // Created, dispatch episode running
    Accepted,       // A driver won the assignment
    DriverArrived,  // Driver waiting at pickup, wait clock running
    RideStarted,    // OTP verified, trip underway
    PaymentPending, // Trip over, electronic payment outstanding
    RideEnded,
    Cancelled,
}

impl RideStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::RideEnded | RideStatus::Cancelled)
    }

    /// States in which a driver must be attached to the ride.
    pub fn requires_driver(&self) -> bool {
        matches!(
            self,
            RideStatus::Accepted
                | RideStatus::DriverArrived
                | RideStatus::RideStarted
                | RideStatus::PaymentPending
                | RideStatus::RideEnded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Searching => "SEARCHING",
            RideStatus::Accepted => "ACCEPTED",
            RideStatus::DriverArrived => "DRIVER_ARRIVED",
            RideStatus::RideStarted => "RIDE_STARTED",
            RideStatus::PaymentPending => "PAYMENT_PENDING",
            RideStatus::RideEnded => "RIDE_ENDED",
            RideStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VehicleCategory {
    Hatchback,
    Sedan,
    Suv,
    Van, // Long-haul, flat tariff
}

impl fmt::Display for VehicleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VehicleCategory::Hatchback => "hatchback",
            VehicleCategory::Sedan => "sedan",
            VehicleCategory::Suv => "suv",
            VehicleCategory::Van => "van",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TripKind {
    #[default]
    OneWay,
    RoundTrip,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Cash,
    Online,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A pickup or drop point. Either side may be missing on input; the geo
/// service fills in coordinates from the address when needed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Place {
    pub address: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    /// Administrative region (state) used for regional surcharges.
    #[serde(default)]
    pub region: Option<String>,
}

impl Place {
    pub fn at(address: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            address: address.into(),
            coordinates: Some(Coordinates { latitude, longitude }),
            region: None,
        }
    }

    pub fn in_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Driver-to-pickup leg estimated for the driver that won the ride.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PickupMetrics {
    pub distance_km: f64,
    pub duration_min: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Rider,
    Driver,
    System,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Cancellation {
    pub cancelled_by: CancelledBy,
    pub reason: Option<String>,
    pub fee: i64,
    /// Driver that was attached when the ride was cancelled, if any.
    pub released_driver_id: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Ride {
    pub id: String,
    pub rider_id: String,
    pub driver_id: Option<String>,
    pub status: RideStatus,

    pub pickup: Place,
    pub drop: Place,
    pub category: VehicleCategory,
    pub trip_kind: TripKind,

    // Commercial fields; amounts are whole currency units
    pub distance_km: f64,
    pub duration_min: f64,
    pub estimated_fare: i64,
    pub fare: i64,
    pub extra_charges: i64,
    pub total_amount: Option<i64>,
    pub payment_mode: PaymentMode,
    pub payment_status: PaymentStatus,
    pub payment_order_id: Option<String>,

    // Protocol state
    pub otp: String,
    pub pickup_metrics: Option<PickupMetrics>,
    pub wait_started_at: Option<DateTime<Utc>>,
    pub request_expires_at: Option<DateTime<Utc>>,

    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub cancellation: Option<Cancellation>,

    /// Optimistic concurrency counter, bumped by every store write.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    pub fn is_assigned_driver(&self, driver_id: &str) -> bool {
        self.driver_id.as_deref() == Some(driver_id)
    }

    /// Whether `actor` may see this ride at all.
    pub fn is_visible_to(&self, actor: &Actor) -> bool {
        match actor {
            Actor::Rider(id) => self.rider_id == *id,
            Actor::Driver(id) => self.is_assigned_driver(id),
            Actor::System => true,
        }
    }

    /// Applies the winning driver. Callers check the SEARCHING/no-driver
    /// precondition under their own lock or transaction.
    pub fn assign(&mut self, driver_id: &str, metrics: PickupMetrics, at: DateTime<Utc>) {
        self.driver_id = Some(driver_id.to_string());
        self.status = RideStatus::Accepted;
        self.pickup_metrics = Some(metrics);
        self.accepted_at = Some(at);
        self.updated_at = at;
    }

    pub fn can_be_assigned(&self) -> bool {
        self.status == RideStatus::Searching && self.driver_id.is_none()
    }

    /// driver_id is set exactly in the driver-bearing states.
    pub fn driver_invariant_holds(&self) -> bool {
        self.driver_id.is_some() == self.status.requires_driver()
    }
}

// Request/Response Models
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RideRequest {
    pub pickup: Place,
    pub drop: Place,
    pub category: VehicleCategory,
    #[serde(default)]
    pub trip_kind: TripKind,
    pub payment_mode: PaymentMode,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatusUpdateRequest {
    pub status: RideStatus,
    #[serde(default)]
    pub otp: Option<String>,
    #[serde(default)]
    pub final_location: Option<Place>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CompleteRideRequest {
    #[serde(default)]
    pub final_location: Option<Place>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CancelRideRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConfirmPaymentRequest {
    pub ride_id: String,
    pub order_id: String,
    /// Provider's reference for the captured payment against `order_id`.
    pub payment_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RideResponse {
    pub id: String,
    pub rider_id: String,
    pub driver_id: Option<String>,
    pub status: RideStatus,
    pub pickup: Place,
    pub drop: Place,
    pub category: VehicleCategory,
    pub trip_kind: TripKind,
    pub distance_km: f64,
    pub duration_min: f64,
    pub estimated_fare: i64,
    pub fare: i64,
    pub extra_charges: i64,
    pub total_amount: Option<i64>,
    pub payment_mode: PaymentMode,
    pub payment_status: PaymentStatus,
    pub payment_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
    pub pickup_metrics: Option<PickupMetrics>,
    pub cancellation: Option<Cancellation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RideResponse {
    /// Only the rider gets to see the OTP.
    pub fn for_viewer(ride: Ride, viewer: &Actor) -> Self {
        let otp = matches!(viewer, Actor::Rider(id) if *id == ride.rider_id).then_some(ride.otp);
        Self {
            id: ride.id,
            rider_id: ride.rider_id,
            driver_id: ride.driver_id,
            status: ride.status,
            pickup: ride.pickup,
            drop: ride.drop,
            category: ride.category,
            trip_kind: ride.trip_kind,
            distance_km: ride.distance_km,
            duration_min: ride.duration_min,
            estimated_fare: ride.estimated_fare,
            fare: ride.fare,
            extra_charges: ride.extra_charges,
            total_amount: ride.total_amount,
            payment_mode: ride.payment_mode,
            payment_status: ride.payment_status,
            payment_order_id: ride.payment_order_id,
            otp,
            pickup_metrics: ride.pickup_metrics,
            cancellation: ride.cancellation,
            created_at: ride.created_at,
            updated_at: ride.updated_at,
        }
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use sparrow_rides::{
    config::{AppConfig, DispatchMode},
    models::{
        driver::{DriverStatus, OfferReply, PresenceUpdate},
        ride::{
            Coordinates, PaymentMode, PaymentStatus, Place, Ride, RideRequest, RideStatus, TripKind, VehicleCategory,
        },
    },
    services::{
        geo_service::{GeoEstimator, HttpGeoEstimator, RouteEstimate},
        messaging_service::MockNotificationService,
        payment_service::MockPaymentGateway,
    },
    state::{AppState, StateParts},
    utils::clock::ManualClock,
    SparrowResult,
};

pub const CONNAUGHT_PLACE: Coordinates = Coordinates { latitude: 28.6315, longitude: 77.2167 };
pub const CYBER_CITY: Coordinates = Coordinates { latitude: 28.4949, longitude: 77.0887 };

/// Road route of 28 km / 55 min between the two named places, great-circle
/// estimates for everything else.
pub struct FixedRouteGeo {
    fallback: HttpGeoEstimator,
}

#[async_trait]
impl GeoEstimator for FixedRouteGeo {
    async fn resolve(&self, place: &Place) -> SparrowResult<Coordinates> {
        self.fallback.resolve(place).await
    }

    async fn estimate(&self, origin: &Place, destination: &Place) -> SparrowResult<RouteEstimate> {
        if origin.address == "Connaught Place" && destination.address == "Cyber City" {
            return Ok(RouteEstimate { distance_km: 28.0, duration_min: 55.0 });
        }
        self.fallback.estimate(origin, destination).await
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<MockNotificationService>,
    pub payments: Arc<MockPaymentGateway>,
}

pub fn test_app(mode: DispatchMode) -> TestApp {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let notifier = Arc::new(MockNotificationService::new());
    let payments = Arc::new(MockPaymentGateway::new());
    let config = AppConfig {
        dispatch_mode: mode,
        ..AppConfig::default()
    };

    let mut parts = StateParts::in_memory(clock.clone(), notifier.clone());
    parts.geo = Arc::new(FixedRouteGeo {
        fallback: HttpGeoEstimator::offline(),
    });
    parts.payments = payments.clone();

    TestApp {
        state: Arc::new(AppState::from_parts(config, parts)),
        clock,
        notifier,
        payments,
    }
}

pub fn connaught_to_cyber_city(payment_mode: PaymentMode) -> RideRequest {
    RideRequest {
        pickup: Place {
            address: "Connaught Place".into(),
            coordinates: Some(CONNAUGHT_PLACE),
            region: None,
        },
        drop: Place {
            address: "Cyber City".into(),
            coordinates: Some(CYBER_CITY),
            region: None,
        },
        category: VehicleCategory::Sedan,
        trip_kind: TripKind::OneWay,
        payment_mode,
    }
}

impl TestApp {
    pub fn driver_online(&self, driver_id: &str, latitude: f64, longitude: f64) {
        self.state.driver_service.update_presence(
            driver_id,
            &PresenceUpdate {
                status: DriverStatus::Online,
                location: Coordinates { latitude, longitude },
                category: VehicleCategory::Sedan,
                channel: None,
            },
        );
    }

    /// Plays the driver app: answers the offer as soon as it is pending.
    pub async fn answer_offer(&self, ride_id: &str, driver_id: &str, accepted: bool) -> bool {
        for _ in 0..400 {
            if self.state.response_hub.respond(ride_id, driver_id, OfferReply { accepted }) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    pub async fn wait_for_status(&self, ride_id: &str, status: RideStatus) -> Ride {
        for _ in 0..400 {
            let ride = self.ride(ride_id).await;
            if ride.status == status {
                return ride;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("ride {ride_id} never reached {status}");
    }

    pub async fn ride(&self, ride_id: &str) -> Ride {
        self.state.store.get(ride_id).await.unwrap().expect("ride exists")
    }

    /// Pins the OTP so tests can use a known code.
    pub async fn set_otp(&self, ride_id: &str, otp: &str) {
        let mut ride = self.ride(ride_id).await;
        ride.otp = otp.to_string();
        self.state.store.commit(ride.version, &ride, &[]).await.unwrap();
    }

    pub async fn balance(&self, user_id: &str) -> i64 {
        self.state.store.wallet_balance(user_id).await.unwrap()
    }
}

/// A SEARCHING CP to Cyber City request, ready to insert straight into a store.
pub fn searching_ride(id: &str) -> Ride {
    let now = Utc::now();
    Ride {
        id: id.to_string(),
        rider_id: "rider-1".into(),
        driver_id: None,
        status: RideStatus::Searching,
        pickup: Place::at("Connaught Place", CONNAUGHT_PLACE.latitude, CONNAUGHT_PLACE.longitude),
        drop: Place::at("Cyber City", CYBER_CITY.latitude, CYBER_CITY.longitude),
        category: VehicleCategory::Sedan,
        trip_kind: TripKind::OneWay,
        distance_km: 28.0,
        duration_min: 55.0,
        estimated_fare: 582,
        fare: 582,
        extra_charges: 0,
        total_amount: None,
        payment_mode: PaymentMode::Cash,
        payment_status: PaymentStatus::Pending,
        payment_order_id: None,
        otp: "5555".into(),
        pickup_metrics: None,
        wait_started_at: None,
        request_expires_at: Some(now + chrono::Duration::minutes(10)),
        accepted_at: None,
        started_at: None,
        ended_at: None,
        cancellation: None,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}

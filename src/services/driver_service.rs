// src/services/driver_service.rs
use async_trait::async_trait;
use chrono::Duration;
use dashmap::{mapref::entry::Entry, DashMap};
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    models::driver::{DriverCandidate, DriverPresence, DriverStatus, PresenceUpdate},
    models::ride::{Coordinates, VehicleCategory},
    utils::clock::Clock,
    utils::geo::haversine_km,
};

/// Lookup of drivers that can be offered a ride. Finding nobody is a normal
/// answer, so queries never fail.
#[async_trait]
pub trait DriverDirectory: Send + Sync {
    /// Online drivers of `category` within `radius_km` of `pickup`, nearest
    /// first, skipping everyone in `exclude`.
    async fn find_online(
        &self,
        pickup: &Coordinates,
        radius_km: f64,
        category: VehicleCategory,
        exclude: &HashSet<String>,
    ) -> Vec<DriverCandidate>;

    /// Flags a driver as busy with a ride (or free again).
    async fn set_engaged(&self, driver_id: &str, engaged: bool);

    /// Marks a free driver busy. Returns false, changing nothing, when the
    /// driver is already engaged.
    async fn try_engage(&self, driver_id: &str) -> bool;
}

/// In-process presence table fed by driver app heartbeats.
pub struct DriverService {
    drivers: DashMap<String, DriverPresence>,
    engaged: DashMap<String, ()>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
}

impl DriverService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            drivers: DashMap::new(),
            engaged: DashMap::new(),
            clock,
            stale_after: Duration::minutes(5),
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn update_presence(&self, driver_id: &str, update: &PresenceUpdate) -> DriverPresence {
        let presence = DriverPresence {
            driver_id: driver_id.to_string(),
            status: update.status,
            location: update.location,
            category: update.category,
            updated_at: self.clock.now(),
        };
        tracing::debug!(
            "Presence for driver {}: {:?} at {},{}",
            driver_id, presence.status, presence.location.latitude, presence.location.longitude
        );
        self.drivers.insert(driver_id.to_string(), presence.clone());
        presence
    }

    pub fn presence(&self, driver_id: &str) -> Option<DriverPresence> {
        self.drivers.get(driver_id).map(|entry| entry.value().clone())
    }

    pub fn is_engaged(&self, driver_id: &str) -> bool {
        self.engaged.contains_key(driver_id)
    }
}

#[async_trait]
impl DriverDirectory for DriverService {
    async fn find_online(
        &self,
        pickup: &Coordinates,
        radius_km: f64,
        category: VehicleCategory,
        exclude: &HashSet<String>,
    ) -> Vec<DriverCandidate> {
        let fresh_since = self.clock.now() - self.stale_after;

        let mut candidates: Vec<DriverCandidate> = self
            .drivers
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|p| p.status == DriverStatus::Online && p.category == category)
            .filter(|p| p.updated_at >= fresh_since)
            .filter(|p| !exclude.contains(&p.driver_id) && !self.is_engaged(&p.driver_id))
            .filter_map(|p| {
                let distance_km = haversine_km(pickup, &p.location);
                (distance_km <= radius_km).then(|| DriverCandidate {
                    driver_id: p.driver_id,
                    location: p.location,
                    category: p.category,
                    distance_km,
                })
            })
            .collect();

        candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        candidates
    }

    async fn set_engaged(&self, driver_id: &str, engaged: bool) {
        if engaged {
            self.engaged.insert(driver_id.to_string(), ());
        } else {
            self.engaged.remove(driver_id);
        }
    }

    async fn try_engage(&self, driver_id: &str) -> bool {
        match self.engaged.entry(driver_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(());
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;
    use chrono::Utc;

    const PICKUP: Coordinates = Coordinates { latitude: 28.6315, longitude: 77.2167 };

    fn online(service: &DriverService, id: &str, lat: f64, lng: f64, category: VehicleCategory) {
        service.update_presence(
            id,
            &PresenceUpdate {
                status: DriverStatus::Online,
                location: Coordinates { latitude: lat, longitude: lng },
                category,
                channel: None,
            },
        );
    }

    #[tokio::test]
    async fn returns_nearest_first_within_radius() {
        let service = DriverService::new(Arc::new(ManualClock::new(Utc::now())));
        online(&service, "far", 28.6500, 77.2167, VehicleCategory::Sedan); // ~2 km
        online(&service, "near", 28.6330, 77.2167, VehicleCategory::Sedan); // ~0.2 km
        online(&service, "outside", 28.7500, 77.2167, VehicleCategory::Sedan); // ~13 km

        let found = service.find_online(&PICKUP, 3.0, VehicleCategory::Sedan, &HashSet::new()).await;
        let ids: Vec<_> = found.iter().map(|c| c.driver_id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
    }

    #[tokio::test]
    async fn filters_category_exclusions_and_engaged() {
        let service = DriverService::new(Arc::new(ManualClock::new(Utc::now())));
        online(&service, "suv", 28.6320, 77.2167, VehicleCategory::Suv);
        online(&service, "tried", 28.6320, 77.2167, VehicleCategory::Sedan);
        online(&service, "busy", 28.6320, 77.2167, VehicleCategory::Sedan);
        online(&service, "free", 28.6320, 77.2167, VehicleCategory::Sedan);
        service.set_engaged("busy", true).await;

        let exclude = HashSet::from(["tried".to_string()]);
        let found = service.find_online(&PICKUP, 3.0, VehicleCategory::Sedan, &exclude).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].driver_id, "free");

        service.set_engaged("busy", false).await;
        let found = service.find_online(&PICKUP, 3.0, VehicleCategory::Sedan, &exclude).await;
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn stale_and_offline_drivers_are_skipped() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = DriverService::new(clock.clone());
        online(&service, "stale", 28.6320, 77.2167, VehicleCategory::Sedan);
        clock.advance(Duration::minutes(10));
        online(&service, "fresh", 28.6320, 77.2167, VehicleCategory::Sedan);
        service.update_presence(
            "off",
            &PresenceUpdate {
                status: DriverStatus::Offline,
                location: PICKUP,
                category: VehicleCategory::Sedan,
                channel: None,
            },
        );

        let found = service.find_online(&PICKUP, 3.0, VehicleCategory::Sedan, &HashSet::new()).await;
        let ids: Vec<_> = found.iter().map(|c| c.driver_id.as_str()).collect();
        assert_eq!(ids, vec!["fresh"]);
    }

    #[tokio::test]
    async fn stale_window_is_configurable() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = DriverService::new(clock.clone()).with_stale_after(Duration::seconds(30));
        online(&service, "quiet", 28.6320, 77.2167, VehicleCategory::Sedan);
        clock.advance(Duration::seconds(45));

        assert!(service.find_online(&PICKUP, 3.0, VehicleCategory::Sedan, &HashSet::new()).await.is_empty());
    }

    #[tokio::test]
    async fn engaging_is_first_come_first_served() {
        let service = DriverService::new(Arc::new(ManualClock::new(Utc::now())));
        assert!(service.try_engage("drv-1").await);
        assert!(!service.try_engage("drv-1").await);
        assert!(service.is_engaged("drv-1"));

        service.set_engaged("drv-1", false).await;
        assert!(service.try_engage("drv-1").await);
    }

    #[tokio::test]
    async fn nobody_online_is_empty_not_error() {
        let service = DriverService::new(Arc::new(ManualClock::new(Utc::now())));
        assert!(service.find_online(&PICKUP, 10.0, VehicleCategory::Van, &HashSet::new()).await.is_empty());
    }
}

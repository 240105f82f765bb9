// src/services/dispatch_engine.rs
//! Expanding-radius driver search for one ride. Offers go out one driver
//! at a time; the first acceptance that survives the store's
//! compare-and-swap wins the ride.

use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    config::DispatchConfig,
    errors::{SparrowError as AppError, SparrowResult},
    models::{
        driver::DriverCandidate,
        messages::RideEvent,
        ride::{Place, PickupMetrics, Ride, RideStatus},
    },
    services::{
        driver_service::DriverDirectory,
        geo_service::{GeoEstimator, RouteEstimate},
        messaging_service::{notify_quietly, NotificationService},
        offer_service::{OfferOutcome, OfferProtocol},
        ride_store::RideStore,
    },
    utils::{clock::Clock, geo::round_one_decimal},
};

#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Assigned(Ride),
    /// Every radius searched, nobody took the ride.
    Exhausted,
    /// The ride left SEARCHING through some other path (cancelled, expired,
    /// or assigned elsewhere).
    Superseded(RideStatus),
}

pub struct DispatchEngine {
    store: Arc<dyn RideStore>,
    directory: Arc<dyn DriverDirectory>,
    geo: Arc<dyn GeoEstimator>,
    offers: Arc<dyn OfferProtocol>,
    notifier: Arc<dyn NotificationService>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn RideStore>,
        directory: Arc<dyn DriverDirectory>,
        geo: Arc<dyn GeoEstimator>,
        offers: Arc<dyn OfferProtocol>,
        notifier: Arc<dyn NotificationService>,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            directory,
            geo,
            offers,
            notifier,
            clock,
            config,
        }
    }

    /// Latest stored ride, or why dispatch must stop.
    async fn still_searching(&self, ride_id: &str) -> SparrowResult<Result<Ride, RideStatus>> {
        let ride = self
            .store
            .get(ride_id)
            .await?
            .ok_or_else(|| AppError::ride_not_found(ride_id))?;
        if ride.status == RideStatus::Searching {
            Ok(Ok(ride))
        } else {
            Ok(Err(ride.status))
        }
    }

    pub async fn dispatch(&self, ride_id: &str) -> SparrowResult<DispatchOutcome> {
        let mut attempted: HashSet<String> = HashSet::new();

        for radius in self.config.search_radii() {
            let ride = match self.still_searching(ride_id).await? {
                Ok(ride) => ride,
                Err(status) => return Ok(DispatchOutcome::Superseded(status)),
            };
            let pickup = ride.pickup.coordinates.ok_or_else(|| {
                AppError::invalid_state(format!("ride {} has no pickup coordinates", ride_id))
            })?;

            let candidates = self
                .directory
                .find_online(&pickup, radius, ride.category, &attempted)
                .await;
            tracing::debug!("Ride {}: {} candidates within {} km", ride_id, candidates.len(), radius);

            for candidate in candidates {
                // Another path may have taken the ride while we waited on the last offer
                let ride = match self.still_searching(ride_id).await? {
                    Ok(ride) => ride,
                    Err(status) => return Ok(DispatchOutcome::Superseded(status)),
                };
                attempted.insert(candidate.driver_id.clone());

                let leg = self.pickup_leg(&ride, &candidate).await;
                let outcome = self
                    .offers
                    .offer(&ride, &candidate, &leg, self.config.offer_timeout)
                    .await;

                match outcome {
                    OfferOutcome::Accepted => {
                        // The driver may have taken another ride while this offer was open
                        if !self.directory.try_engage(&candidate.driver_id).await {
                            tracing::info!(
                                "Driver {} accepted ride {} while busy; treating as a decline",
                                candidate.driver_id, ride_id
                            );
                            continue;
                        }
                        let metrics = PickupMetrics {
                            distance_km: leg.distance_km,
                            duration_min: leg.duration_min,
                        };
                        match self
                            .store
                            .assign_driver(ride_id, &candidate.driver_id, metrics, self.clock.now())
                            .await
                        {
                            Ok(assigned) => {
                                tracing::info!("Ride {} assigned to driver {}", ride_id, candidate.driver_id);
                                self.announce(&assigned, &attempted).await;
                                return Ok(DispatchOutcome::Assigned(assigned));
                            }
                            Err(AppError::ConcurrencyConflict(_)) => {
                                self.directory.set_engaged(&candidate.driver_id, false).await;
                                tracing::warn!(
                                    "Driver {} accepted ride {} but lost the assignment race",
                                    candidate.driver_id, ride_id
                                );
                            }
                            Err(e) => {
                                self.directory.set_engaged(&candidate.driver_id, false).await;
                                tracing::error!(
                                    "Assigning ride {} to driver {} failed: {}",
                                    ride_id, candidate.driver_id, e
                                );
                            }
                        }
                    }
                    OfferOutcome::Declined => {
                        tracing::debug!("Driver {} declined ride {}", candidate.driver_id, ride_id);
                    }
                    OfferOutcome::TimedOut => {
                        tracing::debug!("Offer of ride {} to driver {} timed out", ride_id, candidate.driver_id);
                    }
                    OfferOutcome::Failed(reason) => {
                        tracing::warn!("Offer of ride {} to driver {} failed: {}", ride_id, candidate.driver_id, reason);
                    }
                }
            }
        }

        // One last look: a cancel during the final offer is not exhaustion
        match self.still_searching(ride_id).await? {
            Ok(_) => {
                tracing::info!("Ride {}: no driver within {} km", ride_id, self.config.max_radius_km);
                Ok(DispatchOutcome::Exhausted)
            }
            Err(status) => Ok(DispatchOutcome::Superseded(status)),
        }
    }

    /// Driver-to-pickup leg. Falls back to the directory's straight-line
    /// distance when the estimator cannot answer.
    async fn pickup_leg(&self, ride: &Ride, candidate: &DriverCandidate) -> RouteEstimate {
        let from = Place {
            address: format!("driver {}", candidate.driver_id),
            coordinates: Some(candidate.location),
            region: None,
        };
        match self.geo.estimate(&from, &ride.pickup).await {
            Ok(route) => route,
            Err(e) => {
                tracing::warn!("Pickup estimate for driver {} failed: {}", candidate.driver_id, e);
                RouteEstimate {
                    distance_km: round_one_decimal(candidate.distance_km),
                    duration_min: round_one_decimal(candidate.distance_km * 2.0),
                }
            }
        }
    }

    async fn announce(&self, ride: &Ride, attempted: &HashSet<String>) {
        let Some(driver_id) = ride.driver_id.as_deref() else {
            return;
        };

        let metrics = ride.pickup_metrics.unwrap_or(PickupMetrics {
            distance_km: 0.0,
            duration_min: 0.0,
        });
        notify_quietly(
            self.notifier.as_ref(),
            &ride.rider_id,
            RideEvent::DriverAssigned {
                ride_id: ride.id.clone(),
                driver_id: driver_id.to_string(),
                pickup_distance_km: metrics.distance_km,
                pickup_duration_min: metrics.duration_min,
            },
        )
        .await;

        let others: Vec<String> = attempted.iter().filter(|id| id.as_str() != driver_id).cloned().collect();
        if !others.is_empty() {
            self.notifier
                .broadcast(&others, &RideEvent::RideUnavailable { ride_id: ride.id.clone() })
                .await;
        }
    }
}

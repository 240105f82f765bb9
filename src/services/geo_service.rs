// src/services/geo_service.rs
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::{
    errors::{SparrowError as AppError, SparrowResult},
    models::ride::{Coordinates, Place},
    utils::geo::{haversine_km, round_one_decimal},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_min: f64,
}

#[async_trait]
pub trait GeoEstimator: Send + Sync {
    /// Coordinates for a place, geocoding the address when they are missing.
    async fn resolve(&self, place: &Place) -> SparrowResult<Coordinates>;
    /// Road distance and driving time between two places.
    async fn estimate(&self, origin: &Place, destination: &Place) -> SparrowResult<RouteEstimate>;
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    distance_km: f64,
    duration_min: f64,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    latitude: f64,
    longitude: f64,
}

/// Geo estimator backed by an HTTP routing service, falling back to a
/// great-circle estimate whenever the service is missing or failing.
pub struct HttpGeoEstimator {
    base_url: Option<String>,
    client: reqwest::Client,
    average_speed_kmh: f64,
}

impl HttpGeoEstimator {
    pub fn new(base_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url,
            client,
            // Conservative city average
            average_speed_kmh: 30.0,
        }
    }

    /// Great-circle only, no remote lookups.
    pub fn offline() -> Self {
        Self::new(None)
    }

    fn local_estimate(&self, from: &Coordinates, to: &Coordinates) -> RouteEstimate {
        let distance_km = haversine_km(from, to);
        RouteEstimate {
            distance_km: round_one_decimal(distance_km),
            duration_min: round_one_decimal(distance_km / self.average_speed_kmh * 60.0),
        }
    }

    async fn remote_route(&self, base_url: &str, from: &Coordinates, to: &Coordinates) -> SparrowResult<RouteEstimate> {
        let response = self
            .client
            .get(format!("{}/route", base_url.trim_end_matches('/')))
            .query(&[
                ("from", format!("{},{}", from.latitude, from.longitude)),
                ("to", format!("{},{}", to.latitude, to.longitude)),
            ])
            .send()
            .await?
            .error_for_status()?;
        let route: RouteResponse = response.json().await?;

        Ok(RouteEstimate {
            distance_km: round_one_decimal(route.distance_km),
            duration_min: round_one_decimal(route.duration_min),
        })
    }

    async fn remote_geocode(&self, base_url: &str, address: &str) -> SparrowResult<Coordinates> {
        let response = self
            .client
            .get(format!("{}/geocode", base_url.trim_end_matches('/')))
            .query(&[("q", address)])
            .send()
            .await?
            .error_for_status()?;
        let found: GeocodeResponse = response.json().await?;
        Ok(Coordinates {
            latitude: found.latitude,
            longitude: found.longitude,
        })
    }
}

#[async_trait]
impl GeoEstimator for HttpGeoEstimator {
    async fn resolve(&self, place: &Place) -> SparrowResult<Coordinates> {
        if let Some(coordinates) = place.coordinates {
            return Ok(coordinates);
        }
        if place.address.trim().is_empty() {
            return Err(AppError::validation_error("address", "Either an address or coordinates are required"));
        }
        let Some(base_url) = &self.base_url else {
            return Err(AppError::upstream(format!("cannot geocode '{}' without a geo service", place.address)));
        };

        tracing::debug!("Geocoding address: {}", place.address);
        self.remote_geocode(base_url, &place.address).await
    }

    async fn estimate(&self, origin: &Place, destination: &Place) -> SparrowResult<RouteEstimate> {
        let from = self.resolve(origin).await?;
        let to = self.resolve(destination).await?;

        if let Some(base_url) = &self.base_url {
            match self.remote_route(base_url, &from, &to).await {
                Ok(route) => return Ok(route),
                Err(e) => tracing::warn!("Route lookup failed, using great-circle estimate: {}", e),
            }
        }

        Ok(self.local_estimate(&from, &to))
    }
}

// src/services/fare_engine.rs
//! Pure fare arithmetic: trip estimates, regional surcharges, wait charges
//! and the final amount. Nothing here performs I/O.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::WaitPolicy;
use crate::errors::{SparrowError, SparrowResult};
use crate::models::ride::{Coordinates, Place, Ride, TripKind, VehicleCategory};
use crate::utils::geo::haversine_km;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tariff", rename_all = "snake_case")]
pub enum CategoryRate {
    /// Per-km pricing with a cheaper rate past the breakpoint.
    Metered {
        base_fee: f64,
        short_rate_per_km: f64,
        long_rate_per_km: f64,
        breakpoint_km: f64,
        #[serde(default)]
        per_minute_rate: f64,
    },
    /// Long-haul pricing: flat fare up to an allowance, per-km beyond it.
    Flat {
        flat_fare: f64,
        allowance_km: f64,
        overage_per_km: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTax {
    pub from_region: String,
    pub to_region: String,
    /// Applies to every category when unset.
    #[serde(default)]
    pub category: Option<VehicleCategory>,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub name: String,
    pub location: Coordinates,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareConfig {
    pub rates: HashMap<VehicleCategory, CategoryRate>,
    #[serde(default)]
    pub state_taxes: Vec<StateTax>,
    #[serde(default)]
    pub home_region: Option<String>,
    #[serde(default)]
    pub entry_toll: f64,
    #[serde(default)]
    pub airports: Vec<Airport>,
    #[serde(default = "default_airport_radius_km")]
    pub airport_radius_km: f64,
    #[serde(default)]
    pub airport_fee: f64,
    #[serde(default = "default_min_distance_km")]
    pub min_distance_km: f64,
}

fn default_airport_radius_km() -> f64 {
    3.0
}

fn default_min_distance_km() -> f64 {
    0.1
}

impl Default for FareConfig {
    fn default() -> Self {
        let metered = |base_fee, short_rate_per_km, long_rate_per_km| CategoryRate::Metered {
            base_fee,
            short_rate_per_km,
            long_rate_per_km,
            breakpoint_km: 150.0,
            per_minute_rate: 0.0,
        };

        let rates = HashMap::from([
            (VehicleCategory::Hatchback, metered(40.0, 14.0, 11.0)),
            (VehicleCategory::Sedan, metered(50.0, 19.0, 15.0)),
            (VehicleCategory::Suv, metered(70.0, 24.0, 19.0)),
            (
                VehicleCategory::Van,
                CategoryRate::Flat {
                    flat_fare: 4000.0,
                    allowance_km: 250.0,
                    overage_per_km: 22.0,
                },
            ),
        ]);

        Self {
            rates,
            state_taxes: vec![
                StateTax { from_region: "DL".into(), to_region: "HR".into(), category: None, amount: 100.0 },
                StateTax { from_region: "HR".into(), to_region: "DL".into(), category: None, amount: 100.0 },
                StateTax { from_region: "DL".into(), to_region: "UP".into(), category: None, amount: 120.0 },
                StateTax { from_region: "UP".into(), to_region: "DL".into(), category: None, amount: 120.0 },
            ],
            home_region: Some("DL".into()),
            entry_toll: 100.0,
            airports: vec![Airport {
                name: "Indira Gandhi International".into(),
                location: Coordinates { latitude: 28.5562, longitude: 77.1000 },
            }],
            airport_radius_km: default_airport_radius_km(),
            airport_fee: 150.0,
            min_distance_km: default_min_distance_km(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionalSurcharges {
    pub state_tax: f64,
    pub entry_toll: f64,
    pub airport_fee: f64,
}

impl RegionalSurcharges {
    pub fn total(&self) -> f64 {
        self.state_tax + self.entry_toll + self.airport_fee
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FareQuote {
    pub trip_fare: f64,
    pub surcharges: RegionalSurcharges,
    /// Rounded to whole units, ready to persist.
    pub total: i64,
}

#[derive(Debug, Clone)]
pub struct FareEngine {
    config: FareConfig,
}

impl FareEngine {
    pub fn new(config: FareConfig) -> Self {
        Self { config }
    }

    pub fn estimate_fare(
        &self,
        distance_km: f64,
        duration_min: f64,
        category: VehicleCategory,
        trip_kind: TripKind,
    ) -> SparrowResult<f64> {
        let rate = self.config.rates.get(&category).ok_or_else(|| {
            SparrowError::Configuration(format!("no fare table for category {}", category))
        })?;
        let distance_km = distance_km.max(self.config.min_distance_km);
        let km_multiplier = match trip_kind {
            TripKind::OneWay => 1.0,
            TripKind::RoundTrip => 2.0,
        };

        let fare = match *rate {
            CategoryRate::Metered {
                base_fee,
                short_rate_per_km,
                long_rate_per_km,
                breakpoint_km,
                per_minute_rate,
            } => {
                let per_km = if distance_km <= breakpoint_km {
                    short_rate_per_km
                } else {
                    long_rate_per_km
                };
                base_fee + distance_km * per_km * km_multiplier + duration_min.max(0.0) * per_minute_rate
            }
            CategoryRate::Flat {
                flat_fare,
                allowance_km,
                overage_per_km,
            } => {
                let overage_km = (distance_km - allowance_km).max(0.0);
                flat_fare + overage_km * overage_per_km * km_multiplier
            }
        };

        Ok(fare)
    }

    pub fn regional_surcharges(&self, pickup: &Place, drop: &Place, category: VehicleCategory) -> RegionalSurcharges {
        let mut surcharges = RegionalSurcharges::default();

        if let (Some(from), Some(to)) = (pickup.region.as_deref(), drop.region.as_deref()) {
            if from != to {
                surcharges.state_tax = self
                    .config
                    .state_taxes
                    .iter()
                    .filter(|tax| tax.from_region == from && tax.to_region == to)
                    .filter(|tax| tax.category.is_none_or(|c| c == category))
                    .map(|tax| tax.amount)
                    .sum();

                if self.config.home_region.as_deref() == Some(to) {
                    surcharges.entry_toll = self.config.entry_toll;
                }
            }
        }

        // Charged once, and only when exactly one end is at an airport
        if self.near_airport(pickup) != self.near_airport(drop) {
            surcharges.airport_fee = self.config.airport_fee;
        }

        surcharges
    }

    fn near_airport(&self, place: &Place) -> bool {
        let Some(point) = place.coordinates else {
            return false;
        };
        self.config
            .airports
            .iter()
            .any(|airport| haversine_km(&airport.location, &point) <= self.config.airport_radius_km)
    }

    pub fn quote(
        &self,
        distance_km: f64,
        duration_min: f64,
        pickup: &Place,
        drop: &Place,
        category: VehicleCategory,
        trip_kind: TripKind,
    ) -> SparrowResult<FareQuote> {
        let trip_fare = self.estimate_fare(distance_km, duration_min, category, trip_kind)?;
        let surcharges = self.regional_surcharges(pickup, drop, category);
        Ok(FareQuote {
            trip_fare,
            surcharges,
            total: (trip_fare + surcharges.total()).round() as i64,
        })
    }

    /// Charge for waiting `waited` at pickup beyond the free threshold.
    pub fn wait_charge(policy: &WaitPolicy, waited: Duration) -> i64 {
        let waited_min = waited.num_seconds() as f64 / 60.0;
        let overage_min = waited_min - policy.free_minutes as f64;
        if overage_min <= 0.0 {
            return 0;
        }
        (overage_min * policy.per_minute_rate as f64).round() as i64
    }

    /// Final amount: the larger of the original estimate and any re-quote
    /// for an amended drop, plus accrued extra charges.
    pub fn finalize_amount(ride: &Ride, requoted_fare: Option<i64>) -> i64 {
        let trip = requoted_fare.map_or(ride.estimated_fare, |fare| fare.max(ride.estimated_fare));
        let total = trip + ride.extra_charges;
        total.max(ride.fare)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ride::fixtures::searching_ride;

    fn engine() -> FareEngine {
        FareEngine::new(FareConfig::default())
    }

    #[test]
    fn sedan_short_trip_uses_short_rate() {
        // 28 km at 19/km plus the 50 base fee
        let fare = engine().estimate_fare(28.0, 55.0, VehicleCategory::Sedan, TripKind::OneWay).unwrap();
        assert_eq!(fare, 582.0);
    }

    #[test]
    fn long_trip_switches_to_lower_rate() {
        let fare = engine().estimate_fare(200.0, 240.0, VehicleCategory::Sedan, TripKind::OneWay).unwrap();
        assert_eq!(fare, 50.0 + 200.0 * 15.0);

        let at_breakpoint = engine().estimate_fare(150.0, 180.0, VehicleCategory::Sedan, TripKind::OneWay).unwrap();
        assert_eq!(at_breakpoint, 50.0 + 150.0 * 19.0);
    }

    #[test]
    fn round_trip_doubles_per_km_component_only() {
        let fare = engine().estimate_fare(28.0, 55.0, VehicleCategory::Sedan, TripKind::RoundTrip).unwrap();
        assert_eq!(fare, 50.0 + 2.0 * 28.0 * 19.0);
    }

    #[test]
    fn van_flat_rate_with_overage() {
        let within = engine().estimate_fare(120.0, 150.0, VehicleCategory::Van, TripKind::OneWay).unwrap();
        assert_eq!(within, 4000.0);

        let beyond = engine().estimate_fare(300.0, 360.0, VehicleCategory::Van, TripKind::OneWay).unwrap();
        assert_eq!(beyond, 4000.0 + 50.0 * 22.0);
    }

    #[test]
    fn minimum_distance_floor_applies() {
        let fare = engine().estimate_fare(0.0, 0.0, VehicleCategory::Sedan, TripKind::OneWay).unwrap();
        assert!((fare - (50.0 + 0.1 * 19.0)).abs() < 1e-9);
    }

    #[test]
    fn missing_category_table_is_configuration_error() {
        let mut config = FareConfig::default();
        config.rates.remove(&VehicleCategory::Suv);
        let result = FareEngine::new(config).estimate_fare(10.0, 20.0, VehicleCategory::Suv, TripKind::OneWay);
        assert!(matches!(result, Err(SparrowError::Configuration(_))));
    }

    #[test]
    fn state_crossing_into_home_region_adds_tax_and_toll() {
        let pickup = Place::at("Cyber City", 28.4949, 77.0887).in_region("HR");
        let drop = Place::at("Connaught Place", 28.6315, 77.2167).in_region("DL");
        let surcharges = engine().regional_surcharges(&pickup, &drop, VehicleCategory::Sedan);
        assert_eq!(surcharges.state_tax, 100.0);
        assert_eq!(surcharges.entry_toll, 100.0);
        assert_eq!(surcharges.airport_fee, 0.0);
    }

    #[test]
    fn leaving_home_region_pays_tax_but_no_toll() {
        let pickup = Place::at("Connaught Place", 28.6315, 77.2167).in_region("DL");
        let drop = Place::at("Cyber City", 28.4949, 77.0887).in_region("HR");
        let surcharges = engine().regional_surcharges(&pickup, &drop, VehicleCategory::Sedan);
        assert_eq!(surcharges.state_tax, 100.0);
        assert_eq!(surcharges.entry_toll, 0.0);
    }

    #[test]
    fn airport_fee_only_when_exactly_one_end_is_airport() {
        let airport = Place::at("IGI T3", 28.5562, 77.0999);
        let city = Place::at("Connaught Place", 28.6315, 77.2167);
        let other_terminal = Place::at("IGI T1", 28.5600, 77.1050);

        let e = engine();
        assert_eq!(e.regional_surcharges(&airport, &city, VehicleCategory::Sedan).airport_fee, 150.0);
        assert_eq!(e.regional_surcharges(&city, &airport, VehicleCategory::Sedan).airport_fee, 150.0);
        assert_eq!(e.regional_surcharges(&airport, &other_terminal, VehicleCategory::Sedan).airport_fee, 0.0);
    }

    #[test]
    fn quote_rounds_total() {
        let pickup = Place::at("A", 28.6315, 77.2167);
        let drop = Place::at("B", 28.4949, 77.0887);
        let quote = engine()
            .quote(12.35, 30.0, &pickup, &drop, VehicleCategory::Hatchback, TripKind::OneWay)
            .unwrap();
        // 40 + 12.35 * 14 = 212.9
        assert_eq!(quote.total, 213);
    }

    #[test]
    fn wait_charge_past_threshold() {
        let policy = WaitPolicy { free_minutes: 5, per_minute_rate: 2 };
        assert_eq!(FareEngine::wait_charge(&policy, Duration::minutes(8)), 6);
        assert_eq!(FareEngine::wait_charge(&policy, Duration::minutes(5)), 0);
        assert_eq!(FareEngine::wait_charge(&policy, Duration::minutes(2)), 0);
        assert_eq!(FareEngine::wait_charge(&policy, Duration::seconds(5 * 60 + 90)), 3);
    }

    #[test]
    fn finalize_never_drops_below_estimate() {
        let mut ride = searching_ride("rid-250101-aaaaa");
        ride.extra_charges = 6;
        ride.fare = ride.estimated_fare + 6;

        assert_eq!(FareEngine::finalize_amount(&ride, None), 588);
        assert_eq!(FareEngine::finalize_amount(&ride, Some(400)), 588);
        assert_eq!(FareEngine::finalize_amount(&ride, Some(700)), 706);
    }

    #[test]
    fn fare_table_loads_from_json() {
        let raw = r#"{
            "rates": {
                "sedan": { "tariff": "metered", "base_fee": 0, "short_rate_per_km": 19,
                           "long_rate_per_km": 15, "breakpoint_km": 150 }
            }
        }"#;
        let config: FareConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.min_distance_km, 0.1);
        let fare = FareEngine::new(config)
            .estimate_fare(28.0, 0.0, VehicleCategory::Sedan, TripKind::OneWay)
            .unwrap();
        assert_eq!(fare, 532.0);
    }
}

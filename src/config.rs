//! Service configuration from environment.

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{SparrowError, SparrowResult};
use crate::services::fare_engine::FareConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// In-memory storage when unset.
    pub redis_url: Option<String>,
    pub geo_service_url: Option<String>,
    pub push_gateway_url: Option<String>,
    pub push_api_key: Option<String>,
    pub push_timeout: Duration,
    pub payment_gateway_url: Option<String>,
    pub payment_timeout: Duration,
    pub fare_table_path: Option<String>,
    pub dispatch: DispatchConfig,
    pub dispatch_mode: DispatchMode,
    pub wait: WaitPolicy,
    pub cancellation: CancellationPolicy,
    pub settlement: SettlementPolicy,
    pub request_ttl_min: i64,
    pub expiry_sweep_interval: Duration,
    /// Drivers silent for longer than this are not offered rides.
    pub driver_stale_after_secs: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            redis_url: None,
            geo_service_url: None,
            push_gateway_url: None,
            push_api_key: None,
            push_timeout: Duration::from_secs(5),
            payment_gateway_url: None,
            payment_timeout: Duration::from_secs(10),
            fare_table_path: None,
            dispatch: DispatchConfig::default(),
            dispatch_mode: DispatchMode::Background,
            wait: WaitPolicy::default(),
            cancellation: CancellationPolicy::default(),
            settlement: SettlementPolicy::default(),
            request_ttl_min: 10,
            expiry_sweep_interval: Duration::from_secs(15),
            driver_stale_after_secs: 300,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let dispatch_defaults = DispatchConfig::default();
        let wait_defaults = WaitPolicy::default();

        Self {
            bind_addr: env::var("SPARROW_BIND_ADDR").unwrap_or(defaults.bind_addr),
            redis_url: optional_var("SPARROW_REDIS_URL"),
            geo_service_url: optional_var("SPARROW_GEO_URL"),
            push_gateway_url: optional_var("SPARROW_PUSH_URL"),
            push_api_key: optional_var("SPARROW_PUSH_KEY"),
            push_timeout: Duration::from_millis(parse_var(
                "SPARROW_PUSH_TIMEOUT_MS",
                defaults.push_timeout.as_millis() as u64,
            )),
            payment_gateway_url: optional_var("SPARROW_PAYMENT_URL"),
            payment_timeout: Duration::from_millis(parse_var(
                "SPARROW_PAYMENT_TIMEOUT_MS",
                defaults.payment_timeout.as_millis() as u64,
            )),
            fare_table_path: optional_var("SPARROW_FARE_TABLE"),
            dispatch: DispatchConfig {
                initial_radius_km: parse_var("SPARROW_DISPATCH_INITIAL_RADIUS_KM", dispatch_defaults.initial_radius_km),
                radius_step_km: parse_var("SPARROW_DISPATCH_RADIUS_STEP_KM", dispatch_defaults.radius_step_km),
                max_radius_km: parse_var("SPARROW_DISPATCH_MAX_RADIUS_KM", dispatch_defaults.max_radius_km),
                offer_timeout: Duration::from_millis(parse_var(
                    "SPARROW_OFFER_TIMEOUT_MS",
                    dispatch_defaults.offer_timeout.as_millis() as u64,
                )),
            },
            dispatch_mode: match env::var("SPARROW_DISPATCH_MODE").as_deref() {
                Ok("inline") => DispatchMode::Inline,
                _ => DispatchMode::Background,
            },
            wait: WaitPolicy {
                free_minutes: parse_var("SPARROW_WAIT_FREE_MIN", wait_defaults.free_minutes),
                per_minute_rate: parse_var("SPARROW_WAIT_RATE", wait_defaults.per_minute_rate),
            },
            cancellation: CancellationPolicy::from_lookup(optional_var),
            settlement: SettlementPolicy {
                commission_percent: parse_var("SPARROW_COMMISSION_PERCENT", defaults.settlement.commission_percent),
                platform_wallet_id: env::var("SPARROW_PLATFORM_WALLET")
                    .unwrap_or(defaults.settlement.platform_wallet_id),
            },
            request_ttl_min: parse_var("SPARROW_REQUEST_TTL_MIN", defaults.request_ttl_min),
            expiry_sweep_interval: Duration::from_secs(parse_var("SPARROW_EXPIRY_SWEEP_SECS", 15)),
            driver_stale_after_secs: parse_var("SPARROW_DRIVER_STALE_SECS", defaults.driver_stale_after_secs),
        }
    }

    /// Rate tables come from a JSON file when configured, else the built-in table.
    pub fn load_fare_config(&self) -> SparrowResult<FareConfig> {
        match &self.fare_table_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| SparrowError::Configuration(format!("cannot read fare table {}: {}", path, e)))?;
                let config: FareConfig = serde_json::from_str(&raw)
                    .map_err(|e| SparrowError::Configuration(format!("invalid fare table {}: {}", path, e)))?;
                tracing::info!("Loaded fare table from {}", path);
                Ok(config)
            }
            None => Ok(FareConfig::default()),
        }
    }

    pub fn request_ttl(&self) -> ChronoDuration {
        ChronoDuration::minutes(self.request_ttl_min)
    }

    pub fn driver_stale_after(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.driver_stale_after_secs)
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// createRide awaits the whole dispatch episode.
    Inline,
    /// createRide returns the SEARCHING ride; dispatch runs as its own task.
    Background,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub initial_radius_km: f64,
    pub radius_step_km: f64,
    pub max_radius_km: f64,
    pub offer_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            initial_radius_km: 3.0,
            radius_step_km: 2.0,
            max_radius_km: 10.0,
            offer_timeout: Duration::from_secs(15),
        }
    }
}

impl DispatchConfig {
    /// Radii searched in order: initial, then one step at a time. A step that
    /// would overshoot the maximum is clamped to it, so the maximum is always
    /// the last ring searched. An initial radius beyond the maximum searches
    /// nothing.
    pub fn search_radii(&self) -> Vec<f64> {
        let mut radii = Vec::new();
        if self.initial_radius_km > self.max_radius_km {
            return radii;
        }
        let mut radius = self.initial_radius_km;
        while radius < self.max_radius_km {
            radii.push(radius);
            if self.radius_step_km <= 0.0 {
                return radii;
            }
            radius += self.radius_step_km;
        }
        radii.push(self.max_radius_km);
        radii
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub free_minutes: i64,
    pub per_minute_rate: i64,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            free_minutes: 5,
            per_minute_rate: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FeeRule {
    None,
    Flat(i64),
    /// Percentage of the current fare.
    Percent(f64),
}

impl FeeRule {
    pub fn amount(&self, fare: i64) -> i64 {
        match self {
            FeeRule::None => 0,
            FeeRule::Flat(amount) => *amount,
            FeeRule::Percent(pct) => ((fare as f64) * pct / 100.0).round() as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellingParty {
    Rider,
    Driver,
}

#[derive(Debug, Clone)]
pub struct CancellationPolicy {
    pub grace_period: ChronoDuration,
    pub rider_fee: FeeRule,
    pub driver_fee: FeeRule,
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self {
            grace_period: ChronoDuration::minutes(3),
            rider_fee: FeeRule::Flat(50),
            driver_fee: FeeRule::Percent(10.0),
        }
    }
}

impl CancellationPolicy {
    /// Reads `SPARROW_CANCEL_GRACE_MIN`, `SPARROW_CANCEL_RIDER_FEE` and
    /// `SPARROW_CANCEL_DRIVER_FEE` through `lookup`. Fees are JSON fee rules,
    /// e.g. `{"type":"flat","value":50}`; unparseable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let fee = |key: &str, default: FeeRule| match lookup(key) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Ignoring {}={}: {}", key, raw, e);
                default
            }),
            None => default,
        };

        Self {
            grace_period: lookup("SPARROW_CANCEL_GRACE_MIN")
                .and_then(|raw| raw.parse().ok())
                .map(ChronoDuration::minutes)
                .unwrap_or(defaults.grace_period),
            rider_fee: fee("SPARROW_CANCEL_RIDER_FEE", defaults.rider_fee),
            driver_fee: fee("SPARROW_CANCEL_DRIVER_FEE", defaults.driver_fee),
        }
    }

    /// Fee owed by `party` for cancelling `since_accept` after acceptance.
    pub fn fee_for(&self, party: CancellingParty, since_accept: Option<ChronoDuration>, fare: i64) -> i64 {
        let Some(elapsed) = since_accept else {
            return 0;
        };
        if elapsed <= self.grace_period {
            return 0;
        }
        let rule = match party {
            CancellingParty::Rider => self.rider_fee,
            CancellingParty::Driver => self.driver_fee,
        };
        rule.amount(fare).max(0)
    }
}

#[derive(Debug, Clone)]
pub struct SettlementPolicy {
    pub commission_percent: f64,
    pub platform_wallet_id: String,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self {
            commission_percent: 20.0,
            platform_wallet_id: "platform".to_string(),
        }
    }
}

impl SettlementPolicy {
    pub fn commission_on(&self, amount: i64) -> i64 {
        ((amount as f64) * self.commission_percent / 100.0).round() as i64
    }
}

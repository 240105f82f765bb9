// src/services/ride_store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::{
    errors::{SparrowError as AppError, SparrowResult},
    models::ride::{PickupMetrics, Ride, RideStatus},
    models::wallet::LedgerEntry,
};

/// Persistence contract for rides, wallets and the transaction ledger.
#[async_trait]
pub trait RideStore: Send + Sync {
    async fn insert(&self, ride: &Ride) -> SparrowResult<()>;

    async fn get(&self, ride_id: &str) -> SparrowResult<Option<Ride>>;

    /// Rides still waiting for a driver.
    async fn searching_rides(&self) -> SparrowResult<Vec<Ride>>;

    /// Compare-and-swap on (status = SEARCHING, driver_id = null). Fails
    /// with `ConcurrencyConflict` when either no longer holds.
    async fn assign_driver(
        &self,
        ride_id: &str,
        driver_id: &str,
        metrics: PickupMetrics,
        at: DateTime<Utc>,
    ) -> SparrowResult<Ride>;

    /// Writes `ride` and applies `ledger` to wallets in one atomic unit,
    /// provided the stored version still equals `expected_version`.
    async fn commit(&self, expected_version: u64, ride: &Ride, ledger: &[LedgerEntry]) -> SparrowResult<Ride>;

    async fn wallet_balance(&self, user_id: &str) -> SparrowResult<i64>;

    async fn transactions_for_ride(&self, ride_id: &str) -> SparrowResult<Vec<LedgerEntry>>;
}

#[derive(Debug, Default)]
struct Ledger {
    balances: HashMap<String, i64>,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    fn apply(&mut self, entries: &[LedgerEntry]) {
        for entry in entries {
            *self.balances.entry(entry.user_id.clone()).or_insert(0) += entry.amount;
            self.entries.push(entry.clone());
        }
    }
}

/// Process-local store. Per-ride writes hold the ride's map shard lock;
/// ledger changes additionally take the ledger mutex, always in that order.
#[derive(Debug, Default)]
pub struct InMemoryRideStore {
    rides: DashMap<String, Ride>,
    ledger: Mutex<Ledger>,
}

impl InMemoryRideStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_ledger(&self) -> SparrowResult<std::sync::MutexGuard<'_, Ledger>> {
        self.ledger
            .lock()
            .map_err(|_| AppError::Storage("ledger lock poisoned".to_string()))
    }
}

#[async_trait]
impl RideStore for InMemoryRideStore {
    async fn insert(&self, ride: &Ride) -> SparrowResult<()> {
        match self.rides.entry(ride.id.clone()) {
            Entry::Occupied(_) => Err(AppError::Storage(format!("ride {} already exists", ride.id))),
            Entry::Vacant(slot) => {
                slot.insert(ride.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, ride_id: &str) -> SparrowResult<Option<Ride>> {
        Ok(self.rides.get(ride_id).map(|entry| entry.value().clone()))
    }

    async fn searching_rides(&self) -> SparrowResult<Vec<Ride>> {
        Ok(self
            .rides
            .iter()
            .filter(|entry| entry.status == RideStatus::Searching)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn assign_driver(
        &self,
        ride_id: &str,
        driver_id: &str,
        metrics: PickupMetrics,
        at: DateTime<Utc>,
    ) -> SparrowResult<Ride> {
        let mut slot = self
            .rides
            .get_mut(ride_id)
            .ok_or_else(|| AppError::ride_not_found(ride_id))?;

        if !slot.can_be_assigned() {
            return Err(AppError::ConcurrencyConflict(ride_id.to_string()));
        }

        slot.assign(driver_id, metrics, at);
        slot.version += 1;
        Ok(slot.clone())
    }

    async fn commit(&self, expected_version: u64, ride: &Ride, ledger: &[LedgerEntry]) -> SparrowResult<Ride> {
        let mut slot = self
            .rides
            .get_mut(&ride.id)
            .ok_or_else(|| AppError::ride_not_found(&ride.id))?;

        if slot.version != expected_version {
            return Err(AppError::ConcurrencyConflict(ride.id.clone()));
        }

        if !ledger.is_empty() {
            self.lock_ledger()?.apply(ledger);
        }

        let mut next = ride.clone();
        next.version = expected_version + 1;
        *slot = next.clone();
        Ok(next)
    }

    async fn wallet_balance(&self, user_id: &str) -> SparrowResult<i64> {
        Ok(self.lock_ledger()?.balances.get(user_id).copied().unwrap_or(0))
    }

    async fn transactions_for_ride(&self, ride_id: &str) -> SparrowResult<Vec<LedgerEntry>> {
        Ok(self
            .lock_ledger()?
            .entries
            .iter()
            .filter(|entry| entry.ride_id == ride_id)
            .cloned()
            .collect())
    }
}

// src/services/redis_store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::Client;

use crate::{
    errors::{SparrowError as AppError, SparrowResult},
    models::ride::{PickupMetrics, Ride, RideStatus},
    models::wallet::LedgerEntry,
    services::ride_store::RideStore,
};

const SEARCHING_SET: &str = "rides:searching";

fn ride_key(ride_id: &str) -> String {
    format!("ride:{}", ride_id)
}

fn wallet_key(user_id: &str) -> String {
    format!("wallet:{}", user_id)
}

fn ride_ledger_key(ride_id: &str) -> String {
    format!("ride:{}:txns", ride_id)
}

/// Redis-backed store. Conditional writes use WATCH/MULTI/EXEC on the ride
/// key; an aborted EXEC means another writer got there first.
pub struct RedisRideStore {
    client: Client,
}

impl RedisRideStore {
    pub async fn new(redis_url: &str) -> SparrowResult<Self> {
        let client = Client::open(redis_url)?;
        // Fail fast on a bad URL or unreachable server
        let mut conn = client.get_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        tracing::info!("Connected to Redis at {}", redis_url);
        Ok(Self { client })
    }

    // WATCH is per connection, so every transactional call gets its own.
    // Dropping the connection on an early return discards the WATCH too.
    async fn get_connection(&self) -> SparrowResult<redis::aio::Connection> {
        Ok(self.client.get_async_connection().await?)
    }

    async fn load(conn: &mut redis::aio::Connection, ride_id: &str) -> SparrowResult<Option<Ride>> {
        let data: Option<String> = redis::cmd("GET").arg(ride_key(ride_id)).query_async(conn).await?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn watch_and_load(conn: &mut redis::aio::Connection, ride_id: &str) -> SparrowResult<Ride> {
        redis::cmd("WATCH").arg(ride_key(ride_id)).query_async::<_, ()>(conn).await?;
        Self::load(conn, ride_id)
            .await?
            .ok_or_else(|| AppError::ride_not_found(ride_id))
    }
}

#[async_trait]
impl RideStore for RedisRideStore {
    async fn insert(&self, ride: &Ride) -> SparrowResult<()> {
        let mut conn = self.get_connection().await?;
        let json = serde_json::to_string(ride)?;

        let created: Option<String> = redis::cmd("SET")
            .arg(ride_key(&ride.id))
            .arg(&json)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        if created.is_none() {
            return Err(AppError::Storage(format!("ride {} already exists", ride.id)));
        }

        if ride.status == RideStatus::Searching {
            redis::cmd("SADD")
                .arg(SEARCHING_SET)
                .arg(&ride.id)
                .query_async::<_, ()>(&mut conn)
                .await?;
        }
        Ok(())
    }

    async fn get(&self, ride_id: &str) -> SparrowResult<Option<Ride>> {
        let mut conn = self.get_connection().await?;
        Self::load(&mut conn, ride_id).await
    }

    async fn searching_rides(&self) -> SparrowResult<Vec<Ride>> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = redis::cmd("SMEMBERS").arg(SEARCHING_SET).query_async(&mut conn).await?;

        let mut rides = Vec::with_capacity(ids.len());
        for id in ids {
            // The index can briefly lag the ride record
            match Self::load(&mut conn, &id).await? {
                Some(ride) if ride.status == RideStatus::Searching => rides.push(ride),
                _ => {}
            }
        }
        Ok(rides)
    }

    async fn assign_driver(
        &self,
        ride_id: &str,
        driver_id: &str,
        metrics: PickupMetrics,
        at: DateTime<Utc>,
    ) -> SparrowResult<Ride> {
        let mut conn = self.get_connection().await?;
        let mut ride = Self::watch_and_load(&mut conn, ride_id).await?;

        if !ride.can_be_assigned() {
            return Err(AppError::ConcurrencyConflict(ride_id.to_string()));
        }

        ride.assign(driver_id, metrics, at);
        ride.version += 1;
        let json = serde_json::to_string(&ride)?;

        let applied: Option<()> = redis::pipe()
            .atomic()
            .cmd("SET").arg(ride_key(ride_id)).arg(&json).ignore()
            .cmd("SREM").arg(SEARCHING_SET).arg(ride_id).ignore()
            .query_async(&mut conn)
            .await?;

        match applied {
            Some(()) => Ok(ride),
            None => Err(AppError::ConcurrencyConflict(ride_id.to_string())),
        }
    }

    async fn commit(&self, expected_version: u64, ride: &Ride, ledger: &[LedgerEntry]) -> SparrowResult<Ride> {
        let mut conn = self.get_connection().await?;
        let current = Self::watch_and_load(&mut conn, &ride.id).await?;

        if current.version != expected_version {
            return Err(AppError::ConcurrencyConflict(ride.id.clone()));
        }

        let mut next = ride.clone();
        next.version = expected_version + 1;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("SET").arg(ride_key(&next.id)).arg(serde_json::to_string(&next)?).ignore();
        if next.status == RideStatus::Searching {
            pipe.cmd("SADD").arg(SEARCHING_SET).arg(&next.id).ignore();
        } else {
            pipe.cmd("SREM").arg(SEARCHING_SET).arg(&next.id).ignore();
        }
        for entry in ledger {
            pipe.cmd("INCRBY").arg(wallet_key(&entry.user_id)).arg(entry.amount).ignore();
            pipe.cmd("RPUSH")
                .arg(ride_ledger_key(&entry.ride_id))
                .arg(serde_json::to_string(entry)?)
                .ignore();
        }

        let applied: Option<()> = pipe.query_async(&mut conn).await?;
        match applied {
            Some(()) => Ok(next),
            None => Err(AppError::ConcurrencyConflict(next.id)),
        }
    }

    async fn wallet_balance(&self, user_id: &str) -> SparrowResult<i64> {
        let mut conn = self.get_connection().await?;
        let balance: Option<i64> = redis::cmd("GET").arg(wallet_key(user_id)).query_async(&mut conn).await?;
        Ok(balance.unwrap_or(0))
    }

    async fn transactions_for_ride(&self, ride_id: &str) -> SparrowResult<Vec<LedgerEntry>> {
        let mut conn = self.get_connection().await?;
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(ride_ledger_key(ride_id))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(AppError::from))
            .collect()
    }
}

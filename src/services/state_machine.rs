// src/services/state_machine.rs
//! Ride status transitions. Every operation validates the actor and source
//! state first and only then builds the next ride; a rejected call never
//! touches the input. Persisting the returned transition is the caller's job.

use chrono::{DateTime, Utc};

use crate::{
    config::{CancellationPolicy, CancellingParty, SettlementPolicy, WaitPolicy},
    errors::{SparrowError as AppError, SparrowResult},
    models::actor::Actor,
    models::ride::{Cancellation, CancelledBy, PaymentMode, PaymentStatus, Place, Ride, RideStatus},
    models::wallet::{transfer, LedgerEntry, TransactionKind},
    services::fare_engine::FareEngine,
};

/// Next ride state plus the wallet movements that must commit with it.
#[derive(Debug, Clone)]
pub struct Transition {
    pub ride: Ride,
    pub ledger: Vec<LedgerEntry>,
}

impl Transition {
    fn without_ledger(ride: Ride) -> Self {
        Self { ride, ledger: Vec::new() }
    }
}

/// Final figures for a completed trip, computed by the caller.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub total_amount: i64,
    pub amended_drop: Option<Place>,
}

#[derive(Debug, Clone)]
pub struct RideStateMachine {
    wait: WaitPolicy,
    cancellation: CancellationPolicy,
    settlement: SettlementPolicy,
}

impl RideStateMachine {
    pub fn new(wait: WaitPolicy, cancellation: CancellationPolicy, settlement: SettlementPolicy) -> Self {
        Self {
            wait,
            cancellation,
            settlement,
        }
    }

    pub fn settlement(&self) -> &SettlementPolicy {
        &self.settlement
    }

    /// Edges of the ride state graph.
    pub fn can_transition(from: RideStatus, to: RideStatus) -> bool {
        use RideStatus::*;
        matches!(
            (from, to),
            (Searching, Accepted)
                | (Accepted, DriverArrived)
                | (DriverArrived, RideStarted)
                | (RideStarted, RideEnded)
                | (RideStarted, PaymentPending)
                | (PaymentPending, RideEnded)
                | (Searching | Accepted | DriverArrived | RideStarted, Cancelled)
        )
    }

    fn ensure_edge(ride: &Ride, to: RideStatus) -> SparrowResult<()> {
        if Self::can_transition(ride.status, to) {
            Ok(())
        } else {
            Err(AppError::invalid_state(format!(
                "ride {} cannot move from {} to {}",
                ride.id, ride.status, to
            )))
        }
    }

    fn ensure_assigned_driver(ride: &Ride, actor: &Actor) -> SparrowResult<()> {
        match actor {
            Actor::Driver(id) if ride.is_assigned_driver(id) => Ok(()),
            _ => Err(AppError::forbidden(format!("{} is not the driver of ride {}", actor, ride.id))),
        }
    }

    /// ACCEPTED -> DRIVER_ARRIVED; starts the wait clock.
    pub fn mark_arrived(&self, ride: &Ride, actor: &Actor, now: DateTime<Utc>) -> SparrowResult<Transition> {
        Self::ensure_assigned_driver(ride, actor)?;
        Self::ensure_edge(ride, RideStatus::DriverArrived)?;

        let mut next = ride.clone();
        next.status = RideStatus::DriverArrived;
        next.wait_started_at = Some(now);
        next.updated_at = now;
        Ok(Transition::without_ledger(next))
    }

    /// DRIVER_ARRIVED -> RIDE_STARTED after OTP verification. Waiting past
    /// the free threshold is added to both extra charges and fare.
    pub fn start_ride(
        &self,
        ride: &Ride,
        actor: &Actor,
        otp: Option<&str>,
        now: DateTime<Utc>,
    ) -> SparrowResult<Transition> {
        Self::ensure_assigned_driver(ride, actor)?;
        Self::ensure_edge(ride, RideStatus::RideStarted)?;

        if otp.map(str::trim) != Some(ride.otp.as_str()) {
            tracing::warn!("OTP mismatch starting ride {}", ride.id);
            return Err(AppError::InvalidOtp(ride.id.clone()));
        }

        let wait_charge = ride
            .wait_started_at
            .map_or(0, |since| FareEngine::wait_charge(&self.wait, now - since));

        let mut next = ride.clone();
        next.status = RideStatus::RideStarted;
        next.extra_charges += wait_charge;
        next.fare += wait_charge;
        next.wait_started_at = None;
        next.started_at = Some(now);
        next.updated_at = now;

        if wait_charge > 0 {
            tracing::info!("Ride {} accrued wait charge of {}", ride.id, wait_charge);
        }
        Ok(Transition::without_ledger(next))
    }

    /// RIDE_STARTED -> RIDE_ENDED (cash) or PAYMENT_PENDING (online).
    /// Cash rides settle the platform commission against the driver wallet
    /// in the same transition.
    pub fn complete(
        &self,
        ride: &Ride,
        actor: &Actor,
        completion: Completion,
        now: DateTime<Utc>,
    ) -> SparrowResult<Transition> {
        if *actor != Actor::System {
            Self::ensure_assigned_driver(ride, actor)?;
        }
        let target = match ride.payment_mode {
            PaymentMode::Cash => RideStatus::RideEnded,
            PaymentMode::Online => RideStatus::PaymentPending,
        };
        Self::ensure_edge(ride, target)?;

        if completion.total_amount < ride.estimated_fare {
            return Err(AppError::invalid_state(format!(
                "final amount {} is below the estimate {} for ride {}",
                completion.total_amount, ride.estimated_fare, ride.id
            )));
        }

        let mut next = ride.clone();
        next.status = target;
        next.total_amount = Some(completion.total_amount);
        next.ended_at = Some(now);
        next.updated_at = now;
        if let Some(drop) = completion.amended_drop {
            next.drop = drop;
        }

        let mut ledger = Vec::new();
        match ride.payment_mode {
            PaymentMode::Cash => {
                next.payment_status = PaymentStatus::Paid;
                // Driver collected the cash; the platform's share is owed back
                let commission = self.settlement.commission_on(completion.total_amount);
                if let Some(driver_id) = ride.driver_id.as_deref().filter(|_| commission > 0) {
                    ledger = transfer(
                        driver_id,
                        &self.settlement.platform_wallet_id,
                        &ride.id,
                        TransactionKind::Commission,
                        TransactionKind::Commission,
                        commission,
                        now,
                    );
                }
            }
            // Order id is attached by the caller once the gateway has one
            PaymentMode::Online => {}
        }

        Ok(Transition { ride: next, ledger })
    }

    /// PAYMENT_PENDING -> RIDE_ENDED for the ride's own `order_id`. Checking
    /// the payment itself with the gateway is left to the caller.
    /// Credits the driver's earning and the platform commission.
    pub fn confirm_payment(&self, ride: &Ride, order_id: &str, now: DateTime<Utc>) -> SparrowResult<Transition> {
        if ride.status != RideStatus::PaymentPending {
            return Err(AppError::invalid_state(format!("ride {} is not awaiting payment", ride.id)));
        }
        if ride.payment_order_id.as_deref() != Some(order_id) {
            return Err(AppError::bad_request(format!("order {} does not belong to ride {}", order_id, ride.id)));
        }
        let driver_id = ride
            .driver_id
            .as_deref()
            .ok_or_else(|| AppError::invalid_state(format!("ride {} has no driver to pay", ride.id)))?;

        let amount = ride.total_amount.unwrap_or(ride.fare);
        let commission = self.settlement.commission_on(amount);

        let mut next = ride.clone();
        next.status = RideStatus::RideEnded;
        next.payment_status = PaymentStatus::Paid;
        next.updated_at = now;

        let ledger = vec![
            LedgerEntry::new(driver_id, &ride.id, TransactionKind::RideEarning, amount - commission, now),
            LedgerEntry::new(
                &self.settlement.platform_wallet_id,
                &ride.id,
                TransactionKind::Commission,
                commission,
                now,
            ),
        ];
        Ok(Transition { ride: next, ledger })
    }

    /// Any cancellable state -> CANCELLED. Riders may cancel until the trip
    /// starts, drivers only while assigned and not started, the system from
    /// any non-terminal state before payment. A fee past the grace period
    /// moves from the cancelling party to the counterparty.
    pub fn cancel(
        &self,
        ride: &Ride,
        actor: &Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> SparrowResult<Transition> {
        let (cancelled_by, party) = match actor {
            Actor::Rider(id) => {
                if ride.rider_id != *id {
                    return Err(AppError::forbidden(format!("{} did not request ride {}", actor, ride.id)));
                }
                (CancelledBy::Rider, Some(CancellingParty::Rider))
            }
            Actor::Driver(_) => {
                Self::ensure_assigned_driver(ride, actor)?;
                (CancelledBy::Driver, Some(CancellingParty::Driver))
            }
            Actor::System => (CancelledBy::System, None),
        };

        Self::ensure_edge(ride, RideStatus::Cancelled)?;
        if party.is_some() && ride.status == RideStatus::RideStarted {
            return Err(AppError::invalid_state(format!("ride {} has already started", ride.id)));
        }

        let fee = party.map_or(0, |party| {
            let since_accept = ride.accepted_at.map(|accepted| now - accepted);
            self.cancellation.fee_for(party, since_accept, ride.fare)
        });

        let counterparty = match party {
            Some(CancellingParty::Rider) => ride.driver_id.clone().map(|driver| (ride.rider_id.clone(), driver)),
            Some(CancellingParty::Driver) => ride.driver_id.clone().map(|driver| (driver, ride.rider_id.clone())),
            None => None,
        };

        let ledger = match counterparty {
            Some((payer, payee)) if fee > 0 => transfer(
                &payer,
                &payee,
                &ride.id,
                TransactionKind::CancellationFee,
                TransactionKind::CancellationCompensation,
                fee,
                now,
            ),
            _ => Vec::new(),
        };
        let fee = if ledger.is_empty() { 0 } else { fee };

        let mut next = ride.clone();
        next.status = RideStatus::Cancelled;
        next.cancellation = Some(Cancellation {
            cancelled_by,
            reason,
            fee,
            released_driver_id: next.driver_id.take(),
            cancelled_at: now,
        });
        next.wait_started_at = None;
        next.updated_at = now;

        Ok(Transition { ride: next, ledger })
    }
}

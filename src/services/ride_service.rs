// src/services/ride_service.rs
use chrono::Duration as ChronoDuration;
use std::sync::Arc;

use crate::{
    config::DispatchMode,
    errors::{SparrowError as AppError, SparrowResult},
    models::{
        actor::Actor,
        messages::RideEvent,
        ride::{
            CompleteRideRequest, ConfirmPaymentRequest, PaymentMode, PaymentStatus, Place, Ride, RideRequest,
            RideStatus, StatusUpdateRequest,
        },
        wallet::WalletResponse,
    },
    services::{
        dispatch_engine::{DispatchEngine, DispatchOutcome},
        driver_service::DriverDirectory,
        fare_engine::FareEngine,
        geo_service::GeoEstimator,
        messaging_service::{notify_quietly, NotificationService},
        payment_service::PaymentGateway,
        ride_store::RideStore,
        state_machine::{Completion, RideStateMachine, Transition},
    },
    utils::{
        clock::Clock,
        id_generator::{generate_ride_id, IdGenerator},
    },
};

/// Collaborators wired into a [`RideService`].
pub struct RideServiceDeps {
    pub store: Arc<dyn RideStore>,
    pub geo: Arc<dyn GeoEstimator>,
    pub fares: Arc<FareEngine>,
    pub machine: Arc<RideStateMachine>,
    pub dispatcher: Arc<DispatchEngine>,
    pub directory: Arc<dyn DriverDirectory>,
    pub notifier: Arc<dyn NotificationService>,
    pub payments: Arc<dyn PaymentGateway>,
    pub clock: Arc<dyn Clock>,
    pub dispatch_mode: DispatchMode,
    pub request_ttl: ChronoDuration,
}

/// Public ride operations. Cheap to clone; background dispatch runs on a clone.
#[derive(Clone)]
pub struct RideService {
    store: Arc<dyn RideStore>,
    geo: Arc<dyn GeoEstimator>,
    fares: Arc<FareEngine>,
    machine: Arc<RideStateMachine>,
    dispatcher: Arc<DispatchEngine>,
    directory: Arc<dyn DriverDirectory>,
    notifier: Arc<dyn NotificationService>,
    payments: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    dispatch_mode: DispatchMode,
    request_ttl: ChronoDuration,
}

impl RideService {
    pub fn new(deps: RideServiceDeps) -> Self {
        Self {
            store: deps.store,
            geo: deps.geo,
            fares: deps.fares,
            machine: deps.machine,
            dispatcher: deps.dispatcher,
            directory: deps.directory,
            notifier: deps.notifier,
            payments: deps.payments,
            clock: deps.clock,
            dispatch_mode: deps.dispatch_mode,
            request_ttl: deps.request_ttl,
        }
    }

    async fn load(&self, ride_id: &str) -> SparrowResult<Ride> {
        self.store
            .get(ride_id)
            .await?
            .ok_or_else(|| AppError::ride_not_found(ride_id))
    }

    /// Rides are invisible, not forbidden, to anyone but their parties.
    async fn load_for(&self, ride_id: &str, actor: &Actor) -> SparrowResult<Ride> {
        let ride = self.load(ride_id).await?;
        if !ride.is_visible_to(actor) {
            return Err(AppError::ride_not_found(ride_id));
        }
        Ok(ride)
    }

    async fn apply(&self, before: &Ride, transition: Transition) -> SparrowResult<Ride> {
        match self.store.commit(before.version, &transition.ride, &transition.ledger).await {
            Ok(saved) => Ok(saved),
            Err(AppError::ConcurrencyConflict(id)) => Err(AppError::invalid_state(format!(
                "ride {} changed while the request was processed",
                id
            ))),
            Err(e) => Err(e),
        }
    }

    async fn notify_parties(&self, ride: &Ride, event: RideEvent) {
        let driver = ride
            .driver_id
            .clone()
            .or_else(|| ride.cancellation.as_ref().and_then(|c| c.released_driver_id.clone()));

        let mut recipients = vec![ride.rider_id.clone()];
        recipients.extend(driver);
        self.notifier.broadcast(&recipients, &event).await;
    }

    async fn with_coordinates(&self, place: Place) -> SparrowResult<Place> {
        let coordinates = self.geo.resolve(&place).await?;
        Ok(Place {
            coordinates: Some(coordinates),
            ..place
        })
    }

    pub async fn create_ride(&self, actor: &Actor, request: RideRequest) -> SparrowResult<Ride> {
        let Actor::Rider(rider_id) = actor else {
            return Err(AppError::forbidden("only riders can request rides"));
        };

        let pickup = self.with_coordinates(request.pickup).await?;
        let drop = self.with_coordinates(request.drop).await?;
        let route = self.geo.estimate(&pickup, &drop).await?;
        let quote = self.fares.quote(
            route.distance_km,
            route.duration_min,
            &pickup,
            &drop,
            request.category,
            request.trip_kind,
        )?;

        let now = self.clock.now();
        let ride = Ride {
            id: generate_ride_id(),
            rider_id: rider_id.clone(),
            driver_id: None,
            status: RideStatus::Searching,
            pickup,
            drop,
            category: request.category,
            trip_kind: request.trip_kind,
            distance_km: route.distance_km,
            duration_min: route.duration_min,
            estimated_fare: quote.total,
            fare: quote.total,
            extra_charges: 0,
            total_amount: None,
            payment_mode: request.payment_mode,
            payment_status: PaymentStatus::Pending,
            payment_order_id: None,
            otp: IdGenerator::generate_otp(),
            pickup_metrics: None,
            wait_started_at: None,
            request_expires_at: Some(now + self.request_ttl),
            accepted_at: None,
            started_at: None,
            ended_at: None,
            cancellation: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&ride).await?;
        tracing::info!(
            "Ride {} created for {}: {} km, fare {}",
            ride.id, rider_id, ride.distance_km, ride.estimated_fare
        );

        match self.dispatch_mode {
            DispatchMode::Inline => self.run_dispatch(&ride.id).await,
            DispatchMode::Background => {
                let service = self.clone();
                let ride_id = ride.id.clone();
                tokio::spawn(async move {
                    if let Err(e) = service.run_dispatch(&ride_id).await {
                        tracing::warn!("Dispatch of ride {} ended: {}", ride_id, e);
                    }
                });
                Ok(ride)
            }
        }
    }

    /// One dispatch episode. Exhaustion cancels the ride and tells the
    /// rider, then reports `NoDriversAvailable`.
    pub async fn run_dispatch(&self, ride_id: &str) -> SparrowResult<Ride> {
        match self.dispatcher.dispatch(ride_id).await? {
            DispatchOutcome::Assigned(ride) => Ok(ride),
            DispatchOutcome::Superseded(status) => {
                tracing::debug!("Dispatch of ride {} stopped at {}", ride_id, status);
                self.load(ride_id).await
            }
            DispatchOutcome::Exhausted => {
                if let Some(ride) = self.cancel_as_system(ride_id, "no drivers available").await? {
                    notify_quietly(
                        self.notifier.as_ref(),
                        &ride.rider_id,
                        RideEvent::NoDriverFound { ride_id: ride.id.clone() },
                    )
                    .await;
                }
                Err(AppError::NoDriversAvailable(ride_id.to_string()))
            }
        }
    }

    /// Cancels a still-SEARCHING ride on behalf of the platform. `None`
    /// when the ride has already moved on.
    async fn cancel_as_system(&self, ride_id: &str, reason: &str) -> SparrowResult<Option<Ride>> {
        let ride = self.load(ride_id).await?;
        if ride.status != RideStatus::Searching {
            return Ok(None);
        }

        let transition = self
            .machine
            .cancel(&ride, &Actor::System, Some(reason.to_string()), self.clock.now())?;
        match self.store.commit(ride.version, &transition.ride, &transition.ledger).await {
            Ok(saved) => {
                tracing::info!("Ride {} cancelled by system: {}", ride_id, reason);
                Ok(Some(saved))
            }
            Err(AppError::ConcurrencyConflict(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_ride(&self, ride_id: &str, actor: &Actor) -> SparrowResult<Ride> {
        self.load_for(ride_id, actor).await
    }

    pub async fn update_status(&self, ride_id: &str, actor: &Actor, request: StatusUpdateRequest) -> SparrowResult<Ride> {
        match request.status {
            RideStatus::Cancelled => return self.cancel_ride(ride_id, actor, request.reason).await,
            RideStatus::RideEnded | RideStatus::PaymentPending => {
                let completion = CompleteRideRequest {
                    final_location: request.final_location,
                };
                return self.complete_ride(ride_id, actor, completion).await;
            }
            RideStatus::Accepted => return Err(AppError::forbidden("rides are accepted through dispatch")),
            RideStatus::Searching => return Err(AppError::invalid_state("rides cannot return to SEARCHING")),
            RideStatus::DriverArrived | RideStatus::RideStarted => {}
        }

        let ride = self.load_for(ride_id, actor).await?;
        let now = self.clock.now();

        let (transition, event) = if request.status == RideStatus::DriverArrived {
            let transition = self.machine.mark_arrived(&ride, actor, now)?;
            let event = RideEvent::DriverArrived { ride_id: ride.id.clone() };
            (transition, event)
        } else {
            let transition = self.machine.start_ride(&ride, actor, request.otp.as_deref(), now)?;
            let event = RideEvent::RideStarted {
                ride_id: ride.id.clone(),
                extra_charges: transition.ride.extra_charges,
                fare: transition.ride.fare,
            };
            (transition, event)
        };

        let saved = self.apply(&ride, transition).await?;
        tracing::info!("Ride {} moved {} -> {} by {}", ride_id, ride.status, saved.status, actor);
        self.notify_parties(&saved, event).await;
        Ok(saved)
    }

    /// Re-quotes the trip when the drop moved. Lookup failures keep the
    /// original estimate.
    async fn requote(&self, ride: &Ride, final_location: Place) -> (Place, Option<i64>) {
        let amended = match self.with_coordinates(final_location.clone()).await {
            Ok(place) => place,
            Err(e) => {
                tracing::warn!("Cannot locate amended drop for ride {}: {}", ride.id, e);
                return (final_location, None);
            }
        };

        let quote = match self.geo.estimate(&ride.pickup, &amended).await {
            Ok(route) => self.fares.quote(
                route.distance_km,
                route.duration_min,
                &ride.pickup,
                &amended,
                ride.category,
                ride.trip_kind,
            ),
            Err(e) => Err(e),
        };
        match quote {
            Ok(quote) => (amended, Some(quote.total)),
            Err(e) => {
                tracing::warn!("Re-quote for ride {} failed: {}", ride.id, e);
                (amended, None)
            }
        }
    }

    pub async fn complete_ride(&self, ride_id: &str, actor: &Actor, request: CompleteRideRequest) -> SparrowResult<Ride> {
        let ride = self.load_for(ride_id, actor).await?;

        let (amended_drop, requoted) = match request.final_location {
            Some(location) => {
                let (place, fare) = self.requote(&ride, location).await;
                (Some(place), fare)
            }
            None => (None, None),
        };
        let total_amount = FareEngine::finalize_amount(&ride, requoted);

        let completion = Completion {
            total_amount,
            amended_drop,
        };
        let mut transition = self.machine.complete(&ride, actor, completion, self.clock.now())?;

        let order = match ride.payment_mode {
            PaymentMode::Online => {
                let order = self.payments.create_order(&ride.id, total_amount).await?;
                transition.ride.payment_order_id = Some(order.order_id.clone());
                Some(order)
            }
            PaymentMode::Cash => None,
        };

        let saved = self.apply(&ride, transition).await?;
        if let Some(driver_id) = saved.driver_id.as_deref() {
            self.directory.set_engaged(driver_id, false).await;
        }
        tracing::info!("Ride {} completed with total {} ({})", ride_id, total_amount, saved.status);

        self.notify_parties(
            &saved,
            RideEvent::RideCompleted {
                ride_id: saved.id.clone(),
                total_amount,
                payment_mode: saved.payment_mode,
            },
        )
        .await;
        if let Some(order) = order {
            notify_quietly(
                self.notifier.as_ref(),
                &saved.rider_id,
                RideEvent::PaymentRequested {
                    ride_id: saved.id.clone(),
                    order_id: order.order_id,
                    amount: order.amount,
                },
            )
            .await;
        }
        Ok(saved)
    }

    pub async fn confirm_payment(&self, actor: &Actor, request: ConfirmPaymentRequest) -> SparrowResult<Ride> {
        let ride = self.load_for(&request.ride_id, actor).await?;
        if matches!(actor, Actor::Driver(_)) {
            return Err(AppError::forbidden("drivers cannot confirm payments"));
        }

        let transition = self.machine.confirm_payment(&ride, &request.order_id, self.clock.now())?;
        let amount = ride.total_amount.unwrap_or(ride.fare);
        self.payments
            .verify_payment(&request.order_id, &request.payment_id, amount)
            .await?;

        let saved = self.apply(&ride, transition).await?;
        tracing::info!(
            "Payment {} for order {} confirmed for ride {}",
            request.payment_id, request.order_id, saved.id
        );

        self.notify_parties(
            &saved,
            RideEvent::PaymentConfirmed {
                ride_id: saved.id.clone(),
                amount,
            },
        )
        .await;
        Ok(saved)
    }

    pub async fn cancel_ride(&self, ride_id: &str, actor: &Actor, reason: Option<String>) -> SparrowResult<Ride> {
        let ride = self.load_for(ride_id, actor).await?;
        let transition = self.machine.cancel(&ride, actor, reason, self.clock.now())?;
        let saved = self.apply(&ride, transition).await?;

        let Some(cancellation) = saved.cancellation.clone() else {
            return Ok(saved);
        };
        if let Some(driver_id) = cancellation.released_driver_id.as_deref() {
            self.directory.set_engaged(driver_id, false).await;
        }
        tracing::info!(
            "Ride {} cancelled by {} (fee {})",
            ride_id, actor, cancellation.fee
        );

        self.notify_parties(
            &saved,
            RideEvent::RideCancelled {
                ride_id: saved.id.clone(),
                cancelled_by: cancellation.cancelled_by,
                reason: cancellation.reason,
                fee: cancellation.fee,
            },
        )
        .await;
        Ok(saved)
    }

    /// Cancels SEARCHING rides whose request window has closed. Returns how
    /// many were cancelled by this sweep.
    pub async fn expire_stale_requests(&self) -> SparrowResult<usize> {
        let now = self.clock.now();
        let mut expired = 0;

        for ride in self.store.searching_rides().await? {
            if ride.request_expires_at.is_none_or(|deadline| deadline > now) {
                continue;
            }
            if let Some(cancelled) = self.cancel_as_system(&ride.id, "request expired").await? {
                expired += 1;
                if let Some(cancellation) = cancelled.cancellation {
                    notify_quietly(
                        self.notifier.as_ref(),
                        &cancelled.rider_id,
                        RideEvent::RideCancelled {
                            ride_id: cancelled.id.clone(),
                            cancelled_by: cancellation.cancelled_by,
                            reason: cancellation.reason,
                            fee: 0,
                        },
                    )
                    .await;
                }
            }
        }
        Ok(expired)
    }

    pub async fn wallet(&self, actor: &Actor) -> SparrowResult<WalletResponse> {
        let user_id = match actor.user_id() {
            Some(id) => id.to_string(),
            None => self.machine.settlement().platform_wallet_id.clone(),
        };
        let balance = self.store.wallet_balance(&user_id).await?;
        Ok(WalletResponse { user_id, balance })
    }
}

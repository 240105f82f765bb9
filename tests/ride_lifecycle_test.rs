mod common;

use chrono::Duration;

use common::{connaught_to_cyber_city, test_app, TestApp};
use sparrow_rides::{
    config::DispatchMode,
    models::{
        actor::Actor,
        driver::OfferReply,
        ride::{
            CompleteRideRequest, ConfirmPaymentRequest, PaymentMode, PaymentStatus, Place, Ride, RideStatus,
            StatusUpdateRequest,
        },
        wallet::TransactionKind,
    },
    SparrowError,
};

fn rider() -> Actor {
    Actor::Rider("rider-1".into())
}

fn driver(id: &str) -> Actor {
    Actor::Driver(id.into())
}

fn status(status: RideStatus) -> StatusUpdateRequest {
    StatusUpdateRequest {
        status,
        otp: None,
        final_location: None,
        reason: None,
    }
}

/// Requests CP to Cyber City and lets drv-1 accept it.
async fn accepted_ride(app: &TestApp, payment_mode: PaymentMode) -> Ride {
    app.driver_online("drv-1", 28.6330, 77.2167);
    let ride = app
        .state
        .ride_service
        .create_ride(&rider(), connaught_to_cyber_city(payment_mode))
        .await
        .unwrap();
    assert!(app.answer_offer(&ride.id, "drv-1", true).await);
    app.wait_for_status(&ride.id, RideStatus::Accepted).await
}

async fn started_ride(app: &TestApp, payment_mode: PaymentMode) -> Ride {
    let ride = accepted_ride(app, payment_mode).await;
    let service = &app.state.ride_service;
    service
        .update_status(&ride.id, &driver("drv-1"), status(RideStatus::DriverArrived))
        .await
        .unwrap();
    let start = StatusUpdateRequest {
        otp: Some(ride.otp.clone()),
        ..status(RideStatus::RideStarted)
    };
    service.update_status(&ride.id, &driver("drv-1"), start).await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn nearby_driver_accepts_and_is_assigned() {
    let app = test_app(DispatchMode::Background);
    app.driver_online("drv-1", 28.6330, 77.2167);

    let ride = app
        .state
        .ride_service
        .create_ride(&rider(), connaught_to_cyber_city(PaymentMode::Cash))
        .await
        .unwrap();
    assert_eq!(ride.status, RideStatus::Searching);
    assert_eq!(ride.distance_km, 28.0);
    assert_eq!(ride.estimated_fare, 582);
    assert_eq!(ride.fare, 582);
    assert_eq!(ride.otp.len(), 4);
    assert_eq!(ride.request_expires_at, Some(ride.created_at + Duration::minutes(10)));

    assert!(app.answer_offer(&ride.id, "drv-1", true).await);
    let accepted = app.wait_for_status(&ride.id, RideStatus::Accepted).await;

    assert_eq!(accepted.driver_id.as_deref(), Some("drv-1"));
    assert!(accepted.accepted_at.is_some());
    let metrics = accepted.pickup_metrics.expect("pickup metrics recorded");
    assert!(metrics.distance_km < 0.5);
    assert!(app.state.driver_service.is_engaged("drv-1"));

    let rider_events = app.notifier.sent_to("rider-1");
    assert!(rider_events.iter().any(|e| e.name() == "driver_assigned"));
    assert_eq!(app.notifier.count_named("ride_offer"), 1);
}

#[tokio::test(start_paused = true)]
async fn waiting_beyond_free_minutes_is_charged_at_start() {
    let app = test_app(DispatchMode::Background);
    let ride = accepted_ride(&app, PaymentMode::Cash).await;
    let service = &app.state.ride_service;

    service
        .update_status(&ride.id, &driver("drv-1"), status(RideStatus::DriverArrived))
        .await
        .unwrap();
    app.clock.advance(Duration::minutes(8));

    let start = StatusUpdateRequest {
        otp: Some(ride.otp.clone()),
        ..status(RideStatus::RideStarted)
    };
    let started = service.update_status(&ride.id, &driver("drv-1"), start).await.unwrap();

    assert_eq!(started.status, RideStatus::RideStarted);
    assert_eq!(started.extra_charges, 6);
    assert_eq!(started.fare, 588);
    assert!(app.notifier.sent_to("rider-1").iter().any(|e| e.name() == "ride_started"));
}

#[tokio::test(start_paused = true)]
async fn wrong_otp_leaves_ride_waiting_at_pickup() {
    let app = test_app(DispatchMode::Background);
    let ride = accepted_ride(&app, PaymentMode::Cash).await;
    let service = &app.state.ride_service;
    service
        .update_status(&ride.id, &driver("drv-1"), status(RideStatus::DriverArrived))
        .await
        .unwrap();
    app.set_otp(&ride.id, "5555").await;
    let before = app.ride(&ride.id).await;

    let start = StatusUpdateRequest {
        otp: Some("1234".into()),
        ..status(RideStatus::RideStarted)
    };
    let err = service.update_status(&ride.id, &driver("drv-1"), start).await.unwrap_err();

    assert!(matches!(err, SparrowError::InvalidOtp(_)));
    let after = app.ride(&ride.id).await;
    assert_eq!(after.status, RideStatus::DriverArrived);
    assert_eq!(after.version, before.version);
}

#[tokio::test(start_paused = true)]
async fn rider_cancelling_after_grace_pays_the_driver() {
    let app = test_app(DispatchMode::Background);
    let ride = accepted_ride(&app, PaymentMode::Cash).await;
    app.clock.advance(Duration::minutes(4));

    let cancelled = app
        .state
        .ride_service
        .cancel_ride(&ride.id, &rider(), Some("changed plans".into()))
        .await
        .unwrap();

    assert_eq!(cancelled.status, RideStatus::Cancelled);
    assert!(cancelled.driver_id.is_none());
    let cancellation = cancelled.cancellation.expect("cancellation recorded");
    assert_eq!(cancellation.fee, 50);
    assert_eq!(cancellation.released_driver_id.as_deref(), Some("drv-1"));

    assert_eq!(app.balance("rider-1").await, -50);
    assert_eq!(app.balance("drv-1").await, 50);
    let entries = app.state.store.transactions_for_ride(&ride.id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries.iter().map(|e| e.amount).sum::<i64>(), 0);

    assert!(!app.state.driver_service.is_engaged("drv-1"));
    assert!(app.notifier.sent_to("drv-1").iter().any(|e| e.name() == "ride_cancelled"));
}

#[tokio::test(start_paused = true)]
async fn rider_cancelling_within_grace_is_free() {
    let app = test_app(DispatchMode::Background);
    let ride = accepted_ride(&app, PaymentMode::Cash).await;
    app.clock.advance(Duration::minutes(2));

    let cancelled = app.state.ride_service.cancel_ride(&ride.id, &rider(), None).await.unwrap();

    assert_eq!(cancelled.cancellation.unwrap().fee, 0);
    assert!(app.state.store.transactions_for_ride(&ride.id).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn started_ride_cannot_be_cancelled_by_a_party() {
    let app = test_app(DispatchMode::Background);
    let ride = started_ride(&app, PaymentMode::Cash).await;

    let err = app.state.ride_service.cancel_ride(&ride.id, &rider(), None).await.unwrap_err();
    assert!(matches!(err, SparrowError::InvalidState(_)));
    assert_eq!(app.ride(&ride.id).await.status, RideStatus::RideStarted);
}

#[tokio::test(start_paused = true)]
async fn no_drivers_cancels_and_tells_rider_once() {
    let app = test_app(DispatchMode::Inline);

    let err = app
        .state
        .ride_service
        .create_ride(&rider(), connaught_to_cyber_city(PaymentMode::Cash))
        .await
        .unwrap_err();
    let SparrowError::NoDriversAvailable(ride_id) = err else {
        panic!("expected NoDriversAvailable, got {err:?}");
    };

    let ride = app.ride(&ride_id).await;
    assert_eq!(ride.status, RideStatus::Cancelled);
    assert!(ride.driver_id.is_none());
    assert_eq!(app.notifier.count_named("ride_offer"), 0);

    // A later expiry sweep must not notify again
    app.clock.advance(Duration::minutes(11));
    assert_eq!(app.state.ride_service.expire_stale_requests().await.unwrap(), 0);
    assert_eq!(app.notifier.count_named("no_driver_found"), 1);
    assert_eq!(app.notifier.sent_to("rider-1").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_driver_is_offered_once_then_search_gives_up() {
    let app = test_app(DispatchMode::Inline);
    app.driver_online("drv-1", 28.6330, 77.2167);

    let err = app
        .state
        .ride_service
        .create_ride(&rider(), connaught_to_cyber_city(PaymentMode::Cash))
        .await
        .unwrap_err();
    let SparrowError::NoDriversAvailable(ride_id) = err else {
        panic!("expected NoDriversAvailable, got {err:?}");
    };

    assert_eq!(app.notifier.count_named("ride_offer"), 1);
    assert!(!app.state.response_hub.respond(&ride_id, "drv-1", OfferReply { accepted: true }));
    assert_eq!(app.ride(&ride_id).await.status, RideStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn late_reply_after_timeout_changes_nothing() {
    let app = test_app(DispatchMode::Background);
    app.driver_online("slow", 28.6330, 77.2167);
    app.driver_online("fast", 28.6360, 77.2167);

    let ride = app
        .state
        .ride_service
        .create_ride(&rider(), connaught_to_cyber_city(PaymentMode::Cash))
        .await
        .unwrap();

    // The slow driver is nearest and is offered first, then times out
    assert!(app.answer_offer(&ride.id, "fast", true).await);
    let accepted = app.wait_for_status(&ride.id, RideStatus::Accepted).await;
    assert_eq!(accepted.driver_id.as_deref(), Some("fast"));

    assert!(!app.state.response_hub.respond(&ride.id, "slow", OfferReply { accepted: true }));
    let after = app.ride(&ride.id).await;
    assert_eq!(after.driver_id.as_deref(), Some("fast"));
    assert_eq!(after.version, accepted.version);
    assert!(app.notifier.sent_to("slow").iter().any(|e| e.name() == "ride_unavailable"));
}

#[tokio::test(start_paused = true)]
async fn cash_completion_books_commission_against_driver() {
    let app = test_app(DispatchMode::Background);
    let ride = started_ride(&app, PaymentMode::Cash).await;

    let ended = app
        .state
        .ride_service
        .complete_ride(&ride.id, &driver("drv-1"), CompleteRideRequest::default())
        .await
        .unwrap();

    assert_eq!(ended.status, RideStatus::RideEnded);
    assert_eq!(ended.payment_status, PaymentStatus::Paid);
    assert_eq!(ended.total_amount, Some(582));
    assert_eq!(app.balance("drv-1").await, -116);
    assert_eq!(app.balance("platform").await, 116);
    assert!(!app.state.driver_service.is_engaged("drv-1"));
    assert!(app.notifier.sent_to("rider-1").iter().any(|e| e.name() == "ride_completed"));
}

#[tokio::test(start_paused = true)]
async fn online_completion_settles_after_confirmation() {
    let app = test_app(DispatchMode::Background);
    let ride = started_ride(&app, PaymentMode::Online).await;
    let service = &app.state.ride_service;

    let pending = service
        .complete_ride(&ride.id, &driver("drv-1"), CompleteRideRequest::default())
        .await
        .unwrap();
    assert_eq!(pending.status, RideStatus::PaymentPending);
    let order_id = pending.payment_order_id.clone().expect("payment order attached");
    assert!(app.notifier.sent_to("rider-1").iter().any(|e| e.name() == "payment_requested"));
    assert_eq!(app.balance("drv-1").await, 0);

    let payment_id = app.payments.capture(&order_id).expect("order was opened");
    let confirm = ConfirmPaymentRequest {
        ride_id: ride.id.clone(),
        order_id: order_id.clone(),
        payment_id: payment_id.clone(),
    };
    let err = service.confirm_payment(&driver("drv-1"), confirm).await.unwrap_err();
    assert!(matches!(err, SparrowError::Forbidden(_)));

    let confirm = ConfirmPaymentRequest {
        ride_id: ride.id.clone(),
        order_id,
        payment_id,
    };
    let ended = service.confirm_payment(&rider(), confirm).await.unwrap();

    assert_eq!(ended.status, RideStatus::RideEnded);
    assert_eq!(ended.payment_status, PaymentStatus::Paid);
    assert_eq!(app.balance("drv-1").await, 466);
    assert_eq!(app.balance("platform").await, 116);

    let kinds: Vec<_> = app
        .state
        .store
        .transactions_for_ride(&ride.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert!(kinds.contains(&TransactionKind::RideEarning));
    assert!(kinds.contains(&TransactionKind::Commission));
}

#[tokio::test(start_paused = true)]
async fn unpaid_order_cannot_end_the_ride() {
    let app = test_app(DispatchMode::Background);
    let ride = started_ride(&app, PaymentMode::Online).await;
    let service = &app.state.ride_service;

    let pending = service
        .complete_ride(&ride.id, &driver("drv-1"), CompleteRideRequest::default())
        .await
        .unwrap();
    let order_id = pending.payment_order_id.clone().expect("payment order attached");

    // The order id alone, as pushed to the rider, proves nothing
    let confirm = ConfirmPaymentRequest {
        ride_id: ride.id.clone(),
        order_id: order_id.clone(),
        payment_id: "pay_never_made".into(),
    };
    let err = service.confirm_payment(&rider(), confirm).await.unwrap_err();
    assert!(matches!(err, SparrowError::PaymentUnverified(_)));

    let after = app.ride(&ride.id).await;
    assert_eq!(after.status, RideStatus::PaymentPending);
    assert_eq!(after.payment_status, PaymentStatus::Pending);
    assert_eq!(app.balance("drv-1").await, 0);
    assert_eq!(app.balance("platform").await, 0);
    assert!(app.state.store.transactions_for_ride(&ride.id).await.unwrap().is_empty());
    assert_eq!(app.notifier.count_named("payment_confirmed"), 0);
}

#[tokio::test(start_paused = true)]
async fn one_driver_cannot_hold_two_rides() {
    let app = test_app(DispatchMode::Background);
    app.driver_online("drv-1", 28.6330, 77.2167);
    let service = &app.state.ride_service;

    let first = service
        .create_ride(&Actor::Rider("rider-1".into()), connaught_to_cyber_city(PaymentMode::Cash))
        .await
        .unwrap();
    let second = service
        .create_ride(&Actor::Rider("rider-2".into()), connaught_to_cyber_city(PaymentMode::Cash))
        .await
        .unwrap();

    // Both offers are open at once; the driver says yes to each
    assert!(app.answer_offer(&first.id, "drv-1", true).await);
    assert!(app.answer_offer(&second.id, "drv-1", true).await);

    // Whichever acceptance lands first wins; the other ride keeps searching and runs dry
    let mut settled = Vec::new();
    for id in [&first.id, &second.id] {
        let mut ride = app.ride(id).await;
        for _ in 0..400 {
            if ride.status != RideStatus::Searching {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            ride = app.ride(id).await;
        }
        settled.push(ride);
    }

    let accepted: Vec<_> = settled.iter().filter(|r| r.status == RideStatus::Accepted).collect();
    let cancelled: Vec<_> = settled.iter().filter(|r| r.status == RideStatus::Cancelled).collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(cancelled.len(), 1);
    assert_eq!(accepted[0].driver_id.as_deref(), Some("drv-1"));
    assert!(cancelled[0].driver_id.is_none());
    assert_eq!(app.notifier.count_named("no_driver_found"), 1);
    assert!(app
        .notifier
        .sent_to(&cancelled[0].rider_id)
        .iter()
        .any(|e| e.name() == "no_driver_found"));
    assert!(app.state.driver_service.is_engaged("drv-1"));
}

#[tokio::test(start_paused = true)]
async fn longer_amended_drop_raises_the_total() {
    let app = test_app(DispatchMode::Background);
    let ride = started_ride(&app, PaymentMode::Cash).await;

    let request = CompleteRideRequest {
        final_location: Some(Place::at("Manesar", 28.3540, 76.9366)),
    };
    let ended = app
        .state
        .ride_service
        .complete_ride(&ride.id, &driver("drv-1"), request)
        .await
        .unwrap();

    assert_eq!(ended.drop.address, "Manesar");
    assert!(ended.total_amount.unwrap() > 582);
}

#[tokio::test(start_paused = true)]
async fn unlocatable_amended_drop_keeps_the_estimate() {
    let app = test_app(DispatchMode::Background);
    let ride = started_ride(&app, PaymentMode::Cash).await;

    let request = CompleteRideRequest {
        final_location: Some(Place {
            address: "Somewhere past the toll".into(),
            coordinates: None,
            region: None,
        }),
    };
    let ended = app
        .state
        .ride_service
        .complete_ride(&ride.id, &driver("drv-1"), request)
        .await
        .unwrap();

    assert_eq!(ended.status, RideStatus::RideEnded);
    assert_eq!(ended.total_amount, Some(582));
}

#[tokio::test(start_paused = true)]
async fn only_the_assigned_driver_moves_the_ride() {
    let app = test_app(DispatchMode::Background);
    let ride = accepted_ride(&app, PaymentMode::Cash).await;
    let service = &app.state.ride_service;

    // Another driver cannot even see the ride
    let err = service
        .update_status(&ride.id, &driver("drv-2"), status(RideStatus::DriverArrived))
        .await
        .unwrap_err();
    assert!(matches!(err, SparrowError::NotFound(_)));

    let err = service
        .update_status(&ride.id, &rider(), status(RideStatus::DriverArrived))
        .await
        .unwrap_err();
    assert!(matches!(err, SparrowError::Forbidden(_)));

    let err = service
        .update_status(&ride.id, &driver("drv-1"), status(RideStatus::RideStarted))
        .await
        .unwrap_err();
    assert!(matches!(err, SparrowError::InvalidState(_)));
}

#[tokio::test(start_paused = true)]
async fn expired_search_is_cancelled_by_sweep() {
    let app = test_app(DispatchMode::Background);
    // Nobody answers, and the episode's offers outlast the request window
    app.driver_online("drv-1", 28.6330, 77.2167);
    let ride = app
        .state
        .ride_service
        .create_ride(&rider(), connaught_to_cyber_city(PaymentMode::Cash))
        .await
        .unwrap();

    assert_eq!(app.state.ride_service.expire_stale_requests().await.unwrap(), 0);
    app.clock.advance(Duration::minutes(11));
    assert_eq!(app.state.ride_service.expire_stale_requests().await.unwrap(), 1);

    let cancelled = app.ride(&ride.id).await;
    assert_eq!(cancelled.status, RideStatus::Cancelled);
    assert_eq!(cancelled.cancellation.unwrap().reason.as_deref(), Some("request expired"));

    // Whatever the running episode was doing, it cannot assign now
    let _ = app.answer_offer(&ride.id, "drv-1", true).await;
    let after = app.ride(&ride.id).await;
    assert_eq!(after.status, RideStatus::Cancelled);
    assert!(after.driver_id.is_none());
    assert!(!app.state.driver_service.is_engaged("drv-1"));
}

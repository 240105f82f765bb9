use std::sync::Arc;

use crate::{
    config::AppConfig,
    errors::SparrowResult,
    services::{
        dispatch_engine::DispatchEngine,
        driver_service::DriverService,
        fare_engine::{FareConfig, FareEngine},
        geo_service::{GeoEstimator, HttpGeoEstimator},
        messaging_service::{
            ChannelRegistry, InMemoryChannelRegistry, MockNotificationService, NotificationService,
            PushConfig, PushNotificationService,
        },
        offer_service::{RealtimeOfferProtocol, ResponseHub},
        payment_service::{HttpPaymentGateway, MockPaymentGateway, PaymentGateway},
        redis_store::RedisRideStore,
        ride_service::{RideService, RideServiceDeps},
        ride_store::{InMemoryRideStore, RideStore},
        state_machine::RideStateMachine,
    },
    utils::clock::{Clock, SystemClock},
};

pub struct AppState {
    pub ride_service: RideService,
    pub driver_service: Arc<DriverService>,
    pub channels: Arc<dyn ChannelRegistry>,
    pub response_hub: Arc<ResponseHub>,
    pub store: Arc<dyn RideStore>,
    pub notification_service: Arc<dyn NotificationService>,
    pub config: AppConfig,
}

/// External collaborators; everything else is built from these and the config.
pub struct StateParts {
    pub store: Arc<dyn RideStore>,
    pub clock: Arc<dyn Clock>,
    pub geo: Arc<dyn GeoEstimator>,
    pub notifier: Arc<dyn NotificationService>,
    pub payments: Arc<dyn PaymentGateway>,
    pub channels: Arc<dyn ChannelRegistry>,
    pub fares: FareConfig,
}

impl StateParts {
    /// Process-local collaborators: memory store, great-circle geo, mock gateway.
    pub fn in_memory(clock: Arc<dyn Clock>, notifier: Arc<dyn NotificationService>) -> Self {
        Self {
            store: Arc::new(InMemoryRideStore::new()),
            clock,
            geo: Arc::new(HttpGeoEstimator::offline()),
            notifier,
            payments: Arc::new(MockPaymentGateway::new()),
            channels: Arc::new(InMemoryChannelRegistry::new()),
            fares: FareConfig::default(),
        }
    }
}

impl AppState {
    pub async fn new(config: AppConfig) -> SparrowResult<Self> {
        let store: Arc<dyn RideStore> = match &config.redis_url {
            Some(url) => Arc::new(RedisRideStore::new(url).await?),
            None => {
                tracing::warn!("SPARROW_REDIS_URL not set, keeping rides in memory");
                Arc::new(InMemoryRideStore::new())
            }
        };

        let channels: Arc<dyn ChannelRegistry> = Arc::new(InMemoryChannelRegistry::new());
        let notifier: Arc<dyn NotificationService> = match &config.push_gateway_url {
            Some(url) => Arc::new(PushNotificationService::new(
                PushConfig {
                    gateway_url: url.clone(),
                    api_key: config.push_api_key.clone(),
                    timeout: config.push_timeout,
                },
                channels.clone(),
            )),
            None => {
                tracing::warn!("SPARROW_PUSH_URL not set, using mock notification service");
                Arc::new(MockNotificationService::new())
            }
        };

        let payments: Arc<dyn PaymentGateway> = match &config.payment_gateway_url {
            Some(url) => Arc::new(HttpPaymentGateway::new(url.clone(), config.payment_timeout)),
            None => {
                tracing::warn!("SPARROW_PAYMENT_URL not set, using mock payment gateway");
                Arc::new(MockPaymentGateway::new())
            }
        };

        if config.geo_service_url.is_none() {
            tracing::warn!("SPARROW_GEO_URL not set, distances are great-circle estimates");
        }

        let parts = StateParts {
            store,
            clock: Arc::new(SystemClock),
            geo: Arc::new(HttpGeoEstimator::new(config.geo_service_url.clone())),
            notifier,
            payments,
            channels,
            fares: config.load_fare_config()?,
        };
        Ok(Self::from_parts(config, parts))
    }

    pub fn from_parts(config: AppConfig, parts: StateParts) -> Self {
        let driver_service =
            Arc::new(DriverService::new(parts.clock.clone()).with_stale_after(config.driver_stale_after()));
        let response_hub = Arc::new(ResponseHub::new());
        let offers = Arc::new(RealtimeOfferProtocol::new(response_hub.clone(), parts.notifier.clone()));

        let dispatcher = Arc::new(DispatchEngine::new(
            parts.store.clone(),
            driver_service.clone(),
            parts.geo.clone(),
            offers,
            parts.notifier.clone(),
            parts.clock.clone(),
            config.dispatch.clone(),
        ));
        let machine = Arc::new(RideStateMachine::new(
            config.wait,
            config.cancellation.clone(),
            config.settlement.clone(),
        ));

        let ride_service = RideService::new(RideServiceDeps {
            store: parts.store.clone(),
            geo: parts.geo,
            fares: Arc::new(FareEngine::new(parts.fares)),
            machine,
            dispatcher,
            directory: driver_service.clone(),
            notifier: parts.notifier.clone(),
            payments: parts.payments,
            clock: parts.clock,
            dispatch_mode: config.dispatch_mode,
            request_ttl: config.request_ttl(),
        });

        Self {
            ride_service,
            driver_service,
            channels: parts.channels,
            response_hub,
            store: parts.store,
            notification_service: parts.notifier,
            config,
        }
    }
}

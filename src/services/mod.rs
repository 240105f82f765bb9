pub mod dispatch_engine;
pub mod driver_service;
pub mod fare_engine;
pub mod geo_service;
pub mod messaging_service;
pub mod offer_service;
pub mod payment_service;
pub mod redis_store;
pub mod ride_service;
pub mod ride_store;
pub mod state_machine;

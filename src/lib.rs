pub mod config;
pub mod errors;
pub mod handlers;
pub mod loops;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use errors::{SparrowError, SparrowResult, ValidationError};

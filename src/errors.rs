use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the sparrow-rides service
#[derive(Debug, Error)]
pub enum SparrowError {
    // Request and identity errors
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {} errors", .0.len())]
    ValidationFailed(Vec<ValidationError>),

    // Ride protocol errors
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid OTP supplied for ride {0}")]
    InvalidOtp(String),
    #[error("No drivers available for ride {0}")]
    NoDriversAvailable(String),
    #[error("Concurrent modification of ride {0}")]
    ConcurrencyConflict(String),
    #[error("Payment not verified: {0}")]
    PaymentUnverified(String),

    // Dependencies
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl SparrowError {
    /// Stable machine-readable code rendered at the API boundary.
    pub fn code(&self) -> &'static str {
        match self {
            SparrowError::BadRequest(_) => "bad_request",
            SparrowError::Unauthorized(_) => "unauthorized",
            SparrowError::Forbidden(_) => "forbidden",
            SparrowError::NotFound(_) => "not_found",
            SparrowError::ValidationFailed(_) => "validation_failed",
            SparrowError::InvalidState(_) => "invalid_state",
            SparrowError::InvalidOtp(_) => "invalid_otp",
            SparrowError::NoDriversAvailable(_) => "no_drivers_available",
            SparrowError::ConcurrencyConflict(_) => "concurrency_conflict",
            SparrowError::PaymentUnverified(_) => "payment_unverified",
            SparrowError::UpstreamFailure(_) => "upstream_failure",
            SparrowError::Storage(_) => "storage_error",
            SparrowError::Serialization(_) => "serialization_error",
            SparrowError::Configuration(_) => "configuration_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            SparrowError::BadRequest(_) | SparrowError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            SparrowError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            SparrowError::Forbidden(_) => StatusCode::FORBIDDEN,
            SparrowError::NotFound(_) => StatusCode::NOT_FOUND,
            SparrowError::InvalidState(_) | SparrowError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            SparrowError::InvalidOtp(_) | SparrowError::NoDriversAvailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SparrowError::PaymentUnverified(_) => StatusCode::PAYMENT_REQUIRED,
            SparrowError::UpstreamFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            SparrowError::Storage(_) | SparrowError::Serialization(_) | SparrowError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for SparrowError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            SparrowError::ValidationFailed(errors) => serde_json::to_value(errors).ok(),
            _ => None,
        };

        // Storage internals stay in the logs
        let message = match &self {
            SparrowError::Storage(_) | SparrowError::Serialization(_) | SparrowError::Configuration(_) => {
                tracing::error!("Internal error: {}", self);
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let error_response = ErrorResponse {
            error: self.code(),
            message,
            details,
        };

        (status, axum::Json(error_response)).into_response()
    }
}

// Convenience type alias for Results
pub type SparrowResult<T> = Result<T, SparrowError>;

impl From<redis::RedisError> for SparrowError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::IoError => SparrowError::Storage(format!("Redis connection error: {}", err)),
            redis::ErrorKind::AuthenticationFailed => SparrowError::Storage("Redis authentication failed".to_string()),
            _ => SparrowError::Storage(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for SparrowError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SparrowError::UpstreamFailure("request timed out".to_string())
        } else {
            SparrowError::UpstreamFailure(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SparrowError {
    fn from(err: serde_json::Error) -> Self {
        SparrowError::Serialization(err.to_string())
    }
}

// Helper functions for creating common errors
impl SparrowError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        SparrowError::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        SparrowError::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        SparrowError::Forbidden(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        SparrowError::NotFound(resource.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        SparrowError::InvalidState(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        SparrowError::UpstreamFailure(msg.into())
    }

    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        SparrowError::ValidationFailed(vec![ValidationError {
            field: field.into(),
            message: message.into(),
        }])
    }

    pub fn ride_not_found(ride_id: impl Into<String>) -> Self {
        SparrowError::NotFound(format!("ride {}", ride_id.into()))
    }
}

// src/handlers/auth.rs
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::errors::SparrowError as AppError;
use crate::models::Actor;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Caller identity as forwarded by the upstream auth layer.
#[derive(Debug, Clone)]
pub struct AuthenticatedActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

        let role = header(USER_ROLE_HEADER).ok_or_else(|| AppError::unauthorized("missing x-user-role header"))?;
        Actor::from_parts(role, header(USER_ID_HEADER)).map(AuthenticatedActor)
    }
}

// src/models/actor.rs
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{SparrowError, SparrowResult};

/// Who is asking. Identity is established by the upstream auth layer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Rider(String),
    Driver(String),
    System,
}

impl Actor {
    pub fn from_parts(role: &str, user_id: Option<&str>) -> SparrowResult<Self> {
        let require_id = || {
            user_id
                .filter(|id| !id.trim().is_empty())
                .map(str::to_string)
                .ok_or_else(|| SparrowError::unauthorized("missing user id"))
        };

        match role {
            "rider" => Ok(Actor::Rider(require_id()?)),
            "driver" => Ok(Actor::Driver(require_id()?)),
            "system" => Ok(Actor::System),
            other => Err(SparrowError::unauthorized(format!("unknown role '{}'", other))),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Actor::Rider(id) | Actor::Driver(id) => Some(id),
            Actor::System => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Rider(id) => write!(f, "rider:{}", id),
            Actor::Driver(id) => write!(f, "driver:{}", id),
            Actor::System => f.write_str("system"),
        }
    }
}

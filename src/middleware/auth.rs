use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use uuid::Uuid;

use crate::error::AppError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorRole {
    /// `nasabah`
    Depositor,
    /// `bank_sampah`
    WasteBank,
    Other(String),
}

impl ActorRole {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "nasabah" => ActorRole::Depositor,
            "bank_sampah" => ActorRole::WasteBank,
            other => ActorRole::Other(other.to_string()),
        }
    }
}

/// Caller identity forwarded by the upstream auth gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let id = headers
            .get(ACTOR_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing x-actor-id header".to_string()))?;
        let id = Uuid::parse_str(id.trim())
            .map_err(|_| AppError::Unauthorized("x-actor-id is not a valid id".to_string()))?;

        let role = headers
            .get(ACTOR_ROLE_HEADER)
            .and_then(|h| h.to_str().ok())
            .filter(|role| !role.trim().is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing x-actor-role header".to_string()))?;

        Ok(Actor {
            id,
            role: ActorRole::parse(role),
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Actor::from_headers(&parts.headers)
    }
}

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::Response;

use horizon_auth::Identity;
use horizon_core::UserId;

use crate::app::errors::json_error;

/// Authenticated caller for a request.
///
/// Inserted by the auth middleware; extracting it on a request without a valid
/// bearer token yields `401`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    identity: Identity,
}

impl RequestIdentity {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    pub fn is_host(&self) -> bool {
        self.identity.is_host
    }

    /// `403` unless the caller is a host.
    pub fn require_host(&self) -> Result<(), Response> {
        if self.is_host() {
            Ok(())
        } else {
            Err(json_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                "only hosts may perform this action",
            ))
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestIdentity>()
            .cloned()
            .ok_or_else(|| {
                json_error(
                    StatusCode::UNAUTHORIZED,
                    "unauthorized",
                    "a bearer token is required",
                )
            })
    }
}

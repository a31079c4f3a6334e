//! Token to [`Identity`] resolution.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::debug;

use horizon_core::UserId;

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
    pub is_host: bool,
}

impl From<JwtClaims> for Identity {
    fn from(claims: JwtClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            is_host: claims.is_host,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed or unsigned token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Resolves a bearer token into an identity.
pub trait AuthGateway: Send + Sync {
    fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, AuthError>;
}

/// HS256 JWT gateway.
///
/// Expiry is carried in `expires_at` rather than the registered `exp` claim, so
/// the time window is checked by [`validate_claims`] after signature
/// verification.
#[derive(Clone)]
pub struct Hs256AuthGateway {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl Hs256AuthGateway {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign `claims` (tests and tooling).
    pub fn issue_token(&self, claims: &JwtClaims) -> Result<String, AuthError> {
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding,
        )?)
    }
}

impl core::fmt::Debug for Hs256AuthGateway {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256AuthGateway").finish_non_exhaustive()
    }
}

impl AuthGateway for Hs256AuthGateway {
    fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, AuthError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &self.validation)?;
        validate_claims(&data.claims, now)?;
        debug!(user_id = %data.claims.sub, "token accepted");
        Ok(data.claims.into())
    }
}

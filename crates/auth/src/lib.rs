//! `horizon-auth`: bearer-token authentication boundary.
//!
//! Decoupled from HTTP and storage. The ticketing core trusts the [`Identity`]
//! produced here.

pub mod claims;
pub mod gateway;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use gateway::{AuthError, AuthGateway, Hs256AuthGateway, Identity};

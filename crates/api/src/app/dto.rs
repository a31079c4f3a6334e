use core::str::FromStr;

use serde::Deserialize;

use horizon_core::DomainError;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub event_id: String,
    pub ticket_type: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameCategoryRequest {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteCategoryQuery {
    #[serde(default)]
    pub cascade: Option<bool>,
}

// -------------------------
// Parsing helpers
// -------------------------

/// Parse a path or body identifier, mapping failures to `400`.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse().map_err(errors::domain_error_to_response)
}

/// Booking quantities arrive as signed JSON numbers; only `1..=u32::MAX` is
/// accepted.
pub fn parse_quantity(raw: i64) -> Result<u32, axum::response::Response> {
    if raw <= 0 {
        return Err(errors::domain_error_to_response(DomainError::validation(
            "quantity must be greater than zero",
        )));
    }
    u32::try_from(raw).map_err(|_| {
        errors::domain_error_to_response(DomainError::validation("quantity is too large"))
    })
}

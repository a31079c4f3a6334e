//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// The kind of record a lookup failed to find.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    Event,
    Booking,
    Category,
    TicketType,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Event => "event",
            Resource::Booking => "booking",
            Resource::Category => "category",
            Resource::TicketType => "ticket type",
        }
    }
}

impl core::fmt::Display for Resource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification used by callers to pick a transport status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Forbidden,
    Internal,
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// inventory, lifecycle conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A requested record does not exist.
    #[error("{0} not found")]
    NotFound(Resource),

    /// Not enough tickets left in the requested class.
    #[error("insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory { requested: u32, available: u32 },

    /// The booking has already transitioned to `cancelled`.
    #[error("booking is already cancelled")]
    AlreadyCancelled,

    /// A category cannot be removed while events still reference it.
    #[error("category still has {0} event(s)")]
    CategoryHasEvents(u64),

    /// A unique name is already taken.
    #[error("name already exists: {0}")]
    DuplicateName(String),

    /// Any other state conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The caller may not act on this record.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName(name.into())
    }

    pub fn event_not_found() -> Self {
        Self::NotFound(Resource::Event)
    }

    pub fn booking_not_found() -> Self {
        Self::NotFound(Resource::Booking)
    }

    pub fn category_not_found() -> Self {
        Self::NotFound(Resource::Category)
    }

    pub fn ticket_type_not_found() -> Self {
        Self::NotFound(Resource::TicketType)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            // The caller named a tier the event does not sell.
            DomainError::NotFound(Resource::TicketType) => ErrorKind::Validation,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::InsufficientInventory { .. }
            | DomainError::AlreadyCancelled
            | DomainError::CategoryHasEvents(_)
            | DomainError::DuplicateName(_)
            | DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::Validation(_) | DomainError::InvalidId(_) => ErrorKind::Validation,
            DomainError::Forbidden(_) => ErrorKind::Forbidden,
            DomainError::InvariantViolation(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound(Resource::Event) => "event_not_found",
            DomainError::NotFound(Resource::Booking) => "booking_not_found",
            DomainError::NotFound(Resource::Category) => "category_not_found",
            DomainError::NotFound(Resource::TicketType) => "ticket_type_not_found",
            DomainError::InsufficientInventory { .. } => "insufficient_inventory",
            DomainError::AlreadyCancelled => "already_cancelled",
            DomainError::CategoryHasEvents(_) => "category_has_events",
            DomainError::DuplicateName(_) => "duplicate_name",
            DomainError::Conflict(_) => "conflict",
            DomainError::Validation(_) => "validation_error",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::Forbidden(_) => "forbidden",
            DomainError::InvariantViolation(_) => "invariant_violation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_share_one_kind() {
        let errs = [
            DomainError::InsufficientInventory { requested: 6, available: 4 },
            DomainError::AlreadyCancelled,
            DomainError::CategoryHasEvents(2),
            DomainError::duplicate_name("Music"),
        ];
        for e in errs {
            assert_eq!(e.kind(), ErrorKind::Conflict, "{e}");
        }
    }

    #[test]
    fn not_found_message_names_the_resource() {
        assert_eq!(DomainError::booking_not_found().to_string(), "booking not found");
        assert_eq!(
            DomainError::ticket_type_not_found().code(),
            "ticket_type_not_found"
        );
        assert_eq!(DomainError::event_not_found().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn invalid_ids_are_validation_failures() {
        assert_eq!(DomainError::invalid_id("x").kind(), ErrorKind::Validation);
        assert_eq!(DomainError::ticket_type_not_found().kind(), ErrorKind::Validation);
        assert_eq!(DomainError::invariant("x").kind(), ErrorKind::Internal);
    }
}

//! Error type shared by stores and the transactional services.

use thiserror::Error;

use horizon_core::{DomainError, ErrorKind};

pub type TicketingResult<T> = Result<T, TicketingError>;

/// Ticketing operation error.
///
/// Business failures travel as [`DomainError`]; the other variants are
/// infrastructure failures surfaced by a store.
#[derive(Debug, Error)]
pub enum TicketingError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The store aborted the atomic unit because of a concurrent writer.
    /// Safe to retry; nothing was written.
    #[error("serialization conflict: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    /// A persisted row could not be mapped back into the domain.
    #[error("corrupt stored record: {0}")]
    Corrupt(String),
}

impl TicketingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TicketingError::Domain(e) => e.kind(),
            TicketingError::Serialization(_) => ErrorKind::Conflict,
            TicketingError::Backend(_) | TicketingError::Corrupt(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TicketingError::Domain(e) => e.code(),
            TicketingError::Serialization(_) => "retryable_conflict",
            TicketingError::Backend(_) => "store_error",
            TicketingError::Corrupt(_) => "corrupt_record",
        }
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            TicketingError::Domain(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TicketingError::Serialization(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_kind_and_code() {
        let err = TicketingError::from(DomainError::AlreadyCancelled);
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.code(), "already_cancelled");
        assert_eq!(err.domain(), Some(&DomainError::AlreadyCancelled));
        assert!(!err.is_retryable());
    }

    #[test]
    fn serialization_failures_are_retryable_conflicts() {
        let err = TicketingError::Serialization("40001".to_string());
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(TicketingError::Backend("down".into()).kind(), ErrorKind::Internal);
    }
}

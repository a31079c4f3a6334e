//! Infrastructure layer: stores, transactional services, background workers, config.

pub mod booking;
pub mod cascade;
pub mod catalog;
pub mod config;
pub mod error;
pub mod reaper;
pub mod store;


pub use booking::{BookingTransactionManager, CancellationOutcome};
pub use cascade::{CascadeDeletionCoordinator, CategoryDeletion, EventDeletion, SweepFailure, SweepReport};
pub use catalog::EventCatalog;
pub use error::{TicketingError, TicketingResult};
pub use reaper::{ExpiryReaper, ReaperHandle};

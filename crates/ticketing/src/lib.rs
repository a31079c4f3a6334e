//! Ticketing domain module.
//!
//! Events with their embedded inventory ledger, bookings drawn against it and
//! the categories events are filed under. Everything here is deterministic domain
//! logic (no IO, no HTTP, no storage); atomicity is the store's job.

pub mod booking;
pub mod category;
pub mod event;
pub mod ledger;
pub mod ticket;

pub use booking::{Booking, BookingReceipt, BookingStatus, new_transaction_id};
pub use category::{Category, CategoryWithEvents, normalize_category_name};
pub use event::{Event, EventDetails, NewEvent};
pub use ledger::InventoryLedger;
pub use ticket::{NewTicketClass, Release, TicketClass, TicketType};

//! `horizon-core` — shared domain primitives for the ticketing engine.
//!
//! This crate contains **pure domain** building blocks (no infrastructure concerns):
//! typed identifiers, the entity contract and the domain error taxonomy.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult, ErrorKind, Resource};
pub use id::{BookingId, CategoryId, EventId, TicketClassId, UserId};

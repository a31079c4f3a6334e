//! Storage boundary for events, bookings and categories.
//!
//! A [`TicketingStore`] serves plain reads and opens atomic units
//! ([`StoreUnit`]). Every multi-record mutation in the services happens inside one
//! unit: it either commits in full or leaves no trace.
//!
//! ## Implementation Requirements
//!
//! Implementations must:
//! - serialize units that touch the same event or booking (or at least make
//!   `take_tickets` an atomic conditional decrement and `mark_cancelled` an
//!   atomic compare-and-set on status)
//! - discard all writes of a unit that is rolled back or dropped uncommitted
//! - return only `confirmed` bookings from the listing reads

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use horizon_core::{BookingId, CategoryId, EventId, TicketClassId, UserId};
use horizon_ticketing::{Booking, Category, Event, Release, TicketType};

use crate::error::TicketingResult;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryTicketingStore;
pub use postgres::PostgresTicketingStore;

/// Reads plus the entry point to atomic units.
#[async_trait]
pub trait TicketingStore: Send + Sync {
    type Unit: StoreUnit;

    /// Open a new atomic unit.
    async fn begin(&self) -> TicketingResult<Self::Unit>;

    async fn event(&self, id: EventId) -> TicketingResult<Option<Event>>;

    async fn events(&self) -> TicketingResult<Vec<Event>>;

    async fn events_in_category(&self, category_id: CategoryId) -> TicketingResult<Vec<Event>>;

    /// Events whose `end_time` is strictly before `now`.
    async fn expired_events(&self, now: DateTime<Utc>) -> TicketingResult<Vec<Event>>;

    /// Any status.
    async fn booking(&self, id: BookingId) -> TicketingResult<Option<Booking>>;

    async fn bookings_for_user(&self, user_id: UserId) -> TicketingResult<Vec<Booking>>;

    async fn bookings_for_event(&self, event_id: EventId) -> TicketingResult<Vec<Booking>>;

    async fn all_bookings(&self) -> TicketingResult<Vec<Booking>>;

    async fn category(&self, id: CategoryId) -> TicketingResult<Option<Category>>;

    /// Case-insensitive exact match.
    async fn category_by_name(&self, name: &str) -> TicketingResult<Option<Category>>;

    async fn categories(&self) -> TicketingResult<Vec<Category>>;
}

/// One atomic unit of reads and writes.
///
/// Reads inside a unit lock what they return until the unit ends.
#[async_trait]
pub trait StoreUnit: Send {
    async fn event(&mut self, id: EventId) -> TicketingResult<Option<Event>>;

    /// Case-insensitive exact match.
    async fn event_by_name(&mut self, name: &str) -> TicketingResult<Option<Event>>;

    async fn insert_event(&mut self, event: &Event) -> TicketingResult<()>;

    /// Overwrite descriptive fields and ticket classes of an existing event.
    async fn replace_event(&mut self, event: &Event) -> TicketingResult<()>;

    /// Returns the number of events removed.
    async fn delete_events(&mut self, ids: &[EventId]) -> TicketingResult<u64>;

    /// Conditional decrement: `available -= quantity` only where
    /// `available >= quantity`. Returns `false` when nothing matched.
    async fn take_tickets(
        &mut self,
        event_id: EventId,
        class_id: TicketClassId,
        quantity: u32,
    ) -> TicketingResult<bool>;

    /// Clamped increment on the class with `class_id`, falling back to the class of
    /// `fallback` type. `None` when neither exists.
    async fn restore_tickets(
        &mut self,
        event_id: EventId,
        class_id: TicketClassId,
        fallback: TicketType,
        quantity: u32,
    ) -> TicketingResult<Option<Release>>;

    /// Any status.
    async fn booking(&mut self, id: BookingId) -> TicketingResult<Option<Booking>>;

    async fn insert_booking(&mut self, booking: &Booking) -> TicketingResult<()>;

    /// Compare-and-set `confirmed -> cancelled`. Returns `false` when the booking is
    /// missing or not confirmed.
    async fn mark_cancelled(&mut self, id: BookingId, at: DateTime<Utc>) -> TicketingResult<bool>;

    /// Physically removes every booking of the event, any status.
    async fn delete_bookings_for_event(&mut self, event_id: EventId) -> TicketingResult<u64>;

    async fn category(&mut self, id: CategoryId) -> TicketingResult<Option<Category>>;

    async fn category_by_name(&mut self, name: &str) -> TicketingResult<Option<Category>>;

    async fn insert_category(&mut self, category: &Category) -> TicketingResult<()>;

    /// Rename the category and refresh `category_name` on its events.
    async fn rename_category(&mut self, id: CategoryId, name: &str) -> TicketingResult<bool>;

    async fn delete_category(&mut self, id: CategoryId) -> TicketingResult<bool>;

    async fn event_ids_in_category(&mut self, category_id: CategoryId) -> TicketingResult<Vec<EventId>>;

    async fn commit(self) -> TicketingResult<()>;

    async fn rollback(self) -> TicketingResult<()>;
}

/// Commit on success, roll back on failure. The operation's own error wins over a
/// rollback failure.
pub async fn settle<U, T>(unit: U, result: TicketingResult<T>) -> TicketingResult<T>
where
    U: StoreUnit,
{
    match result {
        Ok(value) => {
            unit.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = unit.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

#[async_trait]
impl<S> TicketingStore for Arc<S>
where
    S: TicketingStore + ?Sized,
{
    type Unit = S::Unit;

    async fn begin(&self) -> TicketingResult<Self::Unit> {
        (**self).begin().await
    }

    async fn event(&self, id: EventId) -> TicketingResult<Option<Event>> {
        (**self).event(id).await
    }

    async fn events(&self) -> TicketingResult<Vec<Event>> {
        (**self).events().await
    }

    async fn events_in_category(&self, category_id: CategoryId) -> TicketingResult<Vec<Event>> {
        (**self).events_in_category(category_id).await
    }

    async fn expired_events(&self, now: DateTime<Utc>) -> TicketingResult<Vec<Event>> {
        (**self).expired_events(now).await
    }

    async fn booking(&self, id: BookingId) -> TicketingResult<Option<Booking>> {
        (**self).booking(id).await
    }

    async fn bookings_for_user(&self, user_id: UserId) -> TicketingResult<Vec<Booking>> {
        (**self).bookings_for_user(user_id).await
    }

    async fn bookings_for_event(&self, event_id: EventId) -> TicketingResult<Vec<Booking>> {
        (**self).bookings_for_event(event_id).await
    }

    async fn all_bookings(&self) -> TicketingResult<Vec<Booking>> {
        (**self).all_bookings().await
    }

    async fn category(&self, id: CategoryId) -> TicketingResult<Option<Category>> {
        (**self).category(id).await
    }

    async fn category_by_name(&self, name: &str) -> TicketingResult<Option<Category>> {
        (**self).category_by_name(name).await
    }

    async fn categories(&self) -> TicketingResult<Vec<Category>> {
        (**self).categories().await
    }
}

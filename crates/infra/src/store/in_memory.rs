use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use horizon_core::{
    BookingId, CategoryId, DomainError, Entity, EventId, TicketClassId, UserId,
};
use horizon_ticketing::{Booking, Category, Event, Release, TicketType};

use super::{StoreUnit, TicketingStore};
use crate::error::TicketingResult;

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<EventId, Event>,
    bookings: HashMap<BookingId, Booking>,
    categories: HashMap<CategoryId, Category>,
}

impl Tables {
    fn sorted_events<'a>(events: impl Iterator<Item = &'a Event>) -> Vec<Event> {
        let mut out: Vec<Event> = events.cloned().collect();
        out.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        out
    }

    fn live_bookings(&self, keep: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .bookings
            .values()
            .filter(|b| b.is_confirmed() && keep(b))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.booked_at.cmp(&b.booked_at).then(a.id.cmp(&b.id)));
        out
    }

    fn category_named(&self, name: &str) -> Option<&Category> {
        self.categories.values().find(|c| c.matches_name(name))
    }

    fn event_named(&self, name: &str) -> Option<&Event> {
        self.events.values().find(|e| e.has_name(name))
    }
}

fn upsert<E: Entity>(table: &mut HashMap<E::Id, E>, record: E) {
    table.insert(record.id(), record);
}

/// Prior state of one record, replayed when a unit does not commit.
#[derive(Debug)]
enum Undo {
    Event(EventId, Option<Event>),
    Booking(BookingId, Option<Booking>),
    Category(CategoryId, Option<Category>),
}

fn restore<K: Eq + std::hash::Hash, V>(table: &mut HashMap<K, V>, key: K, prior: Option<V>) {
    match prior {
        Some(record) => table.insert(key, record),
        None => table.remove(&key),
    };
}

/// In-memory ticketing store.
///
/// Intended for tests/dev. Not optimized for performance.
///
/// A unit holds the table lock for its whole lifetime, so units are fully
/// serialized. Writes land on the tables directly and the prior version of each
/// touched record is journaled; a unit that does not commit replays the journal
/// backwards. The cost of a unit is proportional to what it touches, not to the
/// size of the store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTicketingStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryTicketingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Atomic unit over [`InMemoryTicketingStore`]. Dropping it uncommitted undoes
/// every write.
#[derive(Debug)]
pub struct InMemoryUnit {
    tables: OwnedMutexGuard<Tables>,
    journal: Vec<Undo>,
}

impl InMemoryUnit {
    fn touch_event(&mut self, id: EventId) {
        let prior = self.tables.events.get(&id).cloned();
        self.journal.push(Undo::Event(id, prior));
    }

    fn touch_booking(&mut self, id: BookingId) {
        let prior = self.tables.bookings.get(&id).cloned();
        self.journal.push(Undo::Booking(id, prior));
    }

    fn touch_category(&mut self, id: CategoryId) {
        let prior = self.tables.categories.get(&id).cloned();
        self.journal.push(Undo::Category(id, prior));
    }
}

impl Drop for InMemoryUnit {
    fn drop(&mut self) {
        let tables = &mut *self.tables;
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::Event(id, prior) => restore(&mut tables.events, id, prior),
                Undo::Booking(id, prior) => restore(&mut tables.bookings, id, prior),
                Undo::Category(id, prior) => restore(&mut tables.categories, id, prior),
            }
        }
    }
}

#[async_trait]
impl TicketingStore for InMemoryTicketingStore {
    type Unit = InMemoryUnit;

    async fn begin(&self) -> TicketingResult<Self::Unit> {
        let tables = self.tables.clone().lock_owned().await;
        Ok(InMemoryUnit {
            tables,
            journal: Vec::new(),
        })
    }

    async fn event(&self, id: EventId) -> TicketingResult<Option<Event>> {
        Ok(self.tables.lock().await.events.get(&id).cloned())
    }

    async fn events(&self) -> TicketingResult<Vec<Event>> {
        let tables = self.tables.lock().await;
        Ok(Tables::sorted_events(tables.events.values()))
    }

    async fn events_in_category(&self, category_id: CategoryId) -> TicketingResult<Vec<Event>> {
        let tables = self.tables.lock().await;
        Ok(Tables::sorted_events(
            tables.events.values().filter(|e| e.category_id == category_id),
        ))
    }

    async fn expired_events(&self, now: DateTime<Utc>) -> TicketingResult<Vec<Event>> {
        let tables = self.tables.lock().await;
        Ok(Tables::sorted_events(
            tables.events.values().filter(|e| e.is_expired(now)),
        ))
    }

    async fn booking(&self, id: BookingId) -> TicketingResult<Option<Booking>> {
        Ok(self.tables.lock().await.bookings.get(&id).cloned())
    }

    async fn bookings_for_user(&self, user_id: UserId) -> TicketingResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        Ok(tables.live_bookings(|b| b.user_id == user_id))
    }

    async fn bookings_for_event(&self, event_id: EventId) -> TicketingResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        Ok(tables.live_bookings(|b| b.event_id == event_id))
    }

    async fn all_bookings(&self) -> TicketingResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        Ok(tables.live_bookings(|_| true))
    }

    async fn category(&self, id: CategoryId) -> TicketingResult<Option<Category>> {
        Ok(self.tables.lock().await.categories.get(&id).cloned())
    }

    async fn category_by_name(&self, name: &str) -> TicketingResult<Option<Category>> {
        Ok(self.tables.lock().await.category_named(name).cloned())
    }

    async fn categories(&self) -> TicketingResult<Vec<Category>> {
        let tables = self.tables.lock().await;
        let mut out: Vec<Category> = tables.categories.values().cloned().collect();
        out.sort_by_key(|c| c.name.to_lowercase());
        Ok(out)
    }
}

#[async_trait]
impl StoreUnit for InMemoryUnit {
    async fn event(&mut self, id: EventId) -> TicketingResult<Option<Event>> {
        Ok(self.tables.events.get(&id).cloned())
    }

    async fn event_by_name(&mut self, name: &str) -> TicketingResult<Option<Event>> {
        Ok(self.tables.event_named(name).cloned())
    }

    async fn insert_event(&mut self, event: &Event) -> TicketingResult<()> {
        if !self.tables.categories.contains_key(&event.category_id) {
            return Err(DomainError::category_not_found().into());
        }
        if self.tables.event_named(&event.name).is_some() {
            return Err(DomainError::duplicate_name(event.name.clone()).into());
        }
        self.touch_event(event.id);
        upsert(&mut self.tables.events, event.clone());
        Ok(())
    }

    async fn replace_event(&mut self, event: &Event) -> TicketingResult<()> {
        if !self.tables.events.contains_key(&event.id) {
            return Err(DomainError::event_not_found().into());
        }
        if self
            .tables
            .event_named(&event.name)
            .is_some_and(|other| other.id != event.id)
        {
            return Err(DomainError::duplicate_name(event.name.clone()).into());
        }
        self.touch_event(event.id);
        upsert(&mut self.tables.events, event.clone());
        Ok(())
    }

    async fn delete_events(&mut self, ids: &[EventId]) -> TicketingResult<u64> {
        let mut removed = 0;
        for id in ids {
            if let Some(prior) = self.tables.events.remove(id) {
                self.journal.push(Undo::Event(*id, Some(prior)));
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn take_tickets(
        &mut self,
        event_id: EventId,
        class_id: TicketClassId,
        quantity: u32,
    ) -> TicketingResult<bool> {
        if !self.tables.events.contains_key(&event_id) {
            return Ok(false);
        }
        self.touch_event(event_id);
        let Some(event) = self.tables.events.get_mut(&event_id) else {
            return Ok(false);
        };
        Ok(event.tickets.reserve(class_id, quantity).is_ok())
    }

    async fn restore_tickets(
        &mut self,
        event_id: EventId,
        class_id: TicketClassId,
        fallback: TicketType,
        quantity: u32,
    ) -> TicketingResult<Option<Release>> {
        if !self.tables.events.contains_key(&event_id) {
            return Ok(None);
        }
        self.touch_event(event_id);
        let Some(event) = self.tables.events.get_mut(&event_id) else {
            return Ok(None);
        };
        Ok(event.tickets.release(class_id, fallback, quantity))
    }

    async fn booking(&mut self, id: BookingId) -> TicketingResult<Option<Booking>> {
        Ok(self.tables.bookings.get(&id).cloned())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> TicketingResult<()> {
        if self.tables.bookings.contains_key(&booking.id) {
            return Err(DomainError::conflict(format!("booking {} already exists", booking.id)).into());
        }
        self.touch_booking(booking.id);
        upsert(&mut self.tables.bookings, booking.clone());
        Ok(())
    }

    async fn mark_cancelled(&mut self, id: BookingId, at: DateTime<Utc>) -> TicketingResult<bool> {
        if !self.tables.bookings.get(&id).is_some_and(Booking::is_confirmed) {
            return Ok(false);
        }
        self.touch_booking(id);
        let Some(booking) = self.tables.bookings.get_mut(&id) else {
            return Ok(false);
        };
        Ok(booking.cancel(at).is_ok())
    }

    async fn delete_bookings_for_event(&mut self, event_id: EventId) -> TicketingResult<u64> {
        let ids: Vec<BookingId> = self
            .tables
            .bookings
            .values()
            .filter(|b| b.event_id == event_id)
            .map(|b| b.id)
            .collect();
        for id in &ids {
            if let Some(prior) = self.tables.bookings.remove(id) {
                self.journal.push(Undo::Booking(*id, Some(prior)));
            }
        }
        Ok(ids.len() as u64)
    }

    async fn category(&mut self, id: CategoryId) -> TicketingResult<Option<Category>> {
        Ok(self.tables.categories.get(&id).cloned())
    }

    async fn category_by_name(&mut self, name: &str) -> TicketingResult<Option<Category>> {
        Ok(self.tables.category_named(name).cloned())
    }

    async fn insert_category(&mut self, category: &Category) -> TicketingResult<()> {
        if self.tables.category_named(&category.name).is_some() {
            return Err(DomainError::duplicate_name(category.name.clone()).into());
        }
        self.touch_category(category.id);
        upsert(&mut self.tables.categories, category.clone());
        Ok(())
    }

    async fn rename_category(&mut self, id: CategoryId, name: &str) -> TicketingResult<bool> {
        if self
            .tables
            .category_named(name)
            .is_some_and(|other| other.id != id)
        {
            return Err(DomainError::duplicate_name(name).into());
        }
        if !self.tables.categories.contains_key(&id) {
            return Ok(false);
        }
        let event_ids: Vec<EventId> = self
            .tables
            .events
            .values()
            .filter(|e| e.category_id == id)
            .map(|e| e.id)
            .collect();

        self.touch_category(id);
        for event_id in &event_ids {
            self.touch_event(*event_id);
        }

        let tables = &mut *self.tables;
        if let Some(category) = tables.categories.get_mut(&id) {
            category.name = name.to_string();
        }
        for event_id in &event_ids {
            if let Some(event) = tables.events.get_mut(event_id) {
                event.category_name = name.to_string();
            }
        }
        Ok(true)
    }

    async fn delete_category(&mut self, id: CategoryId) -> TicketingResult<bool> {
        match self.tables.categories.remove(&id) {
            Some(prior) => {
                self.journal.push(Undo::Category(id, Some(prior)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn event_ids_in_category(&mut self, category_id: CategoryId) -> TicketingResult<Vec<EventId>> {
        let mut ids: Vec<EventId> = self
            .tables
            .events
            .values()
            .filter(|e| e.category_id == category_id)
            .map(|e| e.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn commit(mut self) -> TicketingResult<()> {
        self.journal.clear();
        Ok(())
    }

    async fn rollback(self) -> TicketingResult<()> {
        Ok(())
    }
}

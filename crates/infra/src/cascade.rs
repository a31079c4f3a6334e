//! Multi-record deletions: event with its bookings, category with its events, and
//! the expiry sweep.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use horizon_core::{CategoryId, DomainError, EventId};

use crate::error::{TicketingError, TicketingResult};
use crate::store::{StoreUnit, TicketingStore, settle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventDeletion {
    pub event_id: EventId,
    pub bookings_removed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryDeletion {
    pub category_id: CategoryId,
    pub events_removed: u64,
    pub bookings_removed: u64,
}

/// One event the sweep could not remove.
#[derive(Debug)]
pub struct SweepFailure {
    pub event_id: EventId,
    pub error: TicketingError,
}

/// Outcome of one expiry sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub expired_found: usize,
    pub events_removed: u64,
    pub bookings_removed: u64,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Removes events, categories and their dependents without leaving orphans.
///
/// Bookings always go before their event, events before their category, all in
/// one store unit per deletion.
#[derive(Debug, Clone)]
pub struct CascadeDeletionCoordinator<S> {
    store: S,
}

impl<S: TicketingStore> CascadeDeletionCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Delete one event and every booking that references it.
    #[instrument(skip(self), fields(event_id = %event_id), err)]
    pub async fn delete_event(&self, event_id: EventId) -> TicketingResult<EventDeletion> {
        let mut unit = self.store.begin().await?;
        let result = remove_event(&mut unit, event_id).await;
        let bookings_removed = settle(unit, result).await?;

        info!(bookings_removed, "event deleted");
        Ok(EventDeletion {
            event_id,
            bookings_removed,
        })
    }

    /// Delete an empty category. Refuses while any event still references it.
    #[instrument(skip(self), fields(category_id = %category_id), err)]
    pub async fn delete_category(&self, category_id: CategoryId) -> TicketingResult<()> {
        let mut unit = self.store.begin().await?;
        let result = remove_empty_category(&mut unit, category_id).await;
        settle(unit, result).await?;

        info!("category deleted");
        Ok(())
    }

    /// Delete a category with all of its events and their bookings.
    #[instrument(skip(self), fields(category_id = %category_id), err)]
    pub async fn delete_category_with_cascade(
        &self,
        category_id: CategoryId,
    ) -> TicketingResult<CategoryDeletion> {
        let mut unit = self.store.begin().await?;
        let result = remove_category_tree(&mut unit, category_id).await;
        let deletion = settle(unit, result).await?;

        info!(
            events_removed = deletion.events_removed,
            bookings_removed = deletion.bookings_removed,
            "category deleted with cascade"
        );
        Ok(deletion)
    }

    /// Remove every event that ended before `now`, one unit per event.
    ///
    /// Only the initial listing can fail the whole call. Per-event failures are
    /// collected in the report and the sweep moves on.
    #[instrument(skip(self), err)]
    pub async fn delete_expired_events(&self, now: DateTime<Utc>) -> TicketingResult<SweepReport> {
        let expired = self.store.expired_events(now).await?;
        let mut report = SweepReport {
            expired_found: expired.len(),
            ..SweepReport::default()
        };

        for event in expired {
            match self.remove_expired(event.id).await {
                Ok(Some(bookings)) => {
                    report.events_removed += 1;
                    report.bookings_removed += bookings;
                }
                // Removed by someone else between the listing and our unit.
                Ok(None) => {}
                Err(error) => {
                    warn!(event_id = %event.id, error = %error, "expired event not removed");
                    report.failures.push(SweepFailure {
                        event_id: event.id,
                        error,
                    });
                }
            }
        }

        Ok(report)
    }

    async fn remove_expired(&self, event_id: EventId) -> TicketingResult<Option<u64>> {
        let mut unit = self.store.begin().await?;
        let result = match remove_event(&mut unit, event_id).await {
            Ok(bookings) => Ok(Some(bookings)),
            Err(TicketingError::Domain(DomainError::NotFound(_))) => Ok(None),
            Err(err) => Err(err),
        };
        settle(unit, result).await
    }
}

async fn remove_event<U: StoreUnit>(unit: &mut U, event_id: EventId) -> TicketingResult<u64> {
    if unit.event(event_id).await?.is_none() {
        return Err(DomainError::event_not_found().into());
    }
    let bookings_removed = unit.delete_bookings_for_event(event_id).await?;
    unit.delete_events(&[event_id]).await?;
    Ok(bookings_removed)
}

async fn remove_empty_category<U: StoreUnit>(
    unit: &mut U,
    category_id: CategoryId,
) -> TicketingResult<()> {
    if unit.category(category_id).await?.is_none() {
        return Err(DomainError::category_not_found().into());
    }
    let events = unit.event_ids_in_category(category_id).await?;
    if !events.is_empty() {
        return Err(DomainError::CategoryHasEvents(events.len() as u64).into());
    }
    unit.delete_category(category_id).await?;
    Ok(())
}

async fn remove_category_tree<U: StoreUnit>(
    unit: &mut U,
    category_id: CategoryId,
) -> TicketingResult<CategoryDeletion> {
    if unit.category(category_id).await?.is_none() {
        return Err(DomainError::category_not_found().into());
    }

    let event_ids = unit.event_ids_in_category(category_id).await?;
    let mut bookings_removed = 0;
    for event_id in &event_ids {
        bookings_removed += unit.delete_bookings_for_event(*event_id).await?;
    }
    let events_removed = unit.delete_events(&event_ids).await?;
    unit.delete_category(category_id).await?;

    Ok(CategoryDeletion {
        category_id,
        events_removed,
        bookings_removed,
    })
}

//! Booking creation and cancellation against the event inventory ledger.

use chrono::Utc;
use tracing::{Span, info, instrument, warn};

use horizon_core::{BookingId, DomainError, EventId, UserId};
use horizon_ticketing::{Booking, BookingReceipt, TicketType};

use crate::error::TicketingResult;
use crate::store::{StoreUnit, TicketingStore, settle};

/// Result of a successful cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationOutcome {
    pub booking: Booking,
    /// `false` when the owning event was already gone (orphaned booking) or the
    /// ticket class could not be found.
    pub inventory_restored: bool,
    pub available_after: Option<u32>,
}

/// Transactional booking service.
///
/// Every mutation runs inside a single store unit; a failure at any step leaves
/// both the booking table and the ledger untouched.
#[derive(Debug, Clone)]
pub struct BookingTransactionManager<S> {
    store: S,
}

impl<S: TicketingStore> BookingTransactionManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reserve `quantity` seats of `ticket_type` for `user_id`.
    #[instrument(
        skip(self),
        fields(event_id = %event_id, user_id = %user_id, booking_id = tracing::field::Empty),
        err
    )]
    pub async fn create_booking(
        &self,
        event_id: EventId,
        ticket_type: TicketType,
        quantity: u32,
        user_id: UserId,
    ) -> TicketingResult<BookingReceipt> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be greater than zero").into());
        }

        let mut unit = self.store.begin().await?;
        let result = reserve(&mut unit, event_id, ticket_type, quantity, user_id).await;
        let receipt = settle(unit, result).await?;

        Span::current().record("booking_id", tracing::field::display(receipt.booking_id));
        info!(
            transaction_id = %receipt.transaction_id,
            ticket_type = %ticket_type,
            quantity,
            total_paid = receipt.total_paid,
            "booking confirmed"
        );
        Ok(receipt)
    }

    /// Cancel a confirmed booking and hand its seats back to the ledger.
    #[instrument(skip(self), fields(booking_id = %booking_id), err)]
    pub async fn cancel_booking(&self, booking_id: BookingId) -> TicketingResult<CancellationOutcome> {
        let mut unit = self.store.begin().await?;
        let result = release(&mut unit, booking_id).await;
        let outcome = settle(unit, result).await?;

        info!(
            event_id = %outcome.booking.event_id,
            quantity = outcome.booking.quantity,
            inventory_restored = outcome.inventory_restored,
            "booking cancelled"
        );
        Ok(outcome)
    }

    /// Live booking by id. Cancelled bookings read as missing.
    pub async fn get_booking(&self, booking_id: BookingId) -> TicketingResult<Booking> {
        match self.store.booking(booking_id).await? {
            Some(booking) if booking.is_confirmed() => Ok(booking),
            _ => Err(DomainError::booking_not_found().into()),
        }
    }

    /// Booking by id in any status.
    pub async fn get_booking_record(&self, booking_id: BookingId) -> TicketingResult<Booking> {
        self.store
            .booking(booking_id)
            .await?
            .ok_or_else(|| DomainError::booking_not_found().into())
    }

    pub async fn bookings_for_user(&self, user_id: UserId) -> TicketingResult<Vec<Booking>> {
        self.store.bookings_for_user(user_id).await
    }

    pub async fn bookings_for_event(&self, event_id: EventId) -> TicketingResult<Vec<Booking>> {
        self.store.bookings_for_event(event_id).await
    }

    pub async fn all_bookings(&self) -> TicketingResult<Vec<Booking>> {
        self.store.all_bookings().await
    }

    /// Physically remove every booking of an event, any status.
    #[instrument(skip(self), fields(event_id = %event_id), err)]
    pub async fn delete_bookings_by_event(&self, event_id: EventId) -> TicketingResult<u64> {
        let mut unit = self.store.begin().await?;
        let result = unit.delete_bookings_for_event(event_id).await;
        settle(unit, result).await
    }
}

async fn reserve<U: StoreUnit>(
    unit: &mut U,
    event_id: EventId,
    ticket_type: TicketType,
    quantity: u32,
    user_id: UserId,
) -> TicketingResult<BookingReceipt> {
    let event = unit
        .event(event_id)
        .await?
        .ok_or_else(DomainError::event_not_found)?;

    let booking = Booking::confirm(user_id, &event, ticket_type, quantity, Utc::now())?;
    unit.insert_booking(&booking).await?;

    if !unit
        .take_tickets(event.id, booking.ticket_class_id, quantity)
        .await?
    {
        let available = event
            .tickets
            .by_id(booking.ticket_class_id)
            .map(|c| c.available_quantity())
            .unwrap_or(0);
        return Err(DomainError::InsufficientInventory {
            requested: quantity,
            available,
        }
        .into());
    }

    Ok(BookingReceipt::new(booking, event.name))
}

async fn release<U: StoreUnit>(
    unit: &mut U,
    booking_id: BookingId,
) -> TicketingResult<CancellationOutcome> {
    let mut booking = unit
        .booking(booking_id)
        .await?
        .ok_or_else(DomainError::booking_not_found)?;

    let now = Utc::now();
    booking.cancel(now)?;
    if !unit.mark_cancelled(booking_id, now).await? {
        return Err(DomainError::AlreadyCancelled.into());
    }

    if unit.event(booking.event_id).await?.is_none() {
        warn!(
            event_id = %booking.event_id,
            "cancelled booking has no event; inventory not restored"
        );
        return Ok(CancellationOutcome {
            booking,
            inventory_restored: false,
            available_after: None,
        });
    }

    let restored = unit
        .restore_tickets(
            booking.event_id,
            booking.ticket_class_id,
            booking.ticket_type,
            booking.quantity,
        )
        .await?;

    let Some(restored) = restored else {
        warn!(
            event_id = %booking.event_id,
            ticket_type = %booking.ticket_type,
            "ticket class missing on cancel; inventory not restored"
        );
        return Ok(CancellationOutcome {
            booking,
            inventory_restored: false,
            available_after: None,
        });
    };

    if restored.clamped {
        warn!(
            event_id = %booking.event_id,
            ticket_class_id = %booking.ticket_class_id,
            quantity = booking.quantity,
            available = restored.available,
            "ledger anomaly: restore clamped at total"
        );
    }

    Ok(CancellationOutcome {
        booking,
        inventory_restored: true,
        available_after: Some(restored.available),
    })
}

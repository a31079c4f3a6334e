use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use horizon_core::{
    BookingId, DomainError, DomainResult, Entity, EventId, TicketClassId, UserId,
};

use crate::event::Event;
use crate::ticket::TicketType;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown booking status '{other}'"
            ))),
        }
    }
}

/// A booking drawn against one ticket class of one event.
///
/// `total_paid` is fixed at confirmation. Cancellation is a status transition;
/// the record stays until its event is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub event_id: EventId,
    pub ticket_class_id: TicketClassId,
    pub ticket_type: TicketType,
    pub transaction_id: String,
    pub quantity: u32,
    pub total_paid: u64,
    pub status: BookingStatus,
    pub booked_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Price and validate a booking against the event's current ledger.
    ///
    /// This does not touch the ledger; the caller takes the seats atomically.
    pub fn confirm(
        user_id: UserId,
        event: &Event,
        ticket_type: TicketType,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        let class = event.tickets.by_type(ticket_type)?;
        class.ensure_available(quantity)?;
        let total_paid = class.price_for(quantity)?;

        Ok(Self {
            id: BookingId::new(),
            user_id,
            event_id: event.id,
            ticket_class_id: class.id(),
            ticket_type,
            transaction_id: new_transaction_id(),
            quantity,
            total_paid,
            status: BookingStatus::Confirmed,
            booked_at: now,
            cancelled_at: None,
        })
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// `confirmed -> cancelled`, at most once.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_confirmed() {
            return Err(DomainError::AlreadyCancelled);
        }
        self.status = BookingStatus::Cancelled;
        self.cancelled_at = Some(now);
        Ok(())
    }
}

impl Entity for Booking {
    type Id = BookingId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// `TXN-` followed by 32 lowercase hex characters.
pub fn new_transaction_id() -> String {
    format!("TXN-{}", Uuid::now_v7().simple())
}

/// What a caller gets back from a successful booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingReceipt {
    pub booking_id: BookingId,
    pub transaction_id: String,
    pub event_id: EventId,
    pub event_name: String,
    pub ticket_type: TicketType,
    pub quantity: u32,
    pub total_paid: u64,
    pub status: BookingStatus,
    pub booked_at: DateTime<Utc>,
    #[serde(skip)]
    pub booking: Booking,
}

impl BookingReceipt {
    pub fn new(booking: Booking, event_name: impl Into<String>) -> Self {
        Self {
            booking_id: booking.id,
            transaction_id: booking.transaction_id.clone(),
            event_id: booking.event_id,
            event_name: event_name.into(),
            ticket_type: booking.ticket_type,
            quantity: booking.quantity,
            total_paid: booking.total_paid,
            status: booking.status,
            booked_at: booking.booked_at,
            booking,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::event::EventDetails;
    use crate::ticket::NewTicketClass;
    use chrono::Duration;

    fn event(now: DateTime<Utc>) -> Event {
        let category = Category::new("Concerts", now).unwrap();
        Event::create(
            UserId::new(),
            &category,
            EventDetails {
                name: "Gala".to_string(),
                description: String::new(),
                location: "Main Hall".to_string(),
                image_url: String::new(),
                date: now.date_naive(),
                start_time: now + Duration::hours(1),
                end_time: now + Duration::hours(3),
                tickets: vec![NewTicketClass::new(TicketType::Vip, 100, 10)],
            },
            now,
        )
        .unwrap()
    }

    #[test]
    fn confirm_prices_flat_and_starts_confirmed() {
        let now = Utc::now();
        let event = event(now);
        let booking = Booking::confirm(UserId::new(), &event, TicketType::Vip, 3, now).unwrap();

        assert_eq!(booking.total_paid, 300);
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(
            booking.ticket_class_id,
            event.tickets.by_type(TicketType::Vip).unwrap().id()
        );
        assert!(booking.cancelled_at.is_none());
    }

    #[test]
    fn confirm_rejects_unknown_type_and_oversized_request() {
        let now = Utc::now();
        let event = event(now);
        assert_eq!(
            Booking::confirm(UserId::new(), &event, TicketType::Student, 1, now).unwrap_err(),
            DomainError::ticket_type_not_found()
        );
        assert!(matches!(
            Booking::confirm(UserId::new(), &event, TicketType::Vip, 11, now),
            Err(DomainError::InsufficientInventory { requested: 11, available: 10 })
        ));
        assert!(matches!(
            Booking::confirm(UserId::new(), &event, TicketType::Vip, 0, now),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn cancel_transitions_exactly_once() {
        let now = Utc::now();
        let mut booking = Booking::confirm(UserId::new(), &event(now), TicketType::Vip, 1, now).unwrap();
        booking.cancel(now).unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.cancelled_at, Some(now));
        assert_eq!(booking.cancel(now).unwrap_err(), DomainError::AlreadyCancelled);
    }

    #[test]
    fn transaction_ids_have_fixed_shape() {
        let id = new_transaction_id();
        let hex = id.strip_prefix("TXN-").unwrap();
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, new_transaction_id());
    }

    #[test]
    fn status_round_trips_through_its_label() {
        for status in [BookingStatus::Confirmed, BookingStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("refunded".parse::<BookingStatus>().is_err());
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use horizon_core::{CategoryId, DomainError, DomainResult, Entity, EventId, UserId};

use crate::category::Category;
use crate::ledger::InventoryLedger;
use crate::ticket::NewTicketClass;

/// Descriptive part of an event, shared by creation and full updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub location: String,
    #[serde(default)]
    pub image_url: String,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub tickets: Vec<NewTicketClass>,
}

impl EventDetails {
    fn validate(&self, today: NaiveDate) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("event name is required"));
        }
        if self.location.trim().is_empty() {
            return Err(DomainError::validation("event location is required"));
        }
        if self.end_time <= self.start_time {
            return Err(DomainError::validation("end time must be after start time"));
        }
        if self.date < today {
            return Err(DomainError::validation("event date cannot be in the past"));
        }
        Ok(())
    }
}

/// Input for creating an event. The category is referenced by id, or by name when
/// no id is given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    #[serde(flatten)]
    pub details: EventDetails,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub category_name: Option<String>,
}

/// An event with its embedded inventory ledger.
///
/// `category_name` is a denormalized copy of the category's display name; the
/// relationship itself is `category_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub host_id: UserId,
    pub category_id: CategoryId,
    pub category_name: String,
    pub name: String,
    pub description: String,
    pub location: String,
    pub image_url: String,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub tickets: InventoryLedger,
}

impl Event {
    pub fn create(
        host_id: UserId,
        category: &Category,
        details: EventDetails,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        details.validate(now.date_naive())?;
        let tickets = InventoryLedger::open(&details.tickets)?;

        Ok(Self {
            id: EventId::new(),
            host_id,
            category_id: category.id,
            category_name: category.name.clone(),
            name: details.name.trim().to_string(),
            description: details.description,
            location: details.location.trim().to_string(),
            image_url: details.image_url,
            date: details.date,
            start_time: details.start_time,
            end_time: details.end_time,
            created_at: now,
            tickets,
        })
    }

    /// Full replacement of the descriptive fields and ticket classes. Identity,
    /// host, category and sold seats are preserved.
    pub fn revise(&self, details: EventDetails, now: DateTime<Utc>) -> DomainResult<Self> {
        details.validate(now.date_naive())?;
        let tickets = self.tickets.revise(&details.tickets)?;

        Ok(Self {
            id: self.id,
            host_id: self.host_id,
            category_id: self.category_id,
            category_name: self.category_name.clone(),
            name: details.name.trim().to_string(),
            description: details.description,
            location: details.location.trim().to_string(),
            image_url: details.image_url,
            date: details.date,
            start_time: details.start_time,
            end_time: details.end_time,
            created_at: self.created_at,
            tickets,
        })
    }

    /// The window has elapsed strictly before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_time < now
    }

    pub fn is_hosted_by(&self, user_id: UserId) -> bool {
        self.host_id == user_id
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.trim().to_lowercase()
    }
}

impl Entity for Event {
    type Id = EventId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use horizon_core::{CategoryId, DomainError, DomainResult, Entity};

use crate::event::Event;

const MIN_NAME_CHARS: usize = 2;
const MAX_NAME_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: &str, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: CategoryId::new(),
            name: normalize_category_name(name)?,
            created_at: now,
        })
    }

    /// Case-insensitive exact match on the display name.
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.trim().to_lowercase()
    }

    pub fn rename(&mut self, name: &str) -> DomainResult<()> {
        self.name = normalize_category_name(name)?;
        Ok(())
    }
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Trim and length-check a category name.
pub fn normalize_category_name(raw: &str) -> DomainResult<String> {
    let name = raw.trim();
    let len = name.chars().count();
    if len < MIN_NAME_CHARS {
        return Err(DomainError::validation(format!(
            "category name must be at least {MIN_NAME_CHARS} characters"
        )));
    }
    if len > MAX_NAME_CHARS {
        return Err(DomainError::validation(format!(
            "category name must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

/// A category together with the events filed under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryWithEvents {
    #[serde(flatten)]
    pub category: Category,
    pub event_count: usize,
    pub events: Vec<Event>,
}

impl CategoryWithEvents {
    pub fn new(category: Category, events: Vec<Event>) -> Self {
        Self {
            category,
            event_count: events.len(),
            events,
        }
    }
}

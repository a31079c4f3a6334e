//! Categories and events: creation, lookup, rename and revision.

use chrono::Utc;
use tracing::{info, instrument};

use horizon_core::{CategoryId, DomainError, EventId, UserId};
use horizon_ticketing::{
    Category, CategoryWithEvents, Event, EventDetails, NewEvent, normalize_category_name,
};

use crate::error::TicketingResult;
use crate::store::{StoreUnit, TicketingStore, settle};

/// Catalog service over a [`TicketingStore`].
#[derive(Debug, Clone)]
pub struct EventCatalog<S> {
    store: S,
}

impl<S: TicketingStore> EventCatalog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self), err)]
    pub async fn create_category(&self, name: &str) -> TicketingResult<Category> {
        let category = Category::new(name, Utc::now())?;

        let mut unit = self.store.begin().await?;
        let result: TicketingResult<_> = async {
            if unit.category_by_name(&category.name).await?.is_some() {
                return Err(DomainError::duplicate_name(category.name.clone()).into());
            }
            unit.insert_category(&category).await
        }
        .await;
        settle(unit, result).await?;

        info!(category_id = %category.id, name = %category.name, "category created");
        Ok(category)
    }

    pub async fn list_categories(&self) -> TicketingResult<Vec<Category>> {
        self.store.categories().await
    }

    pub async fn get_category(&self, id: CategoryId) -> TicketingResult<Category> {
        self.store
            .category(id)
            .await?
            .ok_or_else(|| DomainError::category_not_found().into())
    }

    /// Case-insensitive exact match.
    pub async fn get_category_by_name(&self, name: &str) -> TicketingResult<Category> {
        self.store
            .category_by_name(name)
            .await?
            .ok_or_else(|| DomainError::category_not_found().into())
    }

    pub async fn categories_with_events(&self) -> TicketingResult<Vec<CategoryWithEvents>> {
        let categories = self.store.categories().await?;
        let mut out = Vec::with_capacity(categories.len());
        for category in categories {
            let events = self.store.events_in_category(category.id).await?;
            out.push(CategoryWithEvents::new(category, events));
        }
        Ok(out)
    }

    pub async fn category_with_events(&self, id: CategoryId) -> TicketingResult<CategoryWithEvents> {
        let category = self.get_category(id).await?;
        let events = self.store.events_in_category(id).await?;
        Ok(CategoryWithEvents::new(category, events))
    }

    /// Rename a category; its events pick up the new name in the same unit.
    #[instrument(skip(self), fields(category_id = %id), err)]
    pub async fn rename_category(&self, id: CategoryId, name: &str) -> TicketingResult<Category> {
        let name = normalize_category_name(name)?;

        let mut unit = self.store.begin().await?;
        let result: TicketingResult<_> = async {
            let mut category = unit
                .category(id)
                .await?
                .ok_or_else(DomainError::category_not_found)?;
            if unit
                .category_by_name(&name)
                .await?
                .is_some_and(|other| other.id != id)
            {
                return Err(DomainError::duplicate_name(name.clone()).into());
            }
            category.rename(&name)?;
            unit.rename_category(id, &category.name).await?;
            Ok(category)
        }
        .await;
        let category = settle(unit, result).await?;

        info!(name = %category.name, "category renamed");
        Ok(category)
    }

    /// Create an event for `host_id`. Every ticket class opens fully available.
    #[instrument(skip(self, new_event), fields(host_id = %host_id, event_id = tracing::field::Empty), err)]
    pub async fn create_event(&self, host_id: UserId, new_event: NewEvent) -> TicketingResult<Event> {
        let NewEvent {
            details,
            category_id,
            category_name,
        } = new_event;

        let mut unit = self.store.begin().await?;
        let result: TicketingResult<_> = async {
            let category = match (category_id, category_name.as_deref()) {
                (Some(id), _) => unit.category(id).await?,
                (None, Some(name)) => unit.category_by_name(name).await?,
                (None, None) => {
                    return Err(DomainError::validation("category id or name is required").into());
                }
            }
            .ok_or_else(DomainError::category_not_found)?;

            let event = Event::create(host_id, &category, details, Utc::now())?;
            if unit.event_by_name(&event.name).await?.is_some() {
                return Err(DomainError::duplicate_name(event.name.clone()).into());
            }
            unit.insert_event(&event).await?;
            Ok(event)
        }
        .await;
        let event = settle(unit, result).await?;

        tracing::Span::current().record("event_id", tracing::field::display(event.id));
        info!(name = %event.name, category = %event.category_name, "event created");
        Ok(event)
    }

    pub async fn list_events(&self) -> TicketingResult<Vec<Event>> {
        self.store.events().await
    }

    pub async fn get_event(&self, id: EventId) -> TicketingResult<Event> {
        self.store
            .event(id)
            .await?
            .ok_or_else(|| DomainError::event_not_found().into())
    }

    pub async fn events_in_category(&self, id: CategoryId) -> TicketingResult<Vec<Event>> {
        self.get_category(id).await?;
        self.store.events_in_category(id).await
    }

    pub async fn events_in_category_named(&self, name: &str) -> TicketingResult<Vec<Event>> {
        let category = self.get_category_by_name(name).await?;
        self.store.events_in_category(category.id).await
    }

    /// Replace an event's descriptive fields and ticket classes. Sold seats stay
    /// sold; ownership is checked by the caller.
    #[instrument(skip(self, details), fields(event_id = %event_id), err)]
    pub async fn update_event(&self, event_id: EventId, details: EventDetails) -> TicketingResult<Event> {
        let mut unit = self.store.begin().await?;
        let result: TicketingResult<_> = async {
            let current = unit
                .event(event_id)
                .await?
                .ok_or_else(DomainError::event_not_found)?;
            let revised = current.revise(details, Utc::now())?;
            if unit
                .event_by_name(&revised.name)
                .await?
                .is_some_and(|other| other.id != event_id)
            {
                return Err(DomainError::duplicate_name(revised.name.clone()).into());
            }
            unit.replace_event(&revised).await?;
            Ok(revised)
        }
        .await;
        let event = settle(unit, result).await?;

        info!("event updated");
        Ok(event)
    }
}

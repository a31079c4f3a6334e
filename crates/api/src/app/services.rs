use std::sync::Arc;

use horizon_infra::store::TicketingStore;
use horizon_infra::{BookingTransactionManager, CascadeDeletionCoordinator, EventCatalog};

/// Services shared by every handler. All of them work over the same store.
#[derive(Debug)]
pub struct AppServices<S> {
    pub bookings: BookingTransactionManager<S>,
    pub cascade: Arc<CascadeDeletionCoordinator<S>>,
    pub catalog: EventCatalog<S>,
}

impl<S> AppServices<S>
where
    S: TicketingStore + Clone,
{
    pub fn new(store: S) -> Self {
        Self {
            bookings: BookingTransactionManager::new(store.clone()),
            cascade: Arc::new(CascadeDeletionCoordinator::new(store.clone())),
            catalog: EventCatalog::new(store),
        }
    }
}

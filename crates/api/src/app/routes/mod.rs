use axum::Router;

use horizon_infra::store::TicketingStore;

pub mod bookings;
pub mod categories;
pub mod events;
pub mod system;

/// Router for everything under `/api`. Each handler decides whether it needs a
/// caller identity.
pub fn router<S>() -> Router
where
    S: TicketingStore + Clone + 'static,
{
    Router::new()
        .nest("/bookings", bookings::router::<S>())
        .nest("/events", events::router::<S>())
        .nest("/categories", categories::router::<S>())
}

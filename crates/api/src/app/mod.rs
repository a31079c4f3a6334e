//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: the transactional services shared by all handlers
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request DTOs and parsing helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use horizon_auth::AuthGateway;
use horizon_infra::store::TicketingStore;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app<S>(services: Arc<AppServices<S>>, gateway: Arc<dyn AuthGateway>) -> Router
where
    S: TicketingStore + Clone + 'static,
{
    let auth_state = middleware::AuthState { gateway };

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api", routes::router::<S>())
        .layer(
            ServiceBuilder::new()
                .layer(Extension(services))
                .layer(axum::middleware::from_fn_with_state(
                    auth_state,
                    middleware::auth_middleware,
                )),
        )
}

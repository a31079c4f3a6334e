use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use horizon_core::EventId;
use horizon_infra::store::TicketingStore;
use horizon_ticketing::{Event, EventDetails, NewEvent};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::RequestIdentity;

pub fn router<S>() -> Router
where
    S: TicketingStore + Clone + 'static,
{
    Router::new()
        .route("/", get(list_events::<S>).post(create_event::<S>))
        .route(
            "/:id",
            get(get_event::<S>)
                .put(update_event::<S>)
                .delete(delete_event::<S>),
        )
}

pub async fn list_events<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    match services.catalog.list_events().await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

pub async fn get_event<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    let event_id: EventId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.catalog.get_event(event_id).await {
        Ok(event) => (StatusCode::OK, Json(event)).into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

pub async fn create_event<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    identity: RequestIdentity,
    Json(body): Json<NewEvent>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    if let Err(resp) = identity.require_host() {
        return resp;
    }
    match services.catalog.create_event(identity.user_id(), body).await {
        Ok(event) => (StatusCode::CREATED, Json(event)).into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

pub async fn update_event<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    identity: RequestIdentity,
    Path(id): Path<String>,
    Json(body): Json<EventDetails>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    let event = match owned_event(&services, &identity, &id).await {
        Ok(event) => event,
        Err(resp) => return resp,
    };
    match services.catalog.update_event(event.id, body).await {
        Ok(event) => (StatusCode::OK, Json(event)).into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

pub async fn delete_event<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    identity: RequestIdentity,
    Path(id): Path<String>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    let event = match owned_event(&services, &identity, &id).await {
        Ok(event) => event,
        Err(resp) => return resp,
    };
    match services.cascade.delete_event(event.id).await {
        Ok(deletion) => (StatusCode::OK, Json(deletion)).into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

/// Load an event the caller hosts; `403` for anyone else.
async fn owned_event<S>(
    services: &AppServices<S>,
    identity: &RequestIdentity,
    raw_id: &str,
) -> Result<Event, axum::response::Response>
where
    S: TicketingStore + Clone + 'static,
{
    identity.require_host()?;
    let event_id: EventId = dto::parse_id(raw_id)?;
    let event = services
        .catalog
        .get_event(event_id)
        .await
        .map_err(errors::ticketing_error_to_response)?;
    if !event.is_hosted_by(identity.user_id()) {
        return Err(errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "event is hosted by another user",
        ));
    }
    Ok(event)
}

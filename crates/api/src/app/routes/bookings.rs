use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use horizon_core::{BookingId, EventId};
use horizon_infra::store::TicketingStore;
use horizon_ticketing::TicketType;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::RequestIdentity;

pub fn router<S>() -> Router
where
    S: TicketingStore + Clone + 'static,
{
    Router::new()
        .route("/", post(create_booking::<S>))
        .route("/user", get(user_bookings::<S>))
        .route("/all", get(all_bookings::<S>))
        .route("/:id", get(get_booking::<S>))
        .route("/:id/cancel", put(cancel_booking::<S>))
}

pub async fn create_booking<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    identity: RequestIdentity,
    Json(body): Json<dto::CreateBookingRequest>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    let event_id: EventId = match dto::parse_id(&body.event_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let ticket_type: TicketType = match body.ticket_type.parse() {
        Ok(t) => t,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let quantity = match dto::parse_quantity(body.quantity) {
        Ok(q) => q,
        Err(resp) => return resp,
    };

    match services
        .bookings
        .create_booking(event_id, ticket_type, quantity, identity.user_id())
        .await
    {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

pub async fn user_bookings<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    identity: RequestIdentity,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    match services.bookings.bookings_for_user(identity.user_id()).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

pub async fn all_bookings<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    identity: RequestIdentity,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    if let Err(resp) = identity.require_host() {
        return resp;
    }
    match services.bookings.all_bookings().await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

pub async fn get_booking<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    identity: RequestIdentity,
    Path(id): Path<String>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    let booking_id: BookingId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let booking = match services.bookings.get_booking(booking_id).await {
        Ok(b) => b,
        Err(e) => return errors::ticketing_error_to_response(e),
    };
    if !booking.is_owned_by(identity.user_id()) && !identity.is_host() {
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "booking belongs to another user",
        );
    }

    (StatusCode::OK, Json(booking)).into_response()
}

pub async fn cancel_booking<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    identity: RequestIdentity,
    Path(id): Path<String>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    let booking_id: BookingId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let record = match services.bookings.get_booking_record(booking_id).await {
        Ok(b) => b,
        Err(e) => return errors::ticketing_error_to_response(e),
    };
    if !record.is_owned_by(identity.user_id()) {
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "only the booking owner may cancel it",
        );
    }

    match services.bookings.cancel_booking(booking_id).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "booking cancelled",
                "booking": outcome.booking,
                "inventory_restored": outcome.inventory_restored,
            })),
        )
            .into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

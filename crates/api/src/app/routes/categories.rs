use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use horizon_core::CategoryId;
use horizon_infra::store::TicketingStore;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::RequestIdentity;

pub fn router<S>() -> Router
where
    S: TicketingStore + Clone + 'static,
{
    Router::new()
        .route("/", get(list_categories::<S>).post(create_category::<S>))
        .route("/with-events", get(categories_with_events::<S>))
        .route(
            "/:id",
            get(get_category::<S>)
                .put(rename_category::<S>)
                .delete(delete_category::<S>),
        )
        .route("/:id/events", get(category_events::<S>))
        .route("/name/:name/events", get(category_events_by_name::<S>))
}

pub async fn list_categories<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    match services.catalog.list_categories().await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

pub async fn categories_with_events<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    match services.catalog.categories_with_events().await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

pub async fn get_category<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    let category_id: CategoryId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.catalog.category_with_events(category_id).await {
        Ok(category) => (StatusCode::OK, Json(category)).into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

pub async fn category_events<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    let category_id: CategoryId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.catalog.events_in_category(category_id).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

pub async fn category_events_by_name<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(name): Path<String>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    match services.catalog.events_in_category_named(&name).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

pub async fn create_category<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    identity: RequestIdentity,
    Json(body): Json<dto::CreateCategoryRequest>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    if let Err(resp) = identity.require_host() {
        return resp;
    }
    match services.catalog.create_category(&body.name).await {
        Ok(category) => (StatusCode::CREATED, Json(category)).into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

pub async fn rename_category<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    identity: RequestIdentity,
    Path(id): Path<String>,
    Json(body): Json<dto::RenameCategoryRequest>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    if let Err(resp) = identity.require_host() {
        return resp;
    }
    let category_id: CategoryId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.catalog.rename_category(category_id, &body.name).await {
        Ok(category) => (StatusCode::OK, Json(category)).into_response(),
        Err(e) => errors::ticketing_error_to_response(e),
    }
}

pub async fn delete_category<S>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    identity: RequestIdentity,
    Path(id): Path<String>,
    Query(query): Query<dto::DeleteCategoryQuery>,
) -> axum::response::Response
where
    S: TicketingStore + Clone + 'static,
{
    if let Err(resp) = identity.require_host() {
        return resp;
    }
    let category_id: CategoryId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if query.cascade.unwrap_or(false) {
        match services.cascade.delete_category_with_cascade(category_id).await {
            Ok(deletion) => (StatusCode::OK, Json(deletion)).into_response(),
            Err(e) => errors::ticketing_error_to_response(e),
        }
    } else {
        match services.cascade.delete_category(category_id).await {
            Ok(()) => (
                StatusCode::OK,
                Json(serde_json::json!({
                    "category_id": category_id,
                    "events_removed": 0,
                    "bookings_removed": 0,
                })),
            )
                .into_response(),
            Err(e) => errors::ticketing_error_to_response(e),
        }
    }
}

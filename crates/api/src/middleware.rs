use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::debug;

use horizon_auth::AuthGateway;

use crate::app::errors::json_error;
use crate::context::RequestIdentity;

#[derive(Clone)]
pub struct AuthState {
    pub gateway: Arc<dyn AuthGateway>,
}

/// Resolve the bearer token, when present, into a [`RequestIdentity`].
///
/// Requests without an `Authorization` header pass through anonymously; routes
/// that need a caller extract `RequestIdentity` and reject them. A header that is
/// present but invalid is rejected here.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let Some(token) = extract_bearer(req.headers())? else {
        return Ok(next.run(req).await);
    };

    let identity = state.gateway.authenticate(token, Utc::now()).map_err(|e| {
        debug!(error = %e, "bearer token rejected");
        json_error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid or expired token")
    })?;

    req.extensions_mut().insert(RequestIdentity::new(identity));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, Response> {
    let Some(header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let unauthorized = || {
        json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "malformed authorization header",
        )
    };

    let header = header.to_str().map_err(|_| unauthorized())?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(unauthorized)?
        .trim();
    if token.is_empty() {
        return Err(unauthorized());
    }

    Ok(Some(token))
}

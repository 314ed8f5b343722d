use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::routes::AppState;

/// Lets the request through only with `Authorization: Bearer <secret>`.
/// Without a configured secret every request is rejected.
pub async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(secret) = state.auth_secret.as_deref().filter(|s| !s.is_empty()) else {
        info!("admin route called but no AUTH_SECRET is configured");
        return ApiError::Unauthorized.into_response();
    };

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.as_bytes().strip_prefix(b"Bearer "));

    if token == Some(secret.as_bytes()) {
        debug!("admin authentication succeeded");
        return next.run(request).await;
    }

    info!("admin authentication failed: token mismatch or missing Authorization header");
    ApiError::Unauthorized.into_response()
}

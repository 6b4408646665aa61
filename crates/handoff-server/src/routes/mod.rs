pub mod chat;
pub mod health;
pub mod metrics;
pub mod sessions;
pub mod tickets;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};

use crate::state::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/chat", chat::router())
        .nest("/sessions", sessions::router())
        .nest("/tickets", tickets::router())
        .nest("/metrics", metrics::router())
        .nest("/health", health::router())
}

/// JSON error body `{"error": ...}` with extra fields merged in.
pub(crate) fn error_response(
    status: StatusCode,
    message: impl Into<String>,
    extra: Option<serde_json::Value>,
) -> Response {
    let mut body = serde_json::json!({ "error": message.into() });
    if let (Some(serde_json::Value::Object(extra)), Some(obj)) = (extra, body.as_object_mut()) {
        obj.extend(extra);
    }
    (status, Json(body)).into_response()
}

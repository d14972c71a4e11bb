//! Fixed responses produced by the gate itself.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// 429 with body `{"detail": "Too Many Requests"}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThrottledResponse;

impl IntoResponse for ThrottledResponse {
    fn into_response(self) -> Response {
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "detail": "Too Many Requests" })),
        )
            .into_response()
    }
}

/// 503 returned under a fail-closed policy when the store is down.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreUnavailableResponse;

impl IntoResponse for StoreUnavailableResponse {
    fn into_response(self) -> Response {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "detail": "Service Unavailable" })),
        )
            .into_response()
    }
}

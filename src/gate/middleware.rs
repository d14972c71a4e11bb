//! axum middleware wiring for the gate.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use super::service::Gate;

/// Middleware function for `axum::middleware::from_fn_with_state`.
///
/// WebSocket upgrades are not plain HTTP requests and pass through without
/// being counted.
pub async fn throttle(State(gate): State<Arc<Gate>>, request: Request, next: Next) -> Response {
    if is_websocket_upgrade(&request) {
        return next.run(request).await;
    }

    gate.handle(request, |request| next.run(request)).await
}

fn is_websocket_upgrade(request: &Request) -> bool {
    request
        .headers()
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

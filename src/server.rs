//! HTTP server hosting an application behind the gate.

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{FloodgateConfig, StoreBackend};
use crate::error::{FloodgateError, Result};
use crate::gate::{throttle, Gate};
use crate::ratelimit::RateLimiter;
use crate::store::{MemoryStore, RedisStore};

/// Build the gate described by `config`, connecting to its counter store.
pub async fn gate_from_config(config: &FloodgateConfig) -> Result<Gate> {
    let settings = &config.rate_limiting;
    let rules = settings.rules()?;

    let limiter = match config.store.backend {
        StoreBackend::Redis => {
            let store = RedisStore::connect(&config.store.redis()).await?;
            RateLimiter::new(Arc::new(store), settings.enforcement)
        }
        StoreBackend::Memory => {
            RateLimiter::new(Arc::new(MemoryStore::new()), settings.enforcement)
        }
    }
    .with_key_prefix(settings.key_prefix.clone());

    Ok(Gate::new(limiter, rules, settings.failure_policy))
}

/// Small application used when running the binary on its own.
pub fn demo_app() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
}

async fn index() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn health() -> &'static str {
    "OK"
}

/// Wrap `app` so every request passes through `gate` first.
pub fn protect(app: Router, gate: Arc<Gate>) -> Router {
    app.layer(from_fn_with_state(gate, throttle))
        .layer(TraceLayer::new_for_http())
}

/// HTTP server for a gated application.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    router: Router,
}

impl HttpServer {
    /// Create a server that serves `app` behind `gate`.
    pub fn new(addr: SocketAddr, gate: Arc<Gate>, app: Router) -> Self {
        Self {
            addr,
            router: protect(app, gate),
        }
    }

    /// Serve until `signal` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server with graceful shutdown");

        // Peer addresses reach the gate through ConnectInfo.
        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            FloodgateError::Io(e)
        })
    }
}

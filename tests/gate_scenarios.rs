//! End-to-end request scenarios through the gate, backed by the in-process
//! store with a manual clock standing in for store-side expiry.

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use floodgate::clock::ManualClock;
use floodgate::gate::{default_rules, FailurePolicy, Gate, IdentityExtractor};
use floodgate::ratelimit::{Enforcement, Policy, RateLimiter};
use floodgate::server::{demo_app, protect};
use floodgate::store::{CounterStore, MemoryStore};

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    clock: ManualClock,
}

fn harness(limit: u64, window_secs: u64, enforcement: Enforcement) -> Harness {
    let clock = ManualClock::new();
    let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
    let limiter = RateLimiter::new(store.clone(), enforcement);
    let rules = default_rules(
        &IdentityExtractor::default(),
        Policy::per_seconds(limit, window_secs).unwrap(),
    );
    let gate = Arc::new(Gate::new(limiter, rules, FailurePolicy::Closed));

    Harness {
        app: protect(demo_app(), gate),
        store,
        clock,
    }
}

impl Harness {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }
}

fn from_address(address: &str) -> Request<Body> {
    Request::builder()
        .uri("/")
        .header("x-forwarded-for", address)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_sequential_burst_and_window_reset() {
    for enforcement in [Enforcement::Approximate, Enforcement::Strict] {
        let h = harness(2, 60, enforcement);

        let (status, _) = h.send(from_address("1.2.3.4")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.store.get("1.2.3.4").await.unwrap(), Some(1));

        h.clock.advance(Duration::from_secs(2));
        let (status, _) = h.send(from_address("1.2.3.4")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.store.get("1.2.3.4").await.unwrap(), Some(2));

        h.clock.advance(Duration::from_secs(3));
        let (status, body) = h.send(from_address("1.2.3.4")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body, json!({ "detail": "Too Many Requests" }));
        assert_eq!(h.store.get("1.2.3.4").await.unwrap(), Some(2));

        // 61 seconds after the first request
        h.clock.advance(Duration::from_secs(56));
        let (status, _) = h.send(from_address("1.2.3.4")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.store.get("1.2.3.4").await.unwrap(), Some(1));
    }
}

#[tokio::test]
async fn test_repeated_denials_do_not_move_counter() {
    let h = harness(3, 60, Enforcement::Approximate);

    for _ in 0..3 {
        h.send(from_address("5.6.7.8")).await;
    }
    for _ in 0..10 {
        let (status, _) = h.send(from_address("5.6.7.8")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    assert_eq!(h.store.get("5.6.7.8").await.unwrap(), Some(3));
    assert_eq!(
        h.store.ttl("5.6.7.8").await.unwrap(),
        Some(Duration::from_secs(60))
    );
}

#[tokio::test]
async fn test_address_denial_never_touches_token_counter() {
    let h = harness(1, 60, Enforcement::Approximate);

    h.send(from_address("9.9.9.9")).await;

    let request = Request::builder()
        .uri("/")
        .header("x-forwarded-for", "9.9.9.9")
        .header("authorization", "Bearer under-limit")
        .body(Body::empty())
        .unwrap();
    let (status, _) = h.send(request).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(h.store.get("Bearer under-limit").await.unwrap(), None);
}

#[tokio::test]
async fn test_request_without_identity_always_forwarded() {
    let h = harness(1, 60, Enforcement::Strict);

    for _ in 0..10 {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, body) = h.send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_peer_address_used_without_forwarded_header() {
    let h = harness(1, 60, Enforcement::Approximate);
    let peer: SocketAddr = "203.0.113.9:40000".parse().unwrap();

    let request = || {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    };

    let (status, _) = h.send(request()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = h.send(request()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(h.store.get("203.0.113.9").await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_token_shared_across_addresses() {
    let h = harness(2, 60, Enforcement::Approximate);

    for (address, expected) in [
        ("10.0.0.1", StatusCode::OK),
        ("10.0.0.2", StatusCode::OK),
        ("10.0.0.3", StatusCode::TOO_MANY_REQUESTS),
    ] {
        let request = Request::builder()
            .uri("/")
            .header("x-forwarded-for", address)
            .header("authorization", "Bearer shared")
            .body(Body::empty())
            .unwrap();
        let (status, _) = h.send(request).await;
        assert_eq!(status, expected, "request from {}", address);
    }
}

#[tokio::test]
async fn test_strict_gate_admits_exactly_limit_under_concurrency() {
    let h = harness(5, 60, Enforcement::Strict);

    let requests = (0..40).map(|_| {
        let app = h.app.clone();
        async move { app.oneshot(from_address("198.51.100.1")).await.unwrap().status() }
    });
    let statuses = futures::future::join_all(requests).await;

    let admitted = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    assert_eq!(admitted, 5);
    assert_eq!(h.store.get("198.51.100.1").await.unwrap(), Some(5));
}

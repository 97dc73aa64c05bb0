//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use request_shield::config::{CorsConfig, ShieldConfig};
use request_shield::security::signature::sign;
use request_shield::{ManualClock, ShieldServer, Shutdown};

pub const SECRET: &str = "integration-secret";
pub const NOW: u64 = 1_700_000_000;
pub const ORIGIN: &str = "https://app.example.com";

/// Defaults with a known secret, origin and a small chat quota.
pub fn test_config() -> ShieldConfig {
    let mut config = ShieldConfig::default();
    config.signature.secret = SECRET.to_string();
    config.rate_limit.chat_max_requests = 3;
    config.cors = CorsConfig {
        allowed_origins: vec![ORIGIN.to_string()],
        ..CorsConfig::default()
    };
    config
}

/// Server driven by a manual clock starting at [`NOW`].
pub fn test_server(config: ShieldConfig) -> (ShieldServer, Arc<ManualClock>) {
    let clock = ManualClock::shared(Duration::from_secs(NOW));
    let server = ShieldServer::with_clock(config, clock.clone()).unwrap();
    (server, clock)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Drive `req` through `router` in-process.
pub async fn send(router: &Router, req: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse { status, headers, body }
}

pub fn get(uri: &str, client: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("x-forwarded-for", client)
        .body(Body::empty())
        .unwrap()
}

pub fn json_post(uri: &str, client: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("x-forwarded-for", client)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn signed_post(uri: &str, client: &str, body: &str, timestamp: u64) -> Request<Body> {
    let signature = sign(SECRET, timestamp as i64, body.as_bytes());
    let mut req = json_post(uri, client, body);
    let headers = req.headers_mut();
    headers.insert("x-request-timestamp", timestamp.into());
    headers.insert("x-request-signature", signature.parse().unwrap());
    req
}

pub fn preflight(uri: &str, origin: &str) -> Request<Body> {
    Request::builder()
        .method(Method::OPTIONS)
        .uri(uri)
        .header("origin", origin)
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap()
}

/// Serve `server` on an ephemeral localhost port.
pub async fn start_server(server: ShieldServer) -> (SocketAddr, Shutdown, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let signalled = shutdown.signalled();

    let handle = tokio::spawn(async move {
        server.serve(listener, signalled).await.unwrap();
    });

    (addr, shutdown, handle)
}

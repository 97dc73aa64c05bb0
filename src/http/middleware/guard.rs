//! Request guard middleware.
//!
//! One [`RequestGuard`] is shared by every protected route; each route gets
//! its own [`RequestGuardLayer`] carrying that route's [`EndpointPolicy`].
//!
//! # Request Flow
//! ```text
//! RECEIVED
//!     → OPTIONS?           204 + origin headers, nothing else runs
//!     → CHECK_BLOCK        429 + Retry-After, no quota charged
//!     → CHECK_QUOTA        429 + Retry-After + X-RateLimit-*
//!     → CHECK_CONTENT_TYPE 415 (POST/PUT/PATCH without JSON)
//!     → buffer body        413 (max_body_size)
//!     → CHECK_SIGNATURE    401 (policy.require_signature only)
//!     → DISPATCH           handler called once; error or panic → 500, too slow → 408
//!     → RESPONDED          accumulated headers merged onto the response
//! ```

use std::convert::Infallible;
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request},
    response::Response,
};
use futures_util::future::{BoxFuture, FutureExt};
use tower::{Layer, Service, ServiceExt};

use crate::clock::SharedClock;
use crate::config::{RoutePolicyConfig, ShieldConfig};
use crate::error::{ErrorClass, ShieldError};
use crate::http::request::{carries_body, client_key, header_str, is_json_content_type};
use crate::http::response::{apply_headers, insert_rate_limit_headers, preflight, rejection};
use crate::observability::metrics;
use crate::security::headers::{X_REQUEST_SIGNATURE, X_REQUEST_TIMESTAMP};
use crate::security::limits::buffer_body;
use crate::security::{OriginGate, RateLimiter, SignatureValidator};

/// Immutable per-route protection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointPolicy {
    pub max_requests: u32,
    pub window: Duration,
    pub require_signature: bool,
}

impl EndpointPolicy {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            require_signature: false,
        }
    }

    pub fn signed(mut self) -> Self {
        self.require_signature = true;
        self
    }

    /// Apply a config override on top of this policy.
    pub fn with_override(mut self, route: Option<&RoutePolicyConfig>) -> Self {
        if let Some(route) = route {
            if let Some(max) = route.max_requests {
                self.max_requests = max;
            }
            if let Some(window) = route.window_secs {
                self.window = Duration::from_secs(window);
            }
            if let Some(signed) = route.require_signature {
                self.require_signature = signed;
            }
        }
        self
    }
}

/// Shared state behind every guarded route.
pub struct RequestGuard {
    limiter: Arc<RateLimiter>,
    origins: OriginGate,
    signatures: SignatureValidator,
    clock: SharedClock,
    max_body_size: usize,
    handler_timeout: Duration,
}

/// Handler deadline unless configured otherwise.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

impl RequestGuard {
    pub fn new(
        limiter: Arc<RateLimiter>,
        origins: OriginGate,
        signatures: SignatureValidator,
        clock: SharedClock,
        max_body_size: usize,
    ) -> Self {
        Self {
            limiter,
            origins,
            signatures,
            clock,
            max_body_size,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Deadline for the handler. Gate work does not count against it.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Build a guard from config around an existing limiter.
    pub fn from_config(
        config: &ShieldConfig,
        limiter: Arc<RateLimiter>,
        clock: SharedClock,
    ) -> Result<Self, crate::config::ConfigError> {
        let origins = OriginGate::from_config(&config.cors)?;
        let signatures = SignatureValidator::new(
            &config.signature.secret,
            Duration::from_secs(config.signature.max_skew_secs),
            clock.clone(),
        );
        Ok(Self::new(limiter, origins, signatures, clock, config.security.max_body_size)
            .with_handler_timeout(Duration::from_secs(config.timeouts.request_secs)))
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Layer protecting `route` with `policy`.
    pub fn layer(self: &Arc<Self>, route: &str, policy: EndpointPolicy) -> RequestGuardLayer {
        RequestGuardLayer {
            guard: Arc::clone(self),
            route: Arc::from(route),
            policy,
        }
    }

    /// Run `req` through every gate and, if admitted, through `handler`.
    pub async fn handle<S>(&self, route: &str, policy: EndpointPolicy, req: Request<Body>, handler: S) -> Response
    where
        S: Service<Request<Body>, Response = Response> + Send + 'static,
        S::Error: Display,
        S::Future: Send,
    {
        let start = Instant::now();
        let response = self.run_gates(route, policy, req, handler).await;
        metrics::record_request(route, response.status().as_u16(), start);
        response
    }

    async fn run_gates<S>(&self, route: &str, policy: EndpointPolicy, req: Request<Body>, handler: S) -> Response
    where
        S: Service<Request<Body>, Response = Response> + Send + 'static,
        S::Error: Display,
        S::Future: Send,
    {
        let mut headers = self.origins.compute_headers(header_str(req.headers(), &header::ORIGIN));

        if req.method() == Method::OPTIONS {
            tracing::debug!(route, "Answering preflight");
            return preflight(headers);
        }

        let key = client_key(&req);

        if self.limiter.is_blocked(&key) {
            let retry_after = self.limiter.retry_after(&key, policy.window);
            return self.reject(route, &key, ShieldError::Blocked { retry_after }, headers);
        }

        let quota = self.limiter.check_quota(&key, policy.max_requests, policy.window);
        insert_rate_limit_headers(
            &mut headers,
            policy.max_requests,
            quota.remaining,
            self.clock.now_secs() + policy.window.as_secs(),
        );

        if !quota.allowed {
            let retry_after = self.limiter.retry_after(&key, policy.window);
            return self.reject(route, &key, ShieldError::RateLimited { retry_after }, headers);
        }

        let (parts, body) = req.into_parts();

        if carries_body(&parts.method) && !is_json_content_type(&parts.headers) {
            return self.reject(route, &key, ShieldError::UnsupportedMediaType, headers);
        }

        let bytes = match buffer_body(&parts.headers, body, self.max_body_size).await {
            Ok(bytes) => bytes,
            Err(e) => return self.reject(route, &key, e, headers),
        };

        if policy.require_signature {
            let verdict = self.signatures.validate(
                header_str(&parts.headers, &X_REQUEST_SIGNATURE),
                header_str(&parts.headers, &X_REQUEST_TIMESTAMP),
                &bytes,
            );
            if let Err(e) = verdict {
                return self.reject(route, &key, e.into(), headers);
            }
        }

        let req = Request::from_parts(parts, Body::from(bytes));
        let dispatch = AssertUnwindSafe(handler.oneshot(req)).catch_unwind();
        let outcome = tokio::time::timeout(self.handler_timeout, dispatch).await;

        match outcome {
            Ok(Ok(Ok(mut response))) => {
                apply_headers(&mut response, headers);
                response
            }
            Ok(Ok(Err(e))) => self.reject(route, &key, ShieldError::Internal(e.to_string()), headers),
            Ok(Err(panic)) => {
                let detail = panic_message(panic.as_ref());
                self.reject(route, &key, ShieldError::Internal(detail), headers)
            }
            Err(_) => self.reject(route, &key, ShieldError::Timeout(self.handler_timeout), headers),
        }
    }

    fn reject(&self, route: &str, key: &str, err: ShieldError, headers: HeaderMap) -> Response {
        match err.class() {
            ErrorClass::Internal => {
                tracing::error!(route, client = %key, error = %err, "Handler failed")
            }
            ErrorClass::Quota => {
                tracing::warn!(route, client = %key, reason = err.reason(), "Rate limit exceeded")
            }
            ErrorClass::Client if matches!(err, ShieldError::InvalidSignature(_)) => {
                tracing::warn!(route, client = %key, error = %err, "Invalid signature")
            }
            ErrorClass::Client => {
                tracing::debug!(route, client = %key, reason = err.reason(), "Request rejected")
            }
        }
        metrics::record_rejection(err.reason());
        rejection(err, headers)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}

/// Layer applying a [`RequestGuard`] to one route.
#[derive(Clone)]
pub struct RequestGuardLayer {
    guard: Arc<RequestGuard>,
    route: Arc<str>,
    policy: EndpointPolicy,
}

impl RequestGuardLayer {
    pub fn policy(&self) -> EndpointPolicy {
        self.policy
    }
}

impl<S> Layer<S> for RequestGuardLayer {
    type Service = RequestGuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestGuardService {
            inner,
            guard: Arc::clone(&self.guard),
            route: Arc::clone(&self.route),
            policy: self.policy,
        }
    }
}

/// Service produced by [`RequestGuardLayer`].
#[derive(Clone)]
pub struct RequestGuardService<S> {
    inner: S,
    guard: Arc<RequestGuard>,
    route: Arc<str>,
    policy: EndpointPolicy,
}

impl<S> Service<Request<Body>> for RequestGuardService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Error: Display,
    S::Future: Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness of the handler is awaited inside the future, after the gates.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let inner = self.inner.clone();
        let guard = Arc::clone(&self.guard);
        let route = Arc::clone(&self.route);
        let policy = self.policy;

        Box::pin(async move { Ok(guard.handle(&route, policy, req, inner).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::CorsConfig;
    use crate::security::signature::{sign, DEFAULT_MAX_SKEW};
    use crate::security::BlockPolicy;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &str = "guard-secret";
    const NOW: u64 = 1_700_000_000;

    fn guard(secret: &str) -> (Arc<RequestGuard>, Arc<ManualClock>) {
        let clock = ManualClock::shared(Duration::from_secs(NOW));
        let limiter = Arc::new(RateLimiter::new(BlockPolicy::default(), clock.clone()));
        let cors = CorsConfig {
            allowed_origins: vec!["https://app.example.com".into()],
            ..CorsConfig::default()
        };
        let guard = RequestGuard::new(
            limiter,
            OriginGate::from_config(&cors).unwrap(),
            SignatureValidator::new(secret, DEFAULT_MAX_SKEW, clock.clone()),
            clock.clone(),
            1024,
        );
        (Arc::new(guard), clock)
    }

    type TestHandler = tower::util::BoxCloneService<Request<Body>, Response, Infallible>;

    fn ok_handler(calls: Arc<AtomicUsize>) -> TestHandler {
        TestHandler::new(tower::service_fn(move |_req: Request<Body>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Response::new(Body::from("{}")))
            }
        }))
    }

    fn post() -> axum::http::request::Builder {
        Request::builder()
            .method(Method::POST)
            .uri("/api/test")
            .header("x-forwarded-for", "203.0.113.9")
            .header("content-type", "application/json")
    }

    #[tokio::test]
    async fn test_admitted_request_reaches_handler_once() {
        let (guard, _) = guard("");
        let calls = Arc::new(AtomicUsize::new(0));
        let req = post().body(Body::from("{}")).unwrap();

        let response = guard
            .handle("/api/test", EndpointPolicy::new(3, Duration::from_secs(60)), req, ok_handler(calls.clone()))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "2");
        assert_eq!(response.headers()["x-ratelimit-reset"], (NOW + 60).to_string().as_str());
        assert_eq!(response.headers()["x-frame-options"], "DENY");
    }

    #[tokio::test]
    async fn test_preflight_skips_everything() {
        let (guard, _) = guard(SECRET);
        let calls = Arc::new(AtomicUsize::new(0));
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/test")
            .header("origin", "https://app.example.com")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap();

        let policy = EndpointPolicy::new(1, Duration::from_secs(60)).signed();
        let response = guard.handle("/api/test", policy, req, ok_handler(calls.clone())).await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["access-control-allow-origin"], "https://app.example.com");
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(guard.limiter().tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_415_after_quota() {
        let (guard, _) = guard("");
        let calls = Arc::new(AtomicUsize::new(0));
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/test")
            .header("x-forwarded-for", "203.0.113.9")
            .header("content-type", "text/plain")
            .body(Body::from("hi"))
            .unwrap();

        let response = guard
            .handle("/api/test", EndpointPolicy::new(5, Duration::from_secs(60)), req, ok_handler(calls.clone()))
            .await;

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "4");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_signature_gate() {
        let (guard, _) = guard(SECRET);
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = EndpointPolicy::new(10, Duration::from_secs(60)).signed();
        let body = r#"{"index":"docs"}"#;

        let unsigned = post().body(Body::from(body)).unwrap();
        let response = guard.handle("/api/test", policy, unsigned, ok_handler(calls.clone())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let signed = post()
            .header("x-request-timestamp", NOW.to_string())
            .header("x-request-signature", sign(SECRET, NOW as i64, body.as_bytes()))
            .body(Body::from(body))
            .unwrap();
        let response = guard.handle("/api/test", policy, signed, ok_handler(calls.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_error_becomes_generic_500() {
        let (guard, _) = guard("");
        let failing = tower::service_fn(|_req: Request<Body>| async {
            Err::<Response, _>(std::io::Error::other("connection string leaked"))
        });
        let req = Request::builder()
            .uri("/api/test")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap();

        let response = guard
            .handle("/api/test", EndpointPolicy::new(5, Duration::from_secs(60)), req, failing)
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["x-ratelimit-limit"], "5");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("Internal server error"));
        assert!(!body.contains("leaked"));
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_500() {
        let (guard, _) = guard("");
        let panicking = tower::service_fn(|_req: Request<Body>| async {
            if true {
                panic!("index out of bounds");
            }
            Ok::<Response, Infallible>(Response::new(Body::empty()))
        });
        let req = Request::builder()
            .uri("/api/test")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap();

        let response = guard
            .handle("/api/test", EndpointPolicy::new(5, Duration::from_secs(60)), req, panicking)
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn test_slow_handler_times_out_with_headers() {
        let (guard, _) = guard("");
        let guard = Arc::try_unwrap(guard)
            .ok()
            .unwrap()
            .with_handler_timeout(Duration::from_millis(20));
        let slow = tower::service_fn(|_req: Request<Body>| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<Response, Infallible>(Response::new(Body::empty()))
        });
        let req = Request::builder()
            .uri("/api/test")
            .header("x-forwarded-for", "203.0.113.9")
            .header("origin", "https://app.example.com")
            .body(Body::empty())
            .unwrap();

        let response = guard
            .handle("/api/test", EndpointPolicy::new(5, Duration::from_secs(60)), req, slow)
            .await;

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "4");
        assert_eq!(response.headers()["access-control-allow-origin"], "https://app.example.com");
    }

    #[test]
    fn test_policy_override() {
        let base = EndpointPolicy::new(10, Duration::from_secs(60));
        assert_eq!(base.with_override(None), base);

        let route = RoutePolicyConfig {
            path: "/api/chat".into(),
            max_requests: Some(3),
            window_secs: None,
            require_signature: Some(true),
        };
        let policy = base.with_override(Some(&route));
        assert_eq!(policy.max_requests, 3);
        assert_eq!(policy.window, Duration::from_secs(60));
        assert!(policy.require_signature);
    }
}

//! HTTP server setup.
//!
//! # Responsibilities
//! - Register protected routes, each behind its own guard layer
//! - Wire up global middleware (request ID, tracing)
//!
//! Body limits and the handler deadline are enforced by the guard, so those
//! rejections carry the same headers as every other guarded response.
//! - Serve with graceful shutdown

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    routing::{get, post, MethodRouter},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::clock::{SharedClock, SystemClock};
use crate::config::{ConfigError, SecurityConfig, ShieldConfig};
use crate::http::handlers;
use crate::http::middleware::{EndpointPolicy, RequestGuard};
use crate::http::request::{header_str, X_REQUEST_ID};
use crate::security::{BlockPolicy, RateLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub security: SecurityConfig,
    pub limiter: Arc<RateLimiter>,
}

/// HTTP server for the protected API.
pub struct ShieldServer {
    config: ShieldConfig,
    guard: Arc<RequestGuard>,
    routes: Router<AppState>,
}

impl ShieldServer {
    pub fn new(config: ShieldConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build the server around `clock`, registering the default routes.
    pub fn with_clock(config: ShieldConfig, clock: SharedClock) -> Result<Self, ConfigError> {
        let limiter = Arc::new(RateLimiter::new(
            BlockPolicy::from_config(&config.rate_limit),
            clock.clone(),
        ));
        let guard = Arc::new(RequestGuard::from_config(&config, limiter, clock)?);

        let window = Duration::from_secs(config.rate_limit.window_secs);
        let chat_max = config.rate_limit.chat_max_requests;

        let server = Self {
            config,
            guard,
            routes: Router::new(),
        };

        Ok(server
            .protect("/api/health", get(handlers::health), EndpointPolicy::new(60, window))
            .protect("/api/chat", post(handlers::chat), EndpointPolicy::new(chat_max, window))
            .protect(
                "/api/init-index",
                post(handlers::init_index),
                EndpointPolicy::new(2, window).signed(),
            ))
    }

    /// Register `method_router` at `path` behind the guard.
    ///
    /// A `[[routes]]` entry for `path` in the config overrides `policy`.
    pub fn protect(
        mut self,
        path: &str,
        method_router: MethodRouter<AppState>,
        policy: EndpointPolicy,
    ) -> Self {
        let policy = policy.with_override(self.config.route(path));
        tracing::debug!(
            route = path,
            max_requests = policy.max_requests,
            window_secs = policy.window.as_secs(),
            require_signature = policy.require_signature,
            "Protecting route"
        );

        self.routes = self
            .routes
            .route(path, method_router.layer(self.guard.layer(path, policy)));
        self
    }

    /// Policy for routes without their own limit: `rate_limit.max_requests`
    /// per window, unsigned.
    pub fn default_policy(&self) -> EndpointPolicy {
        EndpointPolicy::new(
            self.config.rate_limit.max_requests,
            Duration::from_secs(self.config.rate_limit.window_secs),
        )
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.guard.limiter()
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    /// The complete application router.
    pub fn router(&self) -> Router {
        let state = AppState {
            security: self.config.security.clone(),
            limiter: Arc::clone(self.guard.limiter()),
        };

        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                let request_id = header_str(req.headers(), &X_REQUEST_ID).unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %req.method(),
                    path = %req.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id());

        self.routes.clone().with_state(state).layer(middleware)
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

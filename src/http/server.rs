//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;
use super::layer::{self, RateLimitLayerState};
use crate::cronauth::CronAuthGuard;
use crate::error::Result;
use crate::ratelimit::{MemoryStore, PolicySet, RateLimitPolicy, RateLimiter};

/// Shared state for the admission-control API.
#[derive(Clone)]
pub struct AppState {
    /// The rate limiter
    pub limiter: Arc<RateLimiter>,
    /// Named policies resolved per check request
    pub policies: Arc<PolicySet>,
    /// Guard for scheduler-invoked routes
    pub cron_guard: Arc<CronAuthGuard>,
    /// Sweep target when running on the in-memory backend
    pub memory_store: Option<Arc<MemoryStore>>,
}

/// HTTP server for the admission-control API.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server.
    ///
    /// `check_policy` protects the check endpoint itself; the cron guard
    /// wraps the maintenance routes.
    pub fn new(
        addr: SocketAddr,
        state: AppState,
        check_policy: RateLimitPolicy,
        request_timeout: Duration,
    ) -> Self {
        let check_state = RateLimitLayerState {
            limiter: state.limiter.clone(),
            policy: Arc::new(check_policy),
        };

        let check_routes = Router::new()
            .route("/v1/check", post(handlers::check))
            .route_layer(middleware::from_fn_with_state(
                check_state,
                layer::rate_limit,
            ));

        let maintenance_routes = Router::new()
            .route("/v1/maintenance/sweep", post(handlers::sweep))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                layer::require_cron_auth,
            ));

        let router = Router::new()
            .merge(check_routes)
            .merge(maintenance_routes)
            .route("/healthz", get(handlers::healthz))
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(request_timeout))
            .with_state(state);

        Self { addr, router }
    }

    /// The assembled router. Useful for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server shuts down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        info!(
            addr = %self.addr,
            "Starting HTTP server for admission control"
        );

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await?;

        Ok(())
    }
}

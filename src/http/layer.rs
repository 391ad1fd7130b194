//! Embeddable admission-control middleware.
//!
//! These layers short-circuit before the inner handler runs: rate-limited
//! callers get the 429 rejection verbatim, unauthorized scheduler callers an
//! opaque 401.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::debug;

use super::server::AppState;
use crate::ratelimit::{caller_identity, Decision, RateLimitPolicy, RateLimiter};

/// State for the rate limit layer: a limiter plus the policy it enforces.
#[derive(Clone)]
pub struct RateLimitLayerState {
    /// Shared limiter
    pub limiter: Arc<RateLimiter>,
    /// The policy this layer enforces
    pub policy: Arc<RateLimitPolicy>,
}

/// Rate-limit the wrapped routes under a fixed policy.
///
/// The caller identity is derived from `x-forwarded-for`, then the peer
/// address, then a shared bucket. Admitted responses carry `x-ratelimit-*`
/// quota headers.
pub async fn rate_limit(
    State(state): State<RateLimitLayerState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let identity = caller_identity(request.headers(), peer.map(|ConnectInfo(addr)| addr));
    let decision = state.limiter.check(&identity, &state.policy).await;

    if !decision.allowed {
        debug!(
            namespace = state.policy.namespace(),
            identity = %identity,
            "Request rejected by rate limit"
        );
        return rejection_response(&decision);
    }

    let mut response = next.run(request).await;
    // Keep quota headers the inner handler already set (a check response
    // reports its own namespace's quota, not this layer's).
    if !response.headers().contains_key("x-ratelimit-limit") {
        quota_headers(response.headers_mut(), &decision);
    }
    response
}

/// Require a valid cron secret on the wrapped routes.
pub async fn require_cron_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.cron_guard.verify(request.headers()) {
        // Opaque body: no hint about which check failed.
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response();
    }
    next.run(request).await
}

/// The HTTP 429 rejection for a denied decision.
pub(crate) fn rejection_response(decision: &Decision) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": "Too many requests" })),
    )
        .into_response();

    let headers = response.headers_mut();
    headers.insert("retry-after", HeaderValue::from(decision.retry_after_secs()));
    quota_headers(headers, decision);
    response
}

pub(crate) fn quota_headers(headers: &mut axum::http::HeaderMap, decision: &Decision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(decision.reset_at.timestamp()),
    );
}

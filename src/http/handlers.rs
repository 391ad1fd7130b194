//! Request handlers for the admission-control API.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::layer::{quota_headers, rejection_response};
use super::server::AppState;
use crate::ratelimit::caller_identity;

/// Body of a `POST /v1/check` request.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// Policy namespace, e.g. `"contact-form"`
    pub namespace: String,
    /// Caller identity; derived from the request when absent
    #[serde(default)]
    pub identity: Option<String>,
}

/// Evaluate an admission decision.
///
/// Returns the decision as JSON when admitted, or the 429 rejection the
/// caller should relay verbatim.
pub async fn check(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(body): Json<CheckRequest>,
) -> Response {
    let Some(policy) = state.policies.resolve(&body.namespace) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": format!("unknown policy namespace {:?}", body.namespace)
            })),
        )
            .into_response();
    };

    let identity = body.identity.unwrap_or_else(|| {
        caller_identity(&headers, peer.map(|ConnectInfo(addr)| addr))
    });

    let decision = state.limiter.check(&identity, &policy).await;
    if decision.allowed {
        let mut response = (StatusCode::OK, Json(&decision)).into_response();
        quota_headers(response.headers_mut(), &decision);
        response
    } else {
        rejection_response(&decision)
    }
}

/// Drop expired in-memory counters. Cron-guarded.
///
/// The Redis backend expires keys server-side, so there is nothing to sweep
/// when it is active.
pub async fn sweep(State(state): State<AppState>) -> Response {
    let removed = match &state.memory_store {
        Some(store) => store.sweep(),
        None => 0,
    };
    info!(removed, "Swept expired rate limit counters");
    (StatusCode::OK, Json(json!({ "removed": removed }))).into_response()
}

/// Liveness probe.
pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

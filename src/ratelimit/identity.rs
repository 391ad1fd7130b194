//! Caller identity derivation.

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Bucket used when no identity can be derived from the request.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Derive a stable caller identity from request metadata.
///
/// Prefers the first value of `x-forwarded-for` (the client address as seen
/// by the outermost proxy), then the direct peer address, then the shared
/// [`UNKNOWN_IDENTITY`] bucket. Never fails.
pub fn caller_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => UNKNOWN_IDENTITY.to_string(),
    }
}

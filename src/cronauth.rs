//! Shared-secret authorization for scheduler-invoked endpoints.
//!
//! Endpoints triggered by a trusted scheduler (cron sweeps, cache refreshes)
//! are never called by end users; they are gated on a single shared secret
//! rather than a session. Unlike the rate limiter, this guard fails closed:
//! a deployment with a missing or weak secret rejects every caller.

use axum::http::{header, HeaderMap};
use tracing::{debug, error};

/// Secrets below this length are treated as misconfiguration.
pub const MIN_SECRET_LEN: usize = 16;

/// Fallback header for manual/operator testing.
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Environment variable the secret is sourced from.
pub const CRON_SECRET_ENV: &str = "CRON_SECRET";

/// Configuration for [`CronAuthGuard`], loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct CronAuthConfig {
    /// The shared secret. Never logged.
    pub secret: Option<String>,
    /// Skip verification for local iteration. Only honored in debug builds;
    /// release binaries ignore it, so a mis-set flag cannot open production.
    pub allow_insecure_local: bool,
}

impl CronAuthConfig {
    /// Read the secret from the [`CRON_SECRET_ENV`] environment variable.
    pub fn from_env() -> Self {
        let secret = std::env::var(CRON_SECRET_ENV)
            .ok()
            .filter(|s| !s.is_empty());
        Self {
            secret,
            allow_insecure_local: false,
        }
    }
}

/// Binary authorization check for scheduled-job endpoints.
///
/// Purely a predicate: each request is evaluated independently, with no
/// session or retry state. Callers must respond with an opaque 401 on
/// rejection so the endpoint cannot be used as a secret-guessing oracle.
pub struct CronAuthGuard {
    config: CronAuthConfig,
}

impl CronAuthGuard {
    /// Create a guard with the given configuration.
    pub fn new(config: CronAuthConfig) -> Self {
        Self { config }
    }

    /// Verify that the request carries the expected secret.
    ///
    /// Accepts `Authorization: Bearer <secret>` or the [`CRON_SECRET_HEADER`]
    /// fallback, both trimmed before comparison. Fails closed when the
    /// expected secret is absent or shorter than [`MIN_SECRET_LEN`].
    pub fn verify(&self, headers: &HeaderMap) -> bool {
        if cfg!(debug_assertions) && self.config.allow_insecure_local {
            debug!("Cron auth bypassed for local development");
            return true;
        }

        let Some(secret) = self.config.secret.as_deref() else {
            error!("Cron secret is not configured, rejecting scheduler request");
            return false;
        };
        if secret.len() < MIN_SECRET_LEN {
            error!(
                min_len = MIN_SECRET_LEN,
                "Cron secret is too short, rejecting scheduler request"
            );
            return false;
        }

        match presented_secret(headers) {
            Some(presented) => constant_time_eq(presented.as_bytes(), secret.as_bytes()),
            None => false,
        }
    }
}

/// Extract the secret presented by the request, if any.
fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = bearer_token(headers) {
        return Some(token);
    }
    headers
        .get(CRON_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Compare without short-circuiting on the first mismatched byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "abc123minimum16chars";

    fn guard_with_secret(secret: &str) -> CronAuthGuard {
        CronAuthGuard::new(CronAuthConfig {
            secret: Some(secret.to_string()),
            allow_insecure_local: false,
        })
    }

    fn bearer_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_correct_bearer_token_accepted() {
        let guard = guard_with_secret(SECRET);
        assert!(guard.verify(&bearer_headers(SECRET)));
    }

    #[test]
    fn test_wrong_bearer_token_rejected() {
        let guard = guard_with_secret(SECRET);
        assert!(!guard.verify(&bearer_headers("wrong")));
    }

    #[test]
    fn test_missing_secret_fails_closed() {
        let guard = CronAuthGuard::new(CronAuthConfig {
            secret: None,
            allow_insecure_local: false,
        });
        // Correct-looking header still rejected.
        assert!(!guard.verify(&bearer_headers(SECRET)));
    }

    #[test]
    fn test_short_secret_fails_closed() {
        let guard = guard_with_secret("short");
        assert!(!guard.verify(&bearer_headers("short")));
    }

    #[test]
    fn test_fallback_header_accepted() {
        let guard = guard_with_secret(SECRET);
        let mut headers = HeaderMap::new();
        headers.insert(CRON_SECRET_HEADER, HeaderValue::from_static(SECRET));
        assert!(guard.verify(&headers));
    }

    #[test]
    fn test_header_values_are_trimmed() {
        let guard = guard_with_secret(SECRET);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {SECRET}  ")).unwrap(),
        );
        assert!(guard.verify(&headers));
    }

    #[test]
    fn test_no_credentials_rejected() {
        let guard = guard_with_secret(SECRET);
        assert!(!guard.verify(&HeaderMap::new()));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_local_bypass_in_debug_builds() {
        let guard = CronAuthGuard::new(CronAuthConfig {
            secret: None,
            allow_insecure_local: true,
        });
        assert!(guard.verify(&HeaderMap::new()));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"same", b"same"));
        assert!(!constant_time_eq(b"same", b"sane"));
        assert!(!constant_time_eq(b"same", b"longer"));
    }
}

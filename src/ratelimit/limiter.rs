//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, trace, warn};

use super::policy::RateLimitPolicy;
use super::store::CounterStore;

/// Default bound on a single counter-store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// Outcome of an admission check.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// The limit that applied
    pub limit: u64,
    /// Remaining quota in the current window (0 on rejection)
    pub remaining: u64,
    /// When the current window expires
    pub reset_at: DateTime<Utc>,
}

impl Decision {
    /// Seconds until the window resets, clamped to zero. Suitable for a
    /// `Retry-After` header.
    pub fn retry_after_secs(&self) -> u64 {
        (self.reset_at - Utc::now()).num_seconds().max(0) as u64
    }

    /// Admit-by-default decision used when the counter store is unreachable.
    fn fail_open(policy: &RateLimitPolicy) -> Self {
        Self {
            allowed: true,
            limit: policy.limit(),
            remaining: policy.limit(),
            reset_at: Utc::now()
                + chrono::Duration::from_std(policy.window())
                    .unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }
}

/// Fixed-window admission control over a shared counter store.
///
/// The limiter holds no counter state of its own. Each check is a single
/// atomic increment against the store followed by a compare, so concurrent
/// requests for the same identity never over-admit.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    store_timeout: Duration,
}

impl RateLimiter {
    /// Create a rate limiter over the given counter store.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Override the bound on store round trips.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Check whether a request from `identity` is admitted under `policy`.
    ///
    /// Rejected requests still count against the window: the counter is not
    /// decremented, matching abuse-prevention semantics. When the store
    /// errors or times out the request is admitted and a warning logged
    /// (fail-open: this control deters abuse, it does not gate access).
    pub async fn check(&self, identity: &str, policy: &RateLimitPolicy) -> Decision {
        let key = policy.counter_key(identity);

        trace!(
            key = %key,
            limit = policy.limit(),
            "Checking rate limit"
        );

        let result = tokio::time::timeout(
            self.store_timeout,
            self.store.incr(&key, policy.window()),
        )
        .await;

        let window = match result {
            Ok(Ok(window)) => window,
            Ok(Err(e)) => {
                warn!(
                    namespace = policy.namespace(),
                    error = %e,
                    "Counter store unavailable, admitting request"
                );
                return Decision::fail_open(policy);
            }
            Err(_) => {
                warn!(
                    namespace = policy.namespace(),
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Counter store timed out, admitting request"
                );
                return Decision::fail_open(policy);
            }
        };

        let allowed = window.count <= policy.limit();
        if !allowed {
            debug!(
                key = %key,
                count = window.count,
                limit = policy.limit(),
                "Rate limit exceeded"
            );
        }

        Decision {
            allowed,
            limit: policy.limit(),
            remaining: policy.limit().saturating_sub(window.count),
            reset_at: window.reset_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatehouseError;
    use crate::ratelimit::store::{MemoryStore, WindowCount};
    use async_trait::async_trait;

    fn test_policy(namespace: &str, limit: u64, window: &str) -> RateLimitPolicy {
        RateLimitPolicy::new(namespace, limit, window).unwrap()
    }

    fn memory_limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_remaining_decreases_monotonically() {
        let limiter = memory_limiter();
        let policy = test_policy("contact-form", 5, "1 m");

        for expected_remaining in (0..5).rev() {
            let decision = limiter.check("192.0.2.1", &policy).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }
    }

    #[tokio::test]
    async fn test_over_limit_rejected_with_zero_remaining() {
        let limiter = memory_limiter();
        let policy = test_policy("contact-form", 3, "1 m");

        for _ in 0..3 {
            assert!(limiter.check("192.0.2.1", &policy).await.allowed);
        }

        // Rejections keep counting; remaining stays at 0.
        for _ in 0..4 {
            let decision = limiter.check("192.0.2.1", &policy).await;
            assert!(!decision.allowed);
            assert_eq!(decision.remaining, 0);
        }
    }

    /// Keep sub-second window tests away from an epoch window boundary, so
    /// consecutive checks land in the same window.
    async fn clear_of_second_boundary() {
        let ms = Utc::now().timestamp_subsec_millis() as u64;
        if ms > 700 {
            tokio::time::sleep(Duration::from_millis(1100 - ms)).await;
        }
    }

    #[tokio::test]
    async fn test_window_expiry_readmits() {
        let limiter = memory_limiter();
        let policy = test_policy("contact-form", 1, "1 s");

        clear_of_second_boundary().await;
        assert!(limiter.check("192.0.2.1", &policy).await.allowed);
        assert!(!limiter.check("192.0.2.1", &policy).await.allowed);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let decision = limiter.check("192.0.2.1", &policy).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0); // counter reset to 1 of 1
    }

    #[tokio::test]
    async fn test_identities_do_not_share_counters() {
        let limiter = memory_limiter();
        let policy = test_policy("contact-form", 2, "1 m");

        assert!(limiter.check("192.0.2.1", &policy).await.allowed);
        assert!(limiter.check("192.0.2.1", &policy).await.allowed);
        assert!(!limiter.check("192.0.2.1", &policy).await.allowed);

        // A different caller still has full quota.
        let decision = limiter.check("192.0.2.2", &policy).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[tokio::test]
    async fn test_namespaces_do_not_share_counters() {
        let limiter = memory_limiter();
        let contact = test_policy("contact-form", 1, "1 m");
        let email = test_policy("validate-email", 1, "1 m");

        assert!(limiter.check("192.0.2.1", &contact).await.allowed);
        assert!(!limiter.check("192.0.2.1", &contact).await.allowed);

        // Same caller, different namespace: quota unaffected.
        assert!(limiter.check("192.0.2.1", &email).await.allowed);
    }

    #[tokio::test]
    async fn test_concurrent_checks_admit_exactly_limit() {
        let limiter = Arc::new(memory_limiter());
        let policy = test_policy("burst", 100, "1 m");

        let mut handles = Vec::new();
        for _ in 0..150 {
            let limiter = limiter.clone();
            let policy = policy.clone();
            handles.push(tokio::spawn(async move {
                limiter.check("192.0.2.1", &policy).await.allowed
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 100);
    }

    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn incr(&self, _key: &str, _window: Duration) -> crate::error::Result<WindowCount> {
            Err(GatehouseError::Store("connection refused".to_string()))
        }
    }

    struct HangingStore;

    #[async_trait]
    impl CounterStore for HangingStore {
        async fn incr(&self, _key: &str, _window: Duration) -> crate::error::Result<WindowCount> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            unreachable!("the limiter should have timed out")
        }
    }

    #[tokio::test]
    async fn test_store_error_fails_open() {
        let limiter = RateLimiter::new(Arc::new(FailingStore));
        let policy = test_policy("contact-form", 5, "1 m");

        let decision = limiter.check("192.0.2.1", &policy).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 5);
    }

    #[tokio::test]
    async fn test_store_timeout_fails_open() {
        let limiter = RateLimiter::new(Arc::new(HangingStore))
            .with_store_timeout(Duration::from_millis(50));
        let policy = test_policy("contact-form", 5, "1 m");

        let decision = limiter.check("192.0.2.1", &policy).await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_retry_after_clamped_to_zero() {
        let decision = Decision {
            allowed: false,
            limit: 5,
            remaining: 0,
            reset_at: Utc::now() - chrono::Duration::seconds(10),
        };
        assert_eq!(decision.retry_after_secs(), 0);
    }
}

//! Rate limit policies and window parsing.
//!
//! A policy binds a namespace (one per endpoint family, e.g. `contact-form`)
//! to a request limit and a fixed time window. Policies are immutable once
//! constructed; window strings are validated at construction so that a
//! malformed configuration aborts startup instead of surfacing at request time.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatehouseError, Result};

/// Parse a window string of the form `"<N> <unit>"`.
///
/// Supported units: `s` (seconds), `m` (minutes), `h` (hours), `d` (days).
pub fn parse_window(input: &str) -> Result<Duration> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    if parts.len() != 2 {
        return Err(GatehouseError::Config(format!(
            "invalid window {input:?}: expected \"<N> <unit>\""
        )));
    }

    let value: u64 = parts[0].parse().map_err(|_| {
        GatehouseError::Config(format!("invalid window {input:?}: {:?} is not a number", parts[0]))
    })?;
    if value == 0 {
        return Err(GatehouseError::Config(format!(
            "invalid window {input:?}: duration must be positive"
        )));
    }

    let unit_secs = match parts[1] {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        other => {
            return Err(GatehouseError::Config(format!(
                "invalid window {input:?}: unknown unit {other:?} (expected s, m, h, or d)"
            )));
        }
    };

    Ok(Duration::from_secs(value * unit_secs))
}

/// An admission-control policy for one endpoint family.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    namespace: String,
    limit: u64,
    window: Duration,
}

impl RateLimitPolicy {
    /// Create a new policy. Fails on a zero limit or a malformed window string.
    pub fn new(namespace: impl Into<String>, limit: u64, window: &str) -> Result<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(GatehouseError::Config(
                "policy namespace must not be empty".to_string(),
            ));
        }
        if limit == 0 {
            return Err(GatehouseError::Config(format!(
                "policy {namespace:?}: limit must be positive"
            )));
        }
        let window = parse_window(window)?;
        Ok(Self {
            namespace,
            limit,
            window,
        })
    }

    /// The namespace this policy applies to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Maximum requests admitted per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Fixed window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Counter key for a caller: `namespace:identity`.
    ///
    /// The namespace prefix gives the same caller independent quotas per
    /// endpoint family.
    pub fn counter_key(&self, identity: &str) -> String {
        format!("{}:{}", self.namespace, identity)
    }
}

/// On-disk policy representation (window kept as a string).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Namespace the policy applies to
    pub namespace: String,
    /// Maximum requests per window
    pub limit: u64,
    /// Window string, e.g. `"1 m"`
    pub window: String,
}

/// A set of named policies with an optional fallback for unknown namespaces.
#[derive(Debug, Default)]
pub struct PolicySet {
    policies: HashMap<String, RateLimitPolicy>,
    default: Option<RateLimitPolicy>,
}

impl PolicySet {
    /// Build a policy set from file configuration, validating every entry.
    pub fn new(configs: &[PolicyConfig], default: Option<&PolicyConfig>) -> Result<Self> {
        let mut policies = HashMap::with_capacity(configs.len());
        for config in configs {
            let policy = RateLimitPolicy::new(&config.namespace, config.limit, &config.window)?;
            if policies.insert(config.namespace.clone(), policy).is_some() {
                return Err(GatehouseError::Config(format!(
                    "duplicate policy namespace {:?}",
                    config.namespace
                )));
            }
        }

        let default = match default {
            Some(config) => Some(RateLimitPolicy::new(
                &config.namespace,
                config.limit,
                &config.window,
            )?),
            None => None,
        };

        Ok(Self { policies, default })
    }

    /// Resolve the policy for a namespace.
    ///
    /// Unknown namespaces fall back to the default policy with the requested
    /// namespace substituted, so counters stay scoped per endpoint family.
    /// Returns `None` when no policy matches and no default is configured.
    pub fn resolve(&self, namespace: &str) -> Option<RateLimitPolicy> {
        if let Some(policy) = self.policies.get(namespace) {
            return Some(policy.clone());
        }
        self.default.as_ref().map(|d| RateLimitPolicy {
            namespace: namespace.to_string(),
            ..d.clone()
        })
    }

    /// Number of named policies (excluding the default).
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the set has no named policies.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

//! Configuration management for Gatehouse.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cronauth::CronAuthConfig;
use crate::error::{GatehouseError, Result};
use crate::ratelimit::{PolicyConfig, PolicySet, RateLimitPolicy};

/// Main configuration for the Gatehouse service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatehouseConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Cron authorization configuration (the secret itself comes from the
    /// environment, never from the file)
    #[serde(default)]
    pub cron_auth: CronAuthFileConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Bound on a single counter-store round trip, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Whole-request timeout, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            store_timeout_ms: default_store_timeout_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

fn default_store_timeout_ms() -> u64 {
    250
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Which counter store backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process counters; quota enforcement is per-instance
    #[default]
    Memory,
    /// Shared Redis counters; safe for horizontal scaling
    Redis,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend selection
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL (used when `backend = redis`)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Named per-namespace policies
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,

    /// Fallback policy for namespaces without a named entry. When absent,
    /// unknown namespaces are refused.
    #[serde(default)]
    pub default_policy: Option<PolicyConfig>,

    /// Policy protecting the service's own check endpoint
    #[serde(default = "default_check_api_policy")]
    pub check_api: PolicyConfig,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            policies: Vec::new(),
            default_policy: None,
            check_api: default_check_api_policy(),
        }
    }
}

fn default_check_api_policy() -> PolicyConfig {
    PolicyConfig {
        namespace: "check-api".to_string(),
        limit: 120,
        window: "1 m".to_string(),
    }
}

/// File-sourced part of the cron authorization configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CronAuthFileConfig {
    /// Skip secret verification for local iteration (debug builds only)
    #[serde(default)]
    pub allow_insecure_local: bool,
}

impl GatehouseConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GatehouseError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Build the validated policy set. Errors here abort startup, so window
    /// strings never fail at request time.
    pub fn policy_set(&self) -> Result<PolicySet> {
        PolicySet::new(
            &self.rate_limiting.policies,
            self.rate_limiting.default_policy.as_ref(),
        )
    }

    /// Build the policy protecting the check endpoint itself.
    pub fn check_api_policy(&self) -> Result<RateLimitPolicy> {
        let config = &self.rate_limiting.check_api;
        RateLimitPolicy::new(&config.namespace, config.limit, &config.window)
    }

    /// Assemble the cron guard configuration, pulling the secret from the
    /// environment.
    pub fn cron_auth(&self) -> CronAuthConfig {
        let mut config = CronAuthConfig::from_env();
        config.allow_insecure_local = self.cron_auth.allow_insecure_local;
        config
    }

    /// Counter-store round-trip timeout.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.server.store_timeout_ms)
    }

    /// Whole-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatehouseConfig::default();
        assert_eq!(config.server.listen_addr, default_listen_addr());
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.rate_limiting.policies.is_empty());
        assert!(!config.cron_auth.allow_insecure_local);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server:
  listen_addr: "0.0.0.0:9000"
  store_timeout_ms: 100
store:
  backend: redis
  redis_url: "redis://cache:6379"
rate_limiting:
  policies:
    - namespace: contact-form
      limit: 5
      window: "1 m"
    - namespace: validate-email
      limit: 20
      window: "1 h"
  default_policy:
    namespace: default
    limit: 60
    window: "1 m"
cron_auth:
  allow_insecure_local: false
"#;
        let config = GatehouseConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.server.store_timeout_ms, 100);
        assert_eq!(config.rate_limiting.policies.len(), 2);

        let policies = config.policy_set().unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies.resolve("contact-form").unwrap().limit(), 5);
        assert_eq!(policies.resolve("anything-else").unwrap().limit(), 60);
    }

    #[test]
    fn test_bad_window_fails_at_load_not_request_time() {
        let yaml = r#"
rate_limiting:
  policies:
    - namespace: contact-form
      limit: 5
      window: "1 week"
"#;
        let config = GatehouseConfig::from_yaml(yaml).unwrap();
        assert!(config.policy_set().is_err());
    }

    #[test]
    fn test_check_api_policy_has_a_default() {
        let config = GatehouseConfig::default();
        let policy = config.check_api_policy().unwrap();
        assert_eq!(policy.namespace(), "check-api");
        assert!(policy.limit() > 0);
    }
}

//! # Gateway Configuration
//!
//! Declarative configuration for assembling a gateway: pipeline knobs,
//! cache sizing, provider entries, and model aliases. Loadable from TOML
//! with humanized durations.
//!
//! ```toml
//! base_path = "/ai"
//! default_timeout = "30s"
//! default_max_retries = 2
//! global_rate_limit = 0
//! enable_usage = true
//! enable_cache = true
//! log_level = "info"
//!
//! [[providers]]
//! name = "openai"
//! api_key = "sk-..."
//! timeout = "30s"
//!
//! [[aliases]]
//! name = "fast"
//! targets = [{ provider = "openai", model = "gpt-4o-mini", weight = 1.0 }]
//! ```

use nexus_models_sdk::alias::AliasTarget;
use nexus_models_sdk::common::duration_serde;
use nexus_models_sdk::providers::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::gateway_error::GatewayError;

/// Log verbosity for [`crate::gateway::Gateway::init_tracing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// What to do when the estimated input exceeds the model context window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Keep the first system message and the last two turns.
    #[default]
    TruncateOldest,
    /// Keep the first two and the last two messages.
    TruncateMiddle,
    /// Fail with a context-overflow error.
    Error,
}

/// One alias entry: a virtual name mapping to weighted targets, optionally
/// scoped to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasEntry {
    pub name: String,
    /// Owning tenant id; absent means the global default entry.
    #[serde(default)]
    pub tenant: Option<String>,
    pub targets: Vec<AliasTarget>,
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// URL prefix the embedding application mounts the gateway under.
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Per-request deadline applied by the timeout middleware.
    #[serde(with = "duration_serde", default = "default_request_timeout")]
    pub default_timeout: Duration,
    /// Retry attempts after the first try; zero disables the retry
    /// middleware entirely.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// Base delay before the first retry.
    #[serde(with = "duration_serde", default = "default_retry_delay")]
    pub retry_delay: Duration,
    /// Backoff multiplier between retry attempts.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: f64,
    /// Requests per minute across all tenants; zero means unlimited.
    #[serde(default)]
    pub global_rate_limit: u32,
    /// Whether the usage middleware records requests.
    #[serde(default = "default_true")]
    pub enable_usage: bool,
    /// Whether the cache middleware is installed.
    #[serde(default = "default_true")]
    pub enable_cache: bool,
    /// TTL for cached completions.
    #[serde(with = "duration_serde", default = "default_cache_ttl")]
    pub cache_ttl: Duration,
    /// Maximum cached entries.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Log verbosity.
    #[serde(default)]
    pub log_level: LogLevel,
    /// Context-window overflow policy.
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    /// Fallback context window for models without a catalog entry.
    #[serde(default = "default_context_window")]
    pub default_context_window: u32,
    /// Per-model context-window overrides.
    #[serde(default)]
    pub context_windows: HashMap<String, u32>,
    /// Default routing strategy name.
    #[serde(default = "default_strategy")]
    pub routing_strategy: String,
    /// Provider entries handed to adapter constructors.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Alias entries loaded into the alias registry.
    #[serde(default)]
    pub aliases: Vec<AliasEntry>,
}

fn default_base_path() -> String {
    "/ai".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(200)
}

fn default_retry_backoff() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_context_window() -> u32 {
    8192
}

fn default_strategy() -> String {
    "priority".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            default_timeout: default_request_timeout(),
            default_max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            retry_backoff: default_retry_backoff(),
            global_rate_limit: 0,
            enable_usage: true,
            enable_cache: true,
            cache_ttl: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
            log_level: LogLevel::default(),
            overflow_policy: OverflowPolicy::default(),
            default_context_window: default_context_window(),
            context_windows: HashMap::new(),
            routing_strategy: default_strategy(),
            providers: Vec::new(),
            aliases: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Load and validate a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::Configuration {
                message: format!("failed to read config file: {e}"),
            }
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| GatewayError::Configuration {
            message: format!("failed to parse config file: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if !self.base_path.starts_with('/') {
            return Err(GatewayError::Configuration {
                message: format!("base_path must start with '/': {}", self.base_path),
            });
        }
        if nexus_models_sdk::routing::strategy_from_name(&self.routing_strategy).is_none() {
            return Err(GatewayError::Configuration {
                message: format!("unknown routing strategy: {}", self.routing_strategy),
            });
        }
        for provider in &self.providers {
            if provider.name.is_empty() {
                return Err(GatewayError::Configuration {
                    message: "provider name must not be empty".to_string(),
                });
            }
        }
        for alias in &self.aliases {
            if alias.name.is_empty() {
                return Err(GatewayError::Configuration {
                    message: "alias name must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Per-provider blended cost hints for cost-optimized routing.
    pub fn provider_costs(&self) -> HashMap<String, f64> {
        self.providers
            .iter()
            .filter_map(|p| p.cost_per_token.map(|c| (p.name.clone(), c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.base_path, "/ai");
        assert_eq!(config.default_timeout, Duration::from_secs(30));
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.enable_cache);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_toml() {
        let raw = r#"
            base_path = "/ai"
            default_timeout = "10s"
            default_max_retries = 1
            global_rate_limit = 120
            log_level = "warn"
            overflow_policy = "truncate_middle"

            [[providers]]
            name = "openai"
            api_key = "sk-test"
            timeout = "15s"
            cost_per_token = 0.00002

            [[aliases]]
            name = "fast"
            targets = [{ provider = "openai", model = "gpt-4o-mini", weight = 1.0 }]

            [[aliases]]
            name = "fast"
            tenant = "acme"
            targets = [{ provider = "openai", model = "gpt-4o", weight = 2.0 }]
        "#;
        let config: GatewayConfig = toml::from_str(raw).unwrap();
        config.validate().unwrap();
        assert_eq!(config.default_timeout, Duration::from_secs(10));
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.overflow_policy, OverflowPolicy::TruncateMiddle);
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].timeout, Duration::from_secs(15));
        assert_eq!(config.aliases.len(), 2);
        assert_eq!(config.aliases[1].tenant.as_deref(), Some("acme"));
        assert_eq!(config.provider_costs()["openai"], 0.00002);
    }

    #[test]
    fn test_validation_rejects_bad_strategy() {
        let config = GatewayConfig {
            routing_strategy: "coin-flip".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_base_path() {
        let config = GatewayConfig {
            base_path: "ai".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

//! Process configuration from environment variables
//!
//! - `RULER_HOST` / `RULER_PORT`: bind address (default `0.0.0.0:8080`)
//! - `RULER_POLL_INTERVAL_SECS`: store re-sync period (default 60)
//! - `RULER_EVALUATION_TIMEOUT_SECS`: per-query deadline (default 30)
//! - `RULER_STORE_TIMEOUT_SECS`: per-store-call deadline for API requests (default 10)
//! - `RULER_ENABLE_FEDERATED_RULES`: `true`/`1` to enable federation for every tenant
//! - `RULER_ALLOWED_FEDERATED_TENANTS`: comma-separated tenants allowed to create federated rules
//! - `RULER_MAX_RULE_GROUPS` / `RULER_MAX_RULES_PER_GROUP`: default limits, `0` = unlimited
//! - `RULER_TENANT_LIMITS`: JSON object of per-tenant overrides, e.g.
//!   `{"team-a": {"max_rule_groups": 200, "federation_enabled": true}}`
//! - `RULER_QUERY_URL`: Prometheus-compatible query API (default `http://127.0.0.1:9090`)

use std::collections::HashMap;
use std::time::Duration;

use crate::limits::{StaticLimits, TenantLimits, TenantOverride};
use crate::policy::FederationPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("invalid RULER_TENANT_LIMITS: {0}")]
    TenantLimits(#[from] serde_json::Error),
}

/// Ruler behaviour: limits, federation, evaluation
#[derive(Debug, Clone)]
pub struct RulerConfig {
    pub poll_interval: Duration,
    pub evaluation_timeout: Duration,
    pub store_timeout: Duration,
    pub enable_federated_rules: bool,
    pub allowed_federated_tenants: Vec<String>,
    pub default_limits: TenantLimits,
    pub tenant_limits: HashMap<String, TenantOverride>,
    pub query_url: String,
}

impl Default for RulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            evaluation_timeout: Duration::from_secs(30),
            store_timeout: Duration::from_secs(10),
            enable_federated_rules: false,
            allowed_federated_tenants: Vec::new(),
            default_limits: TenantLimits::default(),
            tenant_limits: HashMap::new(),
            query_url: "http://127.0.0.1:9090".to_string(),
        }
    }
}

impl RulerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let enable_federated_rules = env_bool("RULER_ENABLE_FEDERATED_RULES")?
            .unwrap_or(defaults.enable_federated_rules);

        let allowed_federated_tenants = std::env::var("RULER_ALLOWED_FEDERATED_TENANTS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let default_limits = TenantLimits {
            max_rule_groups: env_parse("RULER_MAX_RULE_GROUPS")?
                .unwrap_or(defaults.default_limits.max_rule_groups),
            max_rules_per_group: env_parse("RULER_MAX_RULES_PER_GROUP")?
                .unwrap_or(defaults.default_limits.max_rules_per_group),
            federation_enabled: enable_federated_rules,
        };

        let tenant_limits = match std::env::var("RULER_TENANT_LIMITS") {
            Ok(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)?,
            _ => HashMap::new(),
        };

        Ok(Self {
            poll_interval: env_parse("RULER_POLL_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            evaluation_timeout: env_parse("RULER_EVALUATION_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.evaluation_timeout),
            store_timeout: env_parse("RULER_STORE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.store_timeout),
            enable_federated_rules,
            allowed_federated_tenants,
            default_limits,
            tenant_limits,
            query_url: std::env::var("RULER_QUERY_URL").unwrap_or(defaults.query_url),
        })
    }

    pub fn limits(&self) -> StaticLimits {
        let defaults = TenantLimits {
            federation_enabled: self.enable_federated_rules,
            ..self.default_limits
        };
        StaticLimits::new(defaults).with_overrides(self.tenant_limits.clone())
    }

    pub fn federation_policy(&self) -> FederationPolicy {
        FederationPolicy::new(self.allowed_federated_tenants.iter().cloned())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub ruler: RulerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            ruler: RulerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: std::env::var("RULER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("RULER_PORT")?.unwrap_or(8080),
            ruler: RulerConfig::from_env()?,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(None),
    }
}

fn env_bool(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" | "" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue { name, value }),
        },
        Err(_) => Ok(None),
    }
}

//! Provisioning configuration.
//!
//! Loaded from serde sources with per-field defaults and optionally
//! overridden from `IDSYNC_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use idsync_connector::GatewaySettings;

use crate::error::{ProvisioningError, Result};

/// Sandbox limits for expression evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionLimits {
    /// Maximum number of operations before termination.
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
    /// Maximum call stack depth.
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,
    /// Maximum string size in bytes.
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,
}

fn default_max_operations() -> u64 {
    100_000
}

fn default_max_call_levels() -> usize {
    64
}

fn default_max_string_size() -> usize {
    65_536
}

impl Default for ExpressionLimits {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
            max_call_levels: default_max_call_levels(),
            max_string_size: default_max_string_size(),
        }
    }
}

/// Provisioning core configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Virtual attribute cache TTL in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached virtual attribute entries.
    #[serde(default = "default_cache_max_capacity")]
    pub cache_max_capacity: u64,

    /// Connector call timeout for resources without their own.
    #[serde(default = "default_connector_timeout_secs")]
    pub connector_timeout_secs: u64,

    /// Connector calls allowed in flight at once.
    #[serde(default = "default_connector_pool_size")]
    pub connector_pool_size: usize,

    /// Dispatch no-priority propagation tasks without awaiting them.
    #[serde(default)]
    pub async_propagation: bool,

    /// Remote objects or deltas read per pull page.
    #[serde(default = "default_page_size")]
    pub pull_page_size: u32,

    /// Entities read per push page.
    #[serde(default = "default_page_size")]
    pub push_page_size: u32,

    #[serde(default)]
    pub expression: ExpressionLimits,
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_max_capacity() -> u64 {
    10_000
}

fn default_connector_timeout_secs() -> u64 {
    30
}

fn default_connector_pool_size() -> usize {
    10
}

fn default_page_size() -> u32 {
    100
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_capacity: default_cache_max_capacity(),
            connector_timeout_secs: default_connector_timeout_secs(),
            connector_pool_size: default_connector_pool_size(),
            async_propagation: false,
            pull_page_size: default_page_size(),
            push_page_size: default_page_size(),
            expression: ExpressionLimits::default(),
        }
    }
}

impl ProvisioningConfig {
    /// Defaults overridden from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `IDSYNC_*` overrides read through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "IDSYNC_CACHE_TTL_SECS")? {
            self.cache_ttl_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "IDSYNC_CONNECTOR_TIMEOUT_SECS")? {
            self.connector_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "IDSYNC_CONNECTOR_POOL_SIZE")? {
            self.connector_pool_size = v;
        }
        if let Some(v) = parse_var(&lookup, "IDSYNC_ASYNC_PROPAGATION")? {
            self.async_propagation = v;
        }
        if let Some(v) = parse_var(&lookup, "IDSYNC_PULL_PAGE_SIZE")? {
            self.pull_page_size = v;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the engines cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.connector_timeout_secs == 0 {
            return Err(ProvisioningError::configuration(
                "connector_timeout_secs must be at least 1",
            ));
        }
        if self.connector_pool_size == 0 {
            return Err(ProvisioningError::configuration(
                "connector_pool_size must be at least 1",
            ));
        }
        if self.pull_page_size == 0 || self.push_page_size == 0 {
            return Err(ProvisioningError::configuration(
                "page sizes must be at least 1",
            ));
        }
        Ok(())
    }

    /// Cache TTL as Duration.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Settings for the connector registry.
    #[must_use]
    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings::new()
            .with_timeout_secs(self.connector_timeout_secs)
            .with_pool_size(self.connector_pool_size)
            .with_page_size(self.pull_page_size)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ProvisioningError::configuration(format!("{name}: {e}"))),
        None => Ok(None),
    }
}

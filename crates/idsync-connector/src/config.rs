//! Gateway settings
//!
//! Worker pool size, default call timeout and search page size shared by
//! every gateway a registry creates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings shared by all connector gateways.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Call timeout for resources that do not set their own.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of connector calls allowed in flight at once.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Page size used when paginating a search transparently.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_pool_size() -> usize {
    10
}

fn default_page_size() -> u32 {
    100
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            pool_size: default_pool_size(),
            page_size: default_page_size(),
        }
    }
}

impl GatewaySettings {
    /// Create settings with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the pool size.
    #[must_use]
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the search page size.
    #[must_use]
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Default timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

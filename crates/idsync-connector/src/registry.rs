//! Connector registry
//!
//! Explicit registry of gateways keyed by resource, owned by the
//! provisioning service. Lookups take a shared lock; registration and
//! removal take the exclusive one.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};
use tracing::{info, warn};

use idsync_core::ResourceKey;

use crate::config::GatewaySettings;
use crate::error::{ConnectorError, ConnectorResult};
use crate::gateway::ConnectorGateway;
use crate::mapping::ExternalResource;
use crate::traits::Connector;

/// Registry of connector gateways.
///
/// All gateways share one bounded worker pool.
#[derive(Debug)]
pub struct ConnectorRegistry {
    gateways: RwLock<HashMap<ResourceKey, Arc<ConnectorGateway>>>,
    pool: Arc<Semaphore>,
    settings: GatewaySettings,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(settings: GatewaySettings) -> Self {
        Self {
            gateways: RwLock::new(HashMap::new()),
            pool: Arc::new(Semaphore::new(settings.pool_size.max(1))),
            settings,
        }
    }

    /// Register a resource with its connector.
    ///
    /// A gateway already registered for the same resource is replaced and
    /// its connector disposed.
    pub async fn register(
        &self,
        resource: ExternalResource,
        connector: Arc<dyn Connector>,
    ) -> Arc<ConnectorGateway> {
        let key = resource.key.clone();
        let gateway = Arc::new(ConnectorGateway::new(
            resource,
            connector,
            Arc::clone(&self.pool),
            self.settings.timeout(),
            self.settings.page_size,
        ));

        let previous = self
            .gateways
            .write()
            .await
            .insert(key.clone(), Arc::clone(&gateway));

        if let Some(previous) = previous {
            Self::dispose(&previous).await;
        }
        info!(resource = %key, "Registered connector");
        gateway
    }

    /// Remove a resource, disposing its connector.
    ///
    /// Returns whether a gateway was registered.
    pub async fn unregister(&self, key: &ResourceKey) -> bool {
        let removed = self.gateways.write().await.remove(key);
        match removed {
            Some(gateway) => {
                Self::dispose(&gateway).await;
                info!(resource = %key, "Unregistered connector");
                true
            }
            None => false,
        }
    }

    async fn dispose(gateway: &ConnectorGateway) {
        if let Err(e) = gateway.connector().dispose().await {
            warn!(resource = %gateway.key(), error = %e, "Failed to dispose connector");
        }
    }

    /// Gateway for a resource.
    pub async fn get(&self, key: &ResourceKey) -> ConnectorResult<Arc<ConnectorGateway>> {
        self.find(key)
            .await
            .ok_or_else(|| ConnectorError::ConnectorNotFound {
                resource: key.clone(),
            })
    }

    /// Gateway for a resource, if registered.
    pub async fn find(&self, key: &ResourceKey) -> Option<Arc<ConnectorGateway>> {
        self.gateways.read().await.get(key).cloned()
    }

    /// Keys of every registered resource, sorted.
    pub async fn resources(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self.gateways.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Settings gateways are created with.
    #[must_use]
    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new(GatewaySettings::default())
    }
}

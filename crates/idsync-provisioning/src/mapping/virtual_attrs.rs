//! Virtual attribute reads.

use tracing::{debug, instrument, warn};

use idsync_core::Entity;

use super::MappingEngine;
use crate::cache::VirAttrCacheKey;
use crate::remote::{key_attribute, read_remote};

impl MappingEngine {
    /// Values of a virtual schema for `entity`.
    ///
    /// Served from the cache while the entry is valid. On a miss the
    /// remote object is read from the schema's resource, fetching only the
    /// mapped attribute, and the result cached. If the remote read fails the
    /// last known values are returned and the entry marked expired.
    #[instrument(skip(self, entity), fields(entity = %entity.key))]
    pub async fn virtual_values(&self, entity: &Entity, schema: &str) -> Vec<String> {
        let Some(vir) = self.schemas.find_virtual(schema) else {
            debug!("No such virtual schema");
            return Vec::new();
        };
        if !entity.allowed_schemas.contains(schema) {
            debug!("Virtual schema not allowed for entity");
            return Vec::new();
        }

        let key = VirAttrCacheKey::new(&entity.any_type, entity.key, schema);
        if let Some(values) = self.cache.get(&key).await {
            return values;
        }

        if !entity.has_resource(&vir.resource) {
            debug!(resource = %vir.resource, "Entity not linked to the virtual schema resource");
            return Vec::new();
        }
        let Some(gateway) = self.registry.find(&vir.resource).await else {
            warn!(resource = %vir.resource, "Virtual schema resource not registered");
            return self.cache.get_stale(&key).await.unwrap_or_default();
        };
        let Some(provision) = gateway.resource().provision(&vir.any_type) else {
            debug!(resource = %vir.resource, any_type = %vir.any_type, "No provision for virtual schema");
            return Vec::new();
        };

        let key_value = match self.connector_key_value(entity, gateway.resource(), provision) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("Entity has no connector key on the virtual schema resource");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "Cannot compute connector key for virtual read");
                return Vec::new();
            }
        };
        let Some(key_attr) = key_attribute(provision) else {
            return Vec::new();
        };

        let attributes_to_get = [vir.ext_attr_name.clone()];
        match read_remote(&gateway, provision, key_attr, &key_value, Some(&attributes_to_get)).await {
            Ok(object) => {
                let values: Vec<String> = object
                    .map(|o| {
                        o.values_of(&vir.ext_attr_name)
                            .iter()
                            .map(|v| v.to_value_string())
                            .collect()
                    })
                    .unwrap_or_default();
                self.cache.put(key, values.clone()).await;
                values
            }
            Err(e) => {
                warn!(resource = %vir.resource, error = %e, "Virtual attribute read failed, using last known values");
                self.cache.get_stale(&key).await.unwrap_or_default()
            }
        }
    }

    /// Read a virtual schema bypassing any cached values.
    pub(crate) async fn fresh_virtual_values(&self, entity: &Entity, schema: &str) -> Vec<String> {
        let key = VirAttrCacheKey::new(&entity.any_type, entity.key, schema);
        self.cache.expire(&key).await;
        self.virtual_values(entity, schema).await
    }
}

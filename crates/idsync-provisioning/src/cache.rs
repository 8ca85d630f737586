//! Virtual attribute cache.
//!
//! Remote reads of virtual attributes are cached per (any type, entity,
//! schema). Validity is checked on read against the configured TTL; expired
//! entries are kept so a failed remote read can fall back to the last known
//! values.

use std::time::Duration;

use moka::future::Cache;
use tokio::time::Instant;
use tracing::debug;

use idsync_core::EntityKey;

/// Cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirAttrCacheKey {
    pub any_type: String,
    pub entity: EntityKey,
    pub schema: String,
}

impl VirAttrCacheKey {
    pub fn new(any_type: impl Into<String>, entity: EntityKey, schema: impl Into<String>) -> Self {
        Self {
            any_type: any_type.into(),
            entity,
            schema: schema.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedValues {
    values: Vec<String>,
    written_at: Instant,
    expired: bool,
}

/// TTL cache of virtual attribute values.
///
/// Safe to share across tasks. Two concurrent misses on the same key may
/// both read the remote resource; the last write wins.
#[derive(Clone)]
pub struct VirAttrCache {
    entries: Cache<VirAttrCacheKey, CachedValues>,
    ttl: Duration,
}

impl std::fmt::Debug for VirAttrCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirAttrCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl VirAttrCache {
    /// Create a cache holding at most `max_capacity` entries.
    #[must_use]
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_capacity).build(),
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Values written within the TTL and not force-expired.
    pub async fn get(&self, key: &VirAttrCacheKey) -> Option<Vec<String>> {
        let cached = self.entries.get(key).await?;
        if cached.expired || cached.written_at.elapsed() >= self.ttl {
            debug!(schema = %key.schema, entity = %key.entity, "Virtual attribute cache entry expired");
            return None;
        }
        Some(cached.values)
    }

    /// Store freshly read values.
    pub async fn put(&self, key: VirAttrCacheKey, values: Vec<String>) {
        self.entries
            .insert(
                key,
                CachedValues {
                    values,
                    written_at: Instant::now(),
                    expired: false,
                },
            )
            .await;
    }

    /// Drop an entry.
    pub async fn expire(&self, key: &VirAttrCacheKey) {
        self.entries.invalidate(key).await;
    }

    /// Last known values regardless of age; the entry is marked expired so
    /// the next read goes to the resource again.
    pub async fn get_stale(&self, key: &VirAttrCacheKey) -> Option<Vec<String>> {
        let mut cached = self.entries.get(key).await?;
        let values = cached.values.clone();
        if !cached.expired {
            cached.expired = true;
            self.entries.insert(key.clone(), cached).await;
        }
        Some(values)
    }
}

impl Default for VirAttrCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), 10_000)
    }
}

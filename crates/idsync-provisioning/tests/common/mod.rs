//! Shared fixtures for the provisioning integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;

use idsync_connector::operation::NAME;
use idsync_connector::{
    full_capabilities, AttributeSet, Connector, ConnectorError, ConnectorObject, ConnectorResult,
    ExternalResource, Filter, Item, Mapping, ObjectClass, PageRequest, Provision, SearchResult,
    SyncDelta, SyncResult, SyncToken, Uid,
};
use idsync_core::{
    AttrSchemaType, InMemoryEntityStore, PlainSchema, ResourceKey, SchemaCatalog,
};
use idsync_provisioning::{ProvisioningConfig, ProvisioningService};

pub const LDAP: &str = "resource-ldap";

static TRACING: Once = Once::new();

/// Install a test subscriber once per binary; `RUST_LOG` controls output.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// In-memory connector
// =============================================================================

/// Connector keeping remote objects in insertion order, with call counters
/// and configurable latency and failures.
pub struct MemoryConnector {
    name: String,
    objects: Mutex<Vec<ConnectorObject>>,
    changes: Mutex<Vec<SyncDelta>>,
    journal: Option<Arc<Mutex<Vec<String>>>>,
    delay: Option<Duration>,
    failing: AtomicBool,
    repeat_cookie: AtomicBool,
    creates: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
    searches: AtomicUsize,
}

impl MemoryConnector {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            objects: Mutex::new(Vec::new()),
            changes: Mutex::new(Vec::new()),
            journal: None,
            delay: None,
            failing: AtomicBool::new(false),
            repeat_cookie: AtomicBool::new(false),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
        }
    }

    /// Record the connector name in `journal` on every write.
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Sleep before every write.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Answer every search with the same page cookie.
    pub fn set_repeat_cookie(&self, repeat: bool) {
        self.repeat_cookie.store(repeat, Ordering::SeqCst);
    }

    /// Seed a remote object, keyed and named by `uid`.
    pub fn seed(&self, uid: &str, attributes: AttributeSet) -> ConnectorObject {
        let object = ConnectorObject::new(ObjectClass::account(), uid, uid, attributes);
        self.objects.lock().unwrap().push(object.clone());
        object
    }

    /// Queue a change for `sync`.
    pub fn push_change(&self, delta: SyncDelta) {
        self.changes.lock().unwrap().push(delta);
    }

    pub fn object(&self, uid: &str) -> Option<ConnectorObject> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.uid.value() == uid)
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.creates() + self.updates() + self.deletes()
    }

    async fn before_write(&self) -> ConnectorResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ConnectorError::connection_failed("Connection refused"));
        }
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(self.name.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn display_name(&self) -> &str {
        &self.name
    }

    async fn create(&self, object_class: &ObjectClass, attributes: AttributeSet) -> ConnectorResult<Uid> {
        self.before_write().await?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        let uid = attributes
            .get_string("uid")
            .or_else(|| attributes.get_string(NAME))
            .ok_or_else(|| ConnectorError::invalid_argument("missing uid"))?;
        let mut objects = self.objects.lock().unwrap();
        if objects.iter().any(|o| o.uid.value() == uid) {
            return Err(ConnectorError::object_already_exists(uid));
        }
        objects.push(ConnectorObject::new(object_class.clone(), uid.clone(), uid.clone(), attributes));
        Ok(Uid::new(uid))
    }

    async fn update(
        &self,
        _object_class: &ObjectClass,
        uid: &Uid,
        attributes: AttributeSet,
    ) -> ConnectorResult<Uid> {
        self.before_write().await?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .iter_mut()
            .find(|o| &o.uid == uid)
            .ok_or_else(|| ConnectorError::object_not_found(uid.value()))?;
        for (name, values) in attributes {
            object.attributes.set(name, values);
        }
        Ok(uid.clone())
    }

    async fn delete(&self, _object_class: &ObjectClass, uid: &Uid) -> ConnectorResult<()> {
        self.before_write().await?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().retain(|o| &o.uid != uid);
        Ok(())
    }

    async fn search(
        &self,
        _object_class: &ObjectClass,
        filter: Option<&Filter>,
        page: &PageRequest,
        _attributes_to_get: Option<&[String]>,
    ) -> ConnectorResult<SearchResult> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.repeat_cookie.load(Ordering::SeqCst) {
            let objects = self.objects.lock().unwrap().clone();
            return Ok(SearchResult::new(objects).with_cookie("again"));
        }
        let offset: usize = page
            .cookie
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        let size = page.page_size as usize;
        let matching: Vec<ConnectorObject> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|o| filter.map_or(true, |f| f.matches(o)))
            .cloned()
            .collect();
        let end = (offset + size).min(matching.len());
        let result = SearchResult::new(matching[offset.min(end)..end].to_vec());
        Ok(if end < matching.len() {
            result.with_cookie(end.to_string())
        } else {
            result
        })
    }

    async fn sync(
        &self,
        _object_class: &ObjectClass,
        token: Option<&SyncToken>,
        batch_size: u32,
    ) -> ConnectorResult<SyncResult> {
        let from = token.and_then(|t| t.0.as_u64()).unwrap_or(0) as usize;
        let changes = self.changes.lock().unwrap();
        let to = (from + batch_size as usize).min(changes.len());
        let deltas: Vec<SyncDelta> = changes[from.min(to)..to]
            .iter()
            .enumerate()
            .map(|(i, d)| d.clone().with_token(SyncToken::new((from + i + 1) as u64)))
            .collect();
        Ok(SyncResult {
            latest_token: deltas.last().and(Some(SyncToken::new(to as u64))),
            has_more: to < changes.len(),
            deltas,
        })
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn catalog() -> SchemaCatalog {
    SchemaCatalog::new()
        .with_plain(PlainSchema::new("email", AttrSchemaType::String))
        .with_plain(PlainSchema::new("firstname", AttrSchemaType::String))
        .with_plain(PlainSchema::new("surname", AttrSchemaType::String))
}

/// USER provision keyed on `username` -> `uid`, with `email` -> `mail`.
pub fn user_provision() -> Provision {
    Provision::new(
        "USER",
        ObjectClass::account(),
        Mapping::new(vec![
            Item::new("username", "uid").connector_key(),
            Item::new("email", "mail"),
            Item::new("firstname", "givenName"),
        ]),
    )
}

pub fn resource(key: &str) -> ExternalResource {
    ExternalResource::new(key, full_capabilities()).with_provision(user_provision())
}

pub fn remote_user(uid: &str, mail: &str) -> AttributeSet {
    AttributeSet::new().with("uid", uid).with("mail", mail)
}

/// Service over an in-memory store with one connector per resource.
pub struct Fixture {
    pub store: Arc<InMemoryEntityStore>,
    pub service: ProvisioningService,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(ProvisioningConfig::default())
    }

    pub fn with_config(config: ProvisioningConfig) -> Self {
        init_tracing();
        let store = Arc::new(InMemoryEntityStore::new());
        let service = ProvisioningService::builder(Arc::new(catalog()), store.clone())
            .with_config(config)
            .build()
            .unwrap();
        Self { store, service }
    }

    pub async fn register(&self, resource: ExternalResource, connector: Arc<MemoryConnector>) {
        self.service.register(resource, connector).await;
    }

    pub fn key(name: &str) -> ResourceKey {
        ResourceKey::from(name)
    }
}

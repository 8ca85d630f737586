//! Async connector gateway
//!
//! Wraps one resource's connector. Every call is checked against the
//! resource's declared capabilities first: an undeclared operation is a
//! silent no-op returning an empty result. Allowed calls run on the shared
//! bounded worker pool under the resource timeout; a call that overruns is
//! aborted and reported as [`ConnectorError::Timeout`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use idsync_core::ResourceKey;

use crate::capability::ConnectorCapability;
use crate::error::{ConnectorError, ConnectorResult};
use crate::mapping::ExternalResource;
use crate::operation::{
    AttributeSet, ConnectorObject, Filter, ObjectClass, PageRequest, SearchResult, SyncResult,
    SyncToken, Uid,
};
use crate::schema::Schema;
use crate::traits::Connector;

/// Capability-gated, timeout-bounded access to one resource.
pub struct ConnectorGateway {
    resource: ExternalResource,
    connector: Arc<dyn Connector>,
    pool: Arc<Semaphore>,
    timeout: Duration,
    page_size: u32,
}

impl std::fmt::Debug for ConnectorGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorGateway")
            .field("resource", &self.resource.key)
            .field("connector", &self.connector.display_name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ConnectorGateway {
    /// Create a gateway.
    ///
    /// `default_timeout` applies when the resource sets no timeout.
    pub fn new(
        resource: ExternalResource,
        connector: Arc<dyn Connector>,
        pool: Arc<Semaphore>,
        default_timeout: Duration,
        page_size: u32,
    ) -> Self {
        let timeout = resource.timeout(default_timeout);
        Self {
            resource,
            connector,
            pool,
            timeout,
            page_size: page_size.max(1),
        }
    }

    /// The resource this gateway serves.
    #[must_use]
    pub fn resource(&self) -> &ExternalResource {
        &self.resource
    }

    /// Key of the resource.
    #[must_use]
    pub fn key(&self) -> &ResourceKey {
        &self.resource.key
    }

    /// Effective call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    fn allows(&self, capability: ConnectorCapability) -> bool {
        let allowed = self.resource.has_capability(capability);
        if !allowed {
            debug!(
                resource = %self.resource.key,
                capability = %capability,
                "Capability not declared, skipping connector call"
            );
        }
        allowed
    }

    /// Run a connector call on the worker pool under the resource timeout.
    ///
    /// Waiting for a pool permit counts against the timeout.
    async fn call<T, F, Fut>(&self, operation: &'static str, f: F) -> ConnectorResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn Connector>) -> Fut + Send + 'static,
        Fut: Future<Output = ConnectorResult<T>> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        let connector = Arc::clone(&self.connector);

        let handle = tokio::spawn(async move {
            let _permit = pool
                .acquire_owned()
                .await
                .map_err(|_| ConnectorError::internal("connector worker pool closed"))?;
            f(connector).await
        });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result.map_err(ConnectorError::into_domain),
            Ok(Err(join_error)) => {
                warn!(
                    resource = %self.resource.key,
                    operation,
                    error = %join_error,
                    "Connector task failed"
                );
                Err(ConnectorError::InvalidArgument {
                    message: format!("{operation} failed: {join_error}"),
                    source: Some(Box::new(join_error)),
                })
            }
            Err(_) => {
                abort.abort();
                warn!(
                    resource = %self.resource.key,
                    operation,
                    timeout_secs = self.timeout.as_secs(),
                    "Connector call timed out"
                );
                Err(ConnectorError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        }
    }

    /// Verify credentials on the resource.
    #[instrument(skip(self, password), fields(resource = %self.resource.key))]
    pub async fn authenticate(
        &self,
        object_class: &ObjectClass,
        username: &str,
        password: &str,
    ) -> ConnectorResult<Option<Uid>> {
        if !self.allows(ConnectorCapability::Authenticate) {
            return Ok(None);
        }
        let object_class = object_class.clone();
        let username = username.to_string();
        let password = password.to_string();
        self.call("authenticate", move |c| async move {
            c.authenticate(&object_class, &username, &password).await
        })
        .await
        .map(Some)
    }

    /// Create a remote object.
    #[instrument(skip(self, attributes), fields(resource = %self.resource.key))]
    pub async fn create(
        &self,
        object_class: &ObjectClass,
        attributes: AttributeSet,
    ) -> ConnectorResult<Option<Uid>> {
        if !self.allows(ConnectorCapability::Create) {
            return Ok(None);
        }
        let object_class = object_class.clone();
        self.call("create", move |c| async move {
            c.create(&object_class, attributes).await
        })
        .await
        .map(Some)
    }

    /// Replace attributes of a remote object.
    #[instrument(skip(self, uid, attributes), fields(resource = %self.resource.key, uid = %uid))]
    pub async fn update(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        attributes: AttributeSet,
    ) -> ConnectorResult<Option<Uid>> {
        if !self.allows(ConnectorCapability::Update) {
            return Ok(None);
        }
        let object_class = object_class.clone();
        let uid = uid.clone();
        self.call("update", move |c| async move {
            c.update(&object_class, &uid, attributes).await
        })
        .await
        .map(Some)
    }

    /// Delete a remote object.
    ///
    /// Returns `None` when the resource does not allow deletion.
    #[instrument(skip(self, uid), fields(resource = %self.resource.key, uid = %uid))]
    pub async fn delete(&self, object_class: &ObjectClass, uid: &Uid) -> ConnectorResult<Option<()>> {
        if !self.allows(ConnectorCapability::Delete) {
            return Ok(None);
        }
        let object_class = object_class.clone();
        let uid = uid.clone();
        self.call("delete", move |c| async move { c.delete(&object_class, &uid).await })
            .await
            .map(Some)
    }

    /// Read one page of search results.
    pub async fn search_page(
        &self,
        object_class: &ObjectClass,
        filter: Option<&Filter>,
        page: &PageRequest,
        attributes_to_get: Option<&[String]>,
    ) -> ConnectorResult<SearchResult> {
        if !self.allows(ConnectorCapability::Search) {
            return Ok(SearchResult::empty());
        }
        let object_class = object_class.clone();
        let filter = filter.cloned();
        let page = page.clone();
        let attributes_to_get = attributes_to_get.map(<[String]>::to_vec);
        self.call("search", move |c| async move {
            c.search(
                &object_class,
                filter.as_ref(),
                &page,
                attributes_to_get.as_deref(),
            )
            .await
        })
        .await
    }

    /// Search, forwarding every object to `handler`.
    ///
    /// With an explicit `page` only that page is read and its cookie
    /// returned. Without one the gateway follows cookies until the last page.
    /// The handler returns `false` to stop early.
    #[instrument(skip(self, filter, attributes_to_get, handler), fields(resource = %self.resource.key))]
    pub async fn search<H>(
        &self,
        object_class: &ObjectClass,
        filter: Option<&Filter>,
        page: Option<PageRequest>,
        attributes_to_get: Option<&[String]>,
        mut handler: H,
    ) -> ConnectorResult<Option<String>>
    where
        H: FnMut(ConnectorObject) -> bool + Send,
    {
        if let Some(page) = page {
            let result = self
                .search_page(object_class, filter, &page, attributes_to_get)
                .await?;
            for object in result.objects {
                if !handler(object) {
                    break;
                }
            }
            return Ok(result.cookie);
        }

        let mut request = PageRequest::new(self.page_size);
        let mut pages = 0usize;
        loop {
            let result = self
                .search_page(object_class, filter, &request, attributes_to_get)
                .await?;
            pages += 1;

            for object in result.objects {
                if !handler(object) {
                    debug!(pages, "Search stopped by handler");
                    return Ok(None);
                }
            }

            match result.cookie {
                Some(cookie) if request.cookie.as_deref() != Some(cookie.as_str()) => {
                    request = request.with_cookie(cookie);
                }
                Some(_) => {
                    warn!(resource = %self.resource.key, "Connector repeated page cookie, stopping search");
                    return Ok(None);
                }
                None => {
                    debug!(pages, "Search complete");
                    return Ok(None);
                }
            }
        }
    }

    /// Read a single remote object.
    pub async fn get_object(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        attributes_to_get: Option<&[String]>,
    ) -> ConnectorResult<Option<ConnectorObject>> {
        if !self.allows(ConnectorCapability::Search) {
            return Ok(None);
        }
        let object_class = object_class.clone();
        let uid = uid.clone();
        let attributes_to_get = attributes_to_get.map(<[String]>::to_vec);
        self.call("get", move |c| async move {
            c.get(&object_class, &uid, attributes_to_get.as_deref()).await
        })
        .await
    }

    /// Fetch one batch of changes since `token`.
    #[instrument(skip(self, token), fields(resource = %self.resource.key))]
    pub async fn sync(
        &self,
        object_class: &ObjectClass,
        token: Option<&SyncToken>,
        batch_size: u32,
    ) -> ConnectorResult<SyncResult> {
        if !self.allows(ConnectorCapability::Sync) {
            return Ok(SyncResult::default());
        }
        let object_class = object_class.clone();
        let token = token.cloned();
        self.call("sync", move |c| async move {
            c.sync(&object_class, token.as_ref(), batch_size).await
        })
        .await
    }

    /// Current change-log position of the resource.
    pub async fn latest_sync_token(
        &self,
        object_class: &ObjectClass,
    ) -> ConnectorResult<Option<SyncToken>> {
        if !self.allows(ConnectorCapability::Sync) {
            return Ok(None);
        }
        let object_class = object_class.clone();
        self.call("latest_sync_token", move |c| async move {
            c.latest_sync_token(&object_class).await
        })
        .await
        .map(Some)
    }

    /// Describe the remote schema.
    pub async fn schema(&self) -> ConnectorResult<Option<Schema>> {
        if !self.allows(ConnectorCapability::Schema) {
            return Ok(None);
        }
        self.call("schema", |c| async move { c.schema().await })
            .await
            .map(Some)
    }

    /// Validate the connector configuration.
    pub async fn validate(&self) -> ConnectorResult<()> {
        if !self.allows(ConnectorCapability::Validate) {
            return Ok(());
        }
        self.call("validate", |c| async move { c.validate().await })
            .await
    }

    /// Test the connection.
    pub async fn test(&self) -> ConnectorResult<()> {
        if !self.allows(ConnectorCapability::Test) {
            return Ok(());
        }
        self.call("test", |c| async move { c.test().await }).await
    }
}

//! Connector trait
//!
//! One trait covering every operation a connector may perform, inspired by
//! `ConnId`. Operations default to [`ConnectorError::UnsupportedOperation`] so
//! implementations only provide what the target system supports; which of
//! them may actually be called is decided by the resource's declared
//! capabilities.

use async_trait::async_trait;

use crate::error::{ConnectorError, ConnectorResult};
use crate::operation::{
    AttributeSet, ConnectorObject, Filter, ObjectClass, PageRequest, SearchResult, SyncResult,
    SyncToken, Uid,
};
use crate::schema::Schema;

/// A connector to one target system.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Get the display name for this connector instance.
    fn display_name(&self) -> &str;

    /// Verify credentials against the target system.
    ///
    /// Returns the UID of the authenticated account.
    async fn authenticate(
        &self,
        object_class: &ObjectClass,
        username: &str,
        password: &str,
    ) -> ConnectorResult<Uid> {
        let _ = (object_class, username, password);
        Err(ConnectorError::unsupported("authenticate"))
    }

    /// Create a new object in the target system.
    ///
    /// # Returns
    /// The unique identifier (UID) of the created object.
    async fn create(
        &self,
        object_class: &ObjectClass,
        attributes: AttributeSet,
    ) -> ConnectorResult<Uid> {
        let _ = (object_class, attributes);
        Err(ConnectorError::unsupported("create"))
    }

    /// Replace the given attributes of an existing object.
    ///
    /// # Returns
    /// The UID of the updated object (may change for some systems).
    async fn update(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        attributes: AttributeSet,
    ) -> ConnectorResult<Uid> {
        let _ = (object_class, uid, attributes);
        Err(ConnectorError::unsupported("update"))
    }

    /// Delete an object from the target system.
    async fn delete(&self, object_class: &ObjectClass, uid: &Uid) -> ConnectorResult<()> {
        let _ = (object_class, uid);
        Err(ConnectorError::unsupported("delete"))
    }

    /// Search one page of objects.
    ///
    /// # Arguments
    /// * `filter` - Optional search filter; `None` matches everything
    /// * `page` - Page size and the cookie of the previous page
    /// * `attributes_to_get` - Attributes to retrieve; `None` for all
    async fn search(
        &self,
        object_class: &ObjectClass,
        filter: Option<&Filter>,
        page: &PageRequest,
        attributes_to_get: Option<&[String]>,
    ) -> ConnectorResult<SearchResult> {
        let _ = (object_class, filter, page, attributes_to_get);
        Err(ConnectorError::unsupported("search"))
    }

    /// Fetch changes since `token`.
    ///
    /// When `token` is `None` the connector should return every current
    /// object as a create-or-update delta.
    async fn sync(
        &self,
        object_class: &ObjectClass,
        token: Option<&SyncToken>,
        batch_size: u32,
    ) -> ConnectorResult<SyncResult> {
        let _ = (object_class, token, batch_size);
        Err(ConnectorError::unsupported("sync"))
    }

    /// Current position of the change log.
    async fn latest_sync_token(&self, object_class: &ObjectClass) -> ConnectorResult<SyncToken> {
        let _ = object_class;
        Err(ConnectorError::unsupported("latest_sync_token"))
    }

    /// Describe the target system's object classes.
    async fn schema(&self) -> ConnectorResult<Schema> {
        Err(ConnectorError::unsupported("schema"))
    }

    /// Validate the connector configuration without contacting the target.
    async fn validate(&self) -> ConnectorResult<()> {
        Ok(())
    }

    /// Test the connection to the target system.
    async fn test(&self) -> ConnectorResult<()> {
        Err(ConnectorError::unsupported("test"))
    }

    /// Dispose of connector resources.
    ///
    /// Called when the connector is removed from the registry.
    async fn dispose(&self) -> ConnectorResult<()> {
        Ok(())
    }

    /// Read a single object by UID.
    async fn get(
        &self,
        object_class: &ObjectClass,
        uid: &Uid,
        attributes_to_get: Option<&[String]>,
    ) -> ConnectorResult<Option<ConnectorObject>> {
        let filter = Filter::eq(crate::operation::UID, uid.value());
        let result = self
            .search(object_class, Some(&filter), &PageRequest::new(1), attributes_to_get)
            .await?;
        Ok(result.objects.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct MockConnector {
        name: String,
        healthy: Arc<AtomicBool>,
    }

    impl MockConnector {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                healthy: Arc::new(AtomicBool::new(true)),
            }
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        fn display_name(&self) -> &str {
            &self.name
        }

        async fn test(&self) -> ConnectorResult<()> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ConnectorError::connection_failed("not healthy"))
            }
        }

        async fn search(
            &self,
            object_class: &ObjectClass,
            filter: Option<&Filter>,
            _page: &PageRequest,
            _attributes_to_get: Option<&[String]>,
        ) -> ConnectorResult<SearchResult> {
            let object = ConnectorObject::new(
                object_class.clone(),
                "uid-1",
                "rossini",
                AttributeSet::new(),
            );
            let objects = filter
                .map_or(true, |f| f.matches(&object))
                .then_some(object)
                .into_iter()
                .collect();
            Ok(SearchResult::new(objects))
        }
    }

    #[tokio::test]
    async fn test_unimplemented_operations_unsupported() {
        let connector = MockConnector::new("test");
        let err = connector
            .create(&ObjectClass::account(), AttributeSet::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_OPERATION");
        assert!(connector.validate().await.is_ok());
    }

    #[tokio::test]
    async fn test_connection_state() {
        let connector = MockConnector::new("test");
        assert!(connector.test().await.is_ok());
        connector.healthy.store(false, Ordering::SeqCst);
        assert!(connector.test().await.is_err());
    }

    #[tokio::test]
    async fn test_get_uses_search() {
        let connector = MockConnector::new("test");
        let found = connector
            .get(&ObjectClass::account(), &Uid::new("uid-1"), None)
            .await
            .unwrap();
        assert_eq!(found.unwrap().name, "rossini");

        let missing = connector
            .get(&ObjectClass::account(), &Uid::new("uid-2"), None)
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}

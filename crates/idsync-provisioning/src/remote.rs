//! Remote object lookup by connector key.

use tracing::debug;

use idsync_connector::operation::UID;
use idsync_connector::{
    ConnectorGateway, ConnectorObject, ConnectorResult, Filter, PageRequest, Provision, Uid,
};

/// Read the remote object whose connector key is `key_value`.
///
/// Keys mapped to `__UID__` are fetched directly; any other key attribute
/// is searched with an equality filter. Resources without the search
/// capability always yield `None`.
pub async fn read_remote(
    gateway: &ConnectorGateway,
    provision: &Provision,
    key_attr: &str,
    key_value: &str,
    attributes_to_get: Option<&[String]>,
) -> ConnectorResult<Option<ConnectorObject>> {
    if key_attr == UID {
        return gateway
            .get_object(&provision.object_class, &Uid::new(key_value), attributes_to_get)
            .await;
    }

    let filter = Filter::eq(key_attr, key_value);
    let page = gateway
        .search_page(
            &provision.object_class,
            Some(&filter),
            &PageRequest::new(2),
            attributes_to_get,
        )
        .await?;

    if page.objects.len() > 1 {
        debug!(
            resource = %gateway.key(),
            key_attr,
            key_value,
            "Several remote objects share a connector key, using the first"
        );
    }
    Ok(page.objects.into_iter().next())
}

/// Name of the remote attribute a provision's connector key is stored in.
#[must_use]
pub fn key_attribute(provision: &Provision) -> Option<&str> {
    provision
        .mapping
        .conn_object_key_item()
        .map(|item| item.ext_attr_name.as_str())
}

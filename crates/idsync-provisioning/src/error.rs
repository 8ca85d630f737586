//! Provisioning error types.

use thiserror::Error;

use idsync_connector::ConnectorError;
use idsync_core::{CoreError, ResourceKey};

/// Errors raised by the mapping, propagation and reconciliation engines.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// An internal attribute expression could not be parsed.
    #[error("Invalid expression '{expression}': {message}")]
    InvalidExpression { expression: String, message: String },

    /// A qualifier named a group, user, any object or membership the entity
    /// is not related to.
    #[error("No reference found for {qualifier}")]
    NoReferenceFound { qualifier: String },

    /// A provision has no connector key item.
    #[error("Provision for {any_type} on resource {resource} has no connector key mapping")]
    MissingConnectorKey {
        resource: ResourceKey,
        any_type: String,
    },

    /// No resource with this key is registered.
    #[error("Resource not found: {resource}")]
    ResourceNotFound { resource: ResourceKey },

    /// The resource has no provision for the any type.
    #[error("Resource {resource} has no provision for {any_type}")]
    ProvisionNotFound {
        resource: ResourceKey,
        any_type: String,
    },

    /// Expression evaluation failed.
    #[error("Expression error: {message}")]
    Expression { message: String },

    /// A reconciliation state transition failed.
    #[error("Reconciliation error: {message}")]
    Reconciliation { message: String },

    /// Invalid configuration value.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Connector error.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Entity store error.
    #[error("Store error: {0}")]
    Store(#[from] CoreError),
}

impl ProvisioningError {
    /// Create an invalid expression error.
    pub fn invalid_expression(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidExpression {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Create a no reference found error.
    pub fn no_reference(qualifier: impl Into<String>) -> Self {
        Self::NoReferenceFound {
            qualifier: qualifier.into(),
        }
    }

    /// Create an expression error.
    pub fn expression(message: impl Into<String>) -> Self {
        Self::Expression {
            message: message.into(),
        }
    }

    /// Create a reconciliation error.
    pub fn reconciliation(message: impl Into<String>) -> Self {
        Self::Reconciliation {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether the error aborts a whole job rather than one unit of work.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::MissingConnectorKey { .. }
                | Self::ResourceNotFound { .. }
                | Self::ProvisionNotFound { .. }
                | Self::Configuration { .. }
        )
    }
}

/// Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisioningError>;

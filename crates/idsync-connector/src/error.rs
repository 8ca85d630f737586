//! Connector error types
//!
//! Error definitions with transient/permanent classification for retry logic.

use thiserror::Error;

use idsync_core::ResourceKey;

/// Boxed foreign error carried as a source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Connection errors (usually transient)
    /// Failed to establish connection to target system.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Call did not complete within the resource timeout.
    #[error("Request timeout")]
    Timeout { timeout_secs: u64 },

    /// Target system is temporarily unavailable.
    #[error("target system unavailable: {message}")]
    TargetUnavailable { message: String },

    // Authentication errors (usually permanent)
    /// Invalid credentials provided.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    // Configuration errors (permanent)
    /// Connector configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// No connector registered for the resource.
    #[error("connector not found for resource {resource}")]
    ConnectorNotFound { resource: ResourceKey },

    /// The connector implementation does not support the operation.
    #[error("unsupported operation: {operation}")]
    UnsupportedOperation { operation: String },

    // Operation errors
    /// Operation failed.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Object already exists in target system (create conflict).
    #[error("object already exists: {identifier}")]
    ObjectAlreadyExists { identifier: String },

    /// Object not found in target system (update/delete target missing).
    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    /// Invalid data format.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    /// A non-domain failure surfaced by the gateway.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A foreign failure raised by a connector implementation.
    ///
    /// The gateway never propagates this variant; it is rewrapped as
    /// [`ConnectorError::InvalidArgument`].
    #[error("{message}")]
    Other {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    // Encryption errors
    /// Secret encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed { message: String },

    /// Secret decryption failed.
    #[error("decryption failed: {message}")]
    DecryptionFailed { message: String },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ConnectorError {
    /// Check if this error is transient and the operation should be retried.
    ///
    /// Transient errors are those caused by temporary conditions that may resolve
    /// themselves, such as network issues or temporary unavailability.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. }
                | ConnectorError::Timeout { .. }
                | ConnectorError::TargetUnavailable { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::Timeout { .. } => "TIMEOUT",
            ConnectorError::TargetUnavailable { .. } => "TARGET_UNAVAILABLE",
            ConnectorError::AuthenticationFailed => "AUTH_FAILED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::ConnectorNotFound { .. } => "CONNECTOR_NOT_FOUND",
            ConnectorError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            ConnectorError::OperationFailed { .. } => "OPERATION_FAILED",
            ConnectorError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            ConnectorError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            ConnectorError::InvalidData { .. } => "INVALID_DATA",
            ConnectorError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            ConnectorError::Other { .. } => "OTHER",
            ConnectorError::EncryptionFailed { .. } => "ENCRYPTION_FAILED",
            ConnectorError::DecryptionFailed { .. } => "DECRYPTION_FAILED",
            ConnectorError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        ConnectorError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ConnectorError::InvalidArgument {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a foreign error raised inside a connector.
    pub fn other(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        ConnectorError::Other {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        ConnectorError::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    /// Create an object not found error.
    pub fn object_not_found(identifier: impl Into<String>) -> Self {
        ConnectorError::ObjectNotFound {
            identifier: identifier.into(),
        }
    }

    /// Create an object already exists error.
    pub fn object_already_exists(identifier: impl Into<String>) -> Self {
        ConnectorError::ObjectAlreadyExists {
            identifier: identifier.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        ConnectorError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ConnectorError::Internal {
            message: message.into(),
        }
    }

    /// Rewrap non-domain failures as invalid-argument errors.
    ///
    /// Domain errors pass through unchanged.
    #[must_use]
    pub fn into_domain(self) -> Self {
        match self {
            ConnectorError::Other { message, source } => {
                ConnectorError::InvalidArgument { message, source }
            }
            other => other,
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

//! Storage error taxonomy shared by every provider.

use thiserror::Error;

/// Result type alias using `StorageError`.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The session id is absent. Expected, not logged as an error.
    #[error("session not found: {id}")]
    NotFound {
        /// Requested session id.
        id: String,
    },

    /// Payload present but undecodable, or not encodable for the backend.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transport, auth, or backend fault.
    #[error("{backend} backend unavailable: {message}")]
    BackendUnavailable {
        /// Backend label (`local`, `s3`, `edge`, `managed`, ...).
        backend: String,
        /// Underlying failure description.
        message: String,
    },

    /// A secondary write or delete failed under strict consistency.
    #[error("replication to {provider} failed: {source}")]
    ReplicationFailure {
        /// Name of the secondary that failed.
        provider: String,
        /// The secondary's error.
        #[source]
        source: Box<StorageError>,
    },

    /// Malformed filter or missing required configuration.
    #[error("validation error: {0}")]
    Validation(String),
}

impl StorageError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a backend unavailable error.
    #[must_use]
    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Wrap a secondary's error as a replication failure.
    #[must_use]
    pub fn replication(provider: impl Into<String>, source: Self) -> Self {
        Self::ReplicationFailure {
            provider: provider.into(),
            source: Box::new(source),
        }
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Returns true for [`StorageError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns the error code for logs and API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            Self::ReplicationFailure { .. } => "REPLICATION_FAILURE",
            Self::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

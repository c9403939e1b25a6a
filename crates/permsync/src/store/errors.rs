use thiserror::Error;

use crate::types::Subject;

/// Errors that can occur when reading from or writing to the permissions store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not serve the request.
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    /// The subject is not known to the store.
    #[error("Not found: {subject}")]
    NotFound { subject: Subject },
}

impl StoreError {
    /// Create an unavailable error.
    #[inline]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Whether the same call may succeed on a later attempt.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

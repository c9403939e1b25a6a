use std::time::Duration;

use thiserror::Error;

/// Errors returned by a [`PermsProvider`](super::PermsProvider) fetch.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The account or repository belongs to a different code host than the provider.
    #[error("service mismatch: want {want_type:?} - {want_id:?} but the {subject} has {got_type:?} - {got_id:?}")]
    ServiceMismatch {
        subject: &'static str,
        want_type: String,
        want_id: String,
        got_type: String,
        got_id: String,
    },

    /// The stored account payload could not be decoded.
    #[error("malformed external account data: {message}")]
    MalformedAccountData { message: String },

    /// A page request against the code host failed.
    ///
    /// `partial` holds the IDs accumulated from every page fetched before the failure.
    /// `retry_after` is set when the host said how long to wait, e.g. on a 429.
    #[error("code host API error: {message}")]
    HostApi {
        message: String,
        partial: Vec<String>,
        retry_after: Option<Duration>,
    },

    /// The provider cannot answer this kind of query.
    #[error("unsupported operation: {operation}")]
    Unsupported { operation: &'static str },
}

impl ProviderError {
    /// Create a malformed account data error.
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedAccountData {
            message: message.into(),
        }
    }

    /// Create a host API error carrying the IDs fetched so far.
    #[inline]
    pub fn host_api(message: impl Into<String>, partial: Vec<String>) -> Self {
        Self::HostApi {
            message: message.into(),
            partial,
            retry_after: None,
        }
    }

    /// Attach the host's requested wait to a host API error. Other variants are returned unchanged.
    #[must_use]
    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        if let Self::HostApi { retry_after, .. } = &mut self {
            *retry_after = Some(wait);
        }
        self
    }

    /// How long the host asked us to wait before trying again.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::HostApi { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether the same request may succeed on a later attempt.
    ///
    /// Only host API failures are transient; every other variant is a property of
    /// the configuration or the stored data.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::HostApi { .. })
    }

    /// IDs fetched before the failure, if any.
    #[must_use]
    pub fn partial_ids(&self) -> &[String] {
        match self {
            Self::HostApi { partial, .. } => partial,
            _ => &[],
        }
    }

    /// Consume the error, returning the IDs fetched before the failure.
    #[must_use]
    pub fn into_partial_ids(self) -> Vec<String> {
        match self {
            Self::HostApi { partial, .. } => partial,
            _ => Vec::new(),
        }
    }
}

/// Extract a short error message suitable for log fields.
///
/// Takes the first line of an error message; host error bodies can span many lines.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

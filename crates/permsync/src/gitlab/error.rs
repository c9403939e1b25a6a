//! GitLab API error types.

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use crate::http::{HttpError, HttpResponse};
use crate::provider::ProviderError;

pub use crate::provider::short_error_message;

/// Assumed wait, in seconds, when a 429 carries no reset hint.
const DEFAULT_RATE_LIMIT_WAIT_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum GitLabError {
    #[error("GitLab API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("GitLab rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Bad token, missing `sudo` scope, or impersonating a blocked user.
    #[error("GitLab authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("GitLab resource not found: {0}")]
    NotFound(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] HttpError),

    #[error("invalid JSON in GitLab response: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("invalid GitLab URL: {0}")]
    InvalidUrl(String),
}

impl GitLabError {
    /// Classify a non-success response.
    pub fn from_response(response: &HttpResponse) -> Self {
        let message = response.text();
        match response.status {
            401 | 403 => Self::Auth {
                status: response.status,
                message,
            },
            404 => Self::NotFound(message),
            429 => Self::RateLimited {
                reset_at: rate_limit_reset(response).unwrap_or_else(|| {
                    Utc::now() + chrono::Duration::seconds(DEFAULT_RATE_LIMIT_WAIT_SECS)
                }),
            },
            status => Self::Api { status, message },
        }
    }

    /// Convert into a provider error carrying the IDs fetched before the failure.
    ///
    /// A rate limit keeps its reset time as the wait before the next attempt.
    pub fn into_provider_error(self, partial: Vec<String>) -> ProviderError {
        let err = ProviderError::host_api(short_error_message(&self), partial);
        match self {
            Self::RateLimited { reset_at } => {
                // A reset time already in the past means "now".
                let wait = (reset_at - Utc::now()).to_std().unwrap_or_default();
                err.with_retry_after(wait)
            }
            _ => err,
        }
    }
}

impl From<url::ParseError> for GitLabError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// When the rate limit window resets, from `RateLimit-Reset` (Unix seconds)
/// or else `Retry-After` (seconds from now).
fn rate_limit_reset(response: &HttpResponse) -> Option<DateTime<Utc>> {
    if let Some(reset) = response.header("ratelimit-reset")
        && let Ok(secs) = reset.trim().parse::<i64>()
    {
        return Utc.timestamp_opt(secs, 0).single();
    }

    let retry_after = response.header("retry-after")?.trim().parse::<i64>().ok()?;
    Some(Utc::now() + chrono::Duration::seconds(retry_after))
}

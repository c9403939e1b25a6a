//! GitLab permissions providers.
//!
//! # Module Structure
//!
//! - [`error`] - Error types for GitLab API operations
//! - [`types`] - API response structures
//! - [`client`] - Client creation and pagination
//! - [`sudo`] - Provider impersonating users with an admin token
//! - [`oauth`] - Provider using each account's own OAuth token
//!
//! # Example
//!
//! ```ignore
//! use permsync::gitlab::SudoProvider;
//! use permsync::provider::{ApiRateLimiter, ProviderRegistry, rate_limits};
//!
//! let limiter = ApiRateLimiter::new(rate_limits::GITLAB_DEFAULT_RPS);
//! let provider = SudoProvider::new("https://gitlab.example.com", token, Some(limiter))?;
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register(Arc::new(provider));
//! ```

mod client;
mod error;
mod oauth;
mod sudo;
mod types;

/// The `service_type` of GitLab accounts and repositories.
pub const SERVICE_TYPE: &str = "gitlab";

pub use client::{
    Credential, GitLabClient, MAX_PAGE_SIZE, Page, project_members_url, user_projects_url,
};
pub use error::GitLabError;
pub use oauth::OAuthProvider;
pub use sudo::SudoProvider;
pub use types::{
    ExternalId, GitLabMember, GitLabOAuthToken, GitLabProject, GitLabUser, access_level,
};

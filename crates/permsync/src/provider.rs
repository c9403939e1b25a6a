//! Code host permissions provider contract.
//!
//! A [`PermsProvider`] answers two questions for one code host instance:
//! which private projects a user can read, and which users can read a project.
//! The syncer picks the provider for an account or repository through the
//! [`ProviderRegistry`] using the `(service_type, service_id)` pair.
//!
//! # Example
//!
//! ```ignore
//! use permsync::provider::{PermsProvider, ProviderRegistry};
//!
//! async fn project_ids(registry: &ProviderRegistry, account: &ExternalAccount) -> Vec<String> {
//!     let Some(provider) = registry.get(&account.service_type, &account.service_id) else {
//!         return Vec::new();
//!     };
//!     match provider.fetch_user_perms(account).await {
//!         Ok(ids) => ids,
//!         Err(err) => err.into_partial_ids(),
//!     }
//! }
//! ```

mod errors;
mod rate_limit;
mod registry;
mod types;

pub use errors::{ProviderError, Result, short_error_message};
pub use rate_limit::{ApiRateLimiter, rate_limits};
pub use registry::ProviderRegistry;
pub use types::{CodeHost, PermsProvider};

use async_trait::async_trait;

use crate::types::{ExternalAccount, ExternalRepoSpec};

use super::errors::{ProviderError, Result};

/// Identity of one code host instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeHost {
    /// Kind of code host, e.g. `"gitlab"`.
    pub service_type: String,
    /// Normalized base URL of the instance, always ending in `/`.
    pub service_id: String,
}

impl CodeHost {
    /// Create a code host identity, normalizing the base URL to end with a single `/`.
    pub fn new(service_type: impl Into<String>, base_url: &str) -> Self {
        Self {
            service_type: service_type.into(),
            service_id: format!("{}/", base_url.trim_end_matches('/')),
        }
    }

    /// Fail with [`ProviderError::ServiceMismatch`] unless the account lives on this host.
    pub fn check_account(&self, account: &ExternalAccount) -> Result<()> {
        self.check("account", &account.service_type, &account.service_id)
    }

    /// Fail with [`ProviderError::ServiceMismatch`] unless the repository lives on this host.
    pub fn check_repo(&self, repo: &ExternalRepoSpec) -> Result<()> {
        self.check("repository", &repo.service_type, &repo.service_id)
    }

    fn check(&self, subject: &'static str, service_type: &str, service_id: &str) -> Result<()> {
        if service_type == self.service_type && service_id == self.service_id {
            return Ok(());
        }
        Err(ProviderError::ServiceMismatch {
            subject,
            want_type: self.service_type.clone(),
            want_id: self.service_id.clone(),
            got_type: service_type.to_string(),
            got_id: service_id.to_string(),
        })
    }
}

/// Fetches authoritative access lists from one code host instance.
///
/// Implementations must validate the service identity of their input before
/// any network access, and on a failed page must return the IDs accumulated
/// from earlier pages inside [`ProviderError::HostApi`].
#[async_trait]
pub trait PermsProvider: Send + Sync {
    /// The code host instance this provider talks to.
    fn code_host(&self) -> &CodeHost;

    /// List the IDs of the private projects `account` can read on the code host.
    ///
    /// The IDs have the same value as [`ExternalRepoSpec::id`].
    async fn fetch_user_perms(&self, account: &ExternalAccount) -> Result<Vec<String>>;

    /// List the IDs of every code host user who can read `repo`, directly or
    /// through group membership.
    ///
    /// The IDs have the same value as [`ExternalAccount::account_id`].
    async fn fetch_repo_perms(&self, repo: &ExternalRepoSpec) -> Result<Vec<String>>;

    /// Whether [`Self::fetch_repo_perms`] can answer at all. Repositories on a
    /// host whose provider returns `false` are skipped without a fetch.
    fn supports_repo_perms(&self) -> bool {
        true
    }
}

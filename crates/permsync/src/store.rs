//! The permissions store contract.
//!
//! Persistence lives outside this crate; the syncer and scheduler only see
//! the narrow [`PermsStore`] trait. [`MemoryStore`] is a process-local
//! implementation for tests and single-process deployments.

mod errors;
mod memory;

use async_trait::async_trait;

use crate::types::{ExternalAccount, ExternalRepoSpec, PermissionsRecord, RepoId, UserId};

pub use errors::{Result, StoreError};
pub use memory::{DEFAULT_OLDEST_BATCH_SIZE, MemoryStore};

/// Scan queries, subject lookups and write-back used by the sync core.
#[async_trait]
pub trait PermsStore: Send + Sync {
    /// Users that have never had permissions stored.
    async fn users_missing_perms(&self) -> Result<Vec<UserId>>;

    /// Repositories that have never had permissions stored.
    async fn repos_missing_perms(&self) -> Result<Vec<RepoId>>;

    /// Users whose stored permissions are the least recently synced.
    ///
    /// Implementations order by ascending last sync time and bound the batch size.
    async fn users_oldest_perms(&self) -> Result<Vec<UserId>>;

    /// Repositories whose stored permissions are the least recently synced.
    async fn repos_oldest_perms(&self) -> Result<Vec<RepoId>>;

    /// The user's accounts on code hosts.
    async fn user_external_accounts(&self, user_id: UserId) -> Result<Vec<ExternalAccount>>;

    /// The repository's identity on its code host, if it has one.
    async fn repo_external_spec(&self, repo_id: RepoId) -> Result<Option<ExternalRepoSpec>>;

    /// Replace the stored record for `record.subject`.
    async fn save_permissions(&self, record: PermissionsRecord) -> Result<()>;
}

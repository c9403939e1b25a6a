//! In-memory [`PermsStore`] implementation.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{
    ExternalAccount, ExternalRepoSpec, PermissionsRecord, RepoId, Subject, UserId,
};

use super::errors::{Result, StoreError};
use super::PermsStore;

/// Default number of subjects returned by the "oldest permissions" scans.
pub const DEFAULT_OLDEST_BATCH_SIZE: usize = 100;

#[derive(Debug, Default)]
struct MemoryStoreInner {
    users: BTreeMap<UserId, Vec<ExternalAccount>>,
    repos: BTreeMap<RepoId, Option<ExternalRepoSpec>>,
    records: HashMap<Subject, PermissionsRecord>,
}

/// A process-local store, used by tests and by the CLI runner.
///
/// Scans return IDs in ascending order; the "oldest permissions" scans order
/// by ascending `synced_at` (ties broken by ID) and return at most
/// `oldest_batch_size` subjects.
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
    oldest_batch_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_OLDEST_BATCH_SIZE)
    }
}

impl MemoryStore {
    pub fn new(oldest_batch_size: usize) -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
            oldest_batch_size,
        }
    }

    /// Register a user together with their external accounts.
    pub async fn add_user(&self, user_id: UserId, accounts: Vec<ExternalAccount>) {
        self.inner.write().await.users.insert(user_id, accounts);
    }

    /// Register a repository and, when it is mirrored from a code host, its external spec.
    pub async fn add_repo(&self, repo_id: RepoId, spec: Option<ExternalRepoSpec>) {
        self.inner.write().await.repos.insert(repo_id, spec);
    }

    /// The stored record for a subject.
    pub async fn record(&self, subject: Subject) -> Option<PermissionsRecord> {
        self.inner.read().await.records.get(&subject).cloned()
    }

    /// Number of stored records.
    pub async fn record_count(&self) -> usize {
        self.inner.read().await.records.len()
    }

    fn oldest<T: Copy + Ord>(
        &self,
        inner: &MemoryStoreInner,
        ids: impl Iterator<Item = T>,
        subject: impl Fn(T) -> Subject,
    ) -> Vec<T> {
        let mut synced: Vec<_> = ids
            .filter_map(|id| inner.records.get(&subject(id)).map(|r| (r.synced_at, id)))
            .collect();
        synced.sort();
        synced
            .into_iter()
            .take(self.oldest_batch_size)
            .map(|(_, id)| id)
            .collect()
    }
}

#[async_trait]
impl PermsStore for MemoryStore {
    async fn users_missing_perms(&self) -> Result<Vec<UserId>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .keys()
            .copied()
            .filter(|id| !inner.records.contains_key(&Subject::User(*id)))
            .collect())
    }

    async fn repos_missing_perms(&self) -> Result<Vec<RepoId>> {
        let inner = self.inner.read().await;
        Ok(inner
            .repos
            .keys()
            .copied()
            .filter(|id| !inner.records.contains_key(&Subject::Repo(*id)))
            .collect())
    }

    async fn users_oldest_perms(&self) -> Result<Vec<UserId>> {
        let inner = self.inner.read().await;
        Ok(self.oldest(&inner, inner.users.keys().copied(), Subject::User))
    }

    async fn repos_oldest_perms(&self) -> Result<Vec<RepoId>> {
        let inner = self.inner.read().await;
        Ok(self.oldest(&inner, inner.repos.keys().copied(), Subject::Repo))
    }

    async fn user_external_accounts(&self, user_id: UserId) -> Result<Vec<ExternalAccount>> {
        self.inner
            .read()
            .await
            .users
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                subject: Subject::User(user_id),
            })
    }

    async fn repo_external_spec(&self, repo_id: RepoId) -> Result<Option<ExternalRepoSpec>> {
        self.inner
            .read()
            .await
            .repos
            .get(&repo_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                subject: Subject::Repo(repo_id),
            })
    }

    async fn save_permissions(&self, record: PermissionsRecord) -> Result<()> {
        self.inner
            .write()
            .await
            .records
            .insert(record.subject, record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn gitlab_account(id: i64) -> ExternalAccount {
        ExternalAccount {
            service_type: "gitlab".to_string(),
            service_id: "https://gitlab.com/".to_string(),
            account_id: id.to_string(),
            account_data: serde_json::json!({ "id": id }),
            auth_data: None,
        }
    }

    #[tokio::test]
    async fn test_missing_perms_lists_only_subjects_without_records() {
        let store = MemoryStore::default();
        store.add_user(1, vec![gitlab_account(11)]).await;
        store.add_user(2, vec![gitlab_account(12)]).await;
        store.add_repo(RepoId(5), None).await;

        store
            .save_permissions(PermissionsRecord::new(
                Subject::User(1),
                Vec::new(),
                Utc::now(),
                false,
            ))
            .await
            .expect("save should succeed");

        assert_eq!(store.users_missing_perms().await.unwrap(), vec![2]);
        assert_eq!(store.repos_missing_perms().await.unwrap(), vec![RepoId(5)]);
    }

    #[tokio::test]
    async fn test_oldest_perms_orders_by_synced_at_and_honors_batch_size() {
        let store = MemoryStore::new(2);
        let now = Utc::now();
        for (user, age_days) in [(1, 1), (2, 20), (3, 10)] {
            store.add_user(user, Vec::new()).await;
            store
                .save_permissions(PermissionsRecord::new(
                    Subject::User(user),
                    Vec::new(),
                    now - Duration::days(age_days),
                    false,
                ))
                .await
                .unwrap();
        }
        store.add_user(4, Vec::new()).await;

        assert_eq!(store.users_oldest_perms().await.unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_repos_oldest_perms_skips_repos_without_records() {
        let store = MemoryStore::default();
        let now = Utc::now();
        store.add_repo(RepoId(1), None).await;
        store.add_repo(RepoId(2), None).await;
        store
            .save_permissions(PermissionsRecord::new(
                Subject::Repo(RepoId(2)),
                vec!["9".to_string()],
                now,
                false,
            ))
            .await
            .unwrap();

        assert_eq!(store.repos_oldest_perms().await.unwrap(), vec![RepoId(2)]);
    }

    #[tokio::test]
    async fn test_save_permissions_last_write_wins() {
        let store = MemoryStore::default();
        let subject = Subject::User(7);
        let now = Utc::now();

        store
            .save_permissions(PermissionsRecord::new(
                subject,
                vec!["1".to_string(), "2".to_string()],
                now - Duration::hours(1),
                false,
            ))
            .await
            .unwrap();
        store
            .save_permissions(PermissionsRecord::new(subject, vec!["3".to_string()], now, true))
            .await
            .unwrap();

        let record = store.record(subject).await.expect("record stored");
        assert!(record.partial);
        assert_eq!(record.granted_ids.len(), 1);
        assert!(record.granted_ids.contains("3"));
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_lookups_report_unknown_subjects() {
        let store = MemoryStore::default();
        store.add_user(1, vec![gitlab_account(11)]).await;

        assert_eq!(store.user_external_accounts(1).await.unwrap().len(), 1);
        let err = store
            .user_external_accounts(99)
            .await
            .expect_err("unknown user");
        assert!(matches!(
            err,
            StoreError::NotFound {
                subject: Subject::User(99)
            }
        ));
        assert!(store.repo_external_spec(RepoId(1)).await.is_err());
    }
}

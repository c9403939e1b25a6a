//! Bounded-concurrency permissions sync workers.
//!
//! [`PermsSyncer`] owns the request queue. Callers enqueue subjects with
//! [`PermsSyncer::schedule_users`] / [`PermsSyncer::schedule_repos`]; the
//! workers started by [`PermsSyncer::run`] take the highest-priority, oldest
//! request, resolve the subject's code host identities from the store, fetch
//! from the matching provider and write the result back.
//!
//! A subject that hit a transient failure goes back in the queue at low
//! priority and is not dispatched again until its requeue delay has passed. A
//! subject that was skipped or failed permanently ignores new enqueues for
//! [`SyncerOptions::skip_hold`], so scheduling rounds stop re-queueing it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::error::EnqueueError;
use super::progress::{SyncEvent, SyncEventCallback, emit};
use super::queue::{Completion, SyncQueue};
use super::types::{MIN_REQUEUE_DELAY, Priority, SyncerOptions};
use crate::provider::{self, ProviderRegistry, short_error_message};
use crate::retry::with_retry;
use crate::store::{PermsStore, StoreError};
use crate::types::{PermissionsRecord, RepoId, Subject, UserId};

/// Drains a deduplicated priority queue of sync requests.
///
/// Cloning is cheap and every clone shares the same queue, so the scheduler
/// and any number of callers can enqueue while one task runs the workers.
#[derive(Clone)]
pub struct PermsSyncer {
    store: Arc<dyn PermsStore>,
    providers: Arc<ProviderRegistry>,
    queue: Arc<SyncQueue>,
    options: SyncerOptions,
    on_event: Option<Arc<SyncEventCallback>>,
}

/// IDs and failures accumulated over the provider calls for one subject.
#[derive(Debug, Default)]
struct Fetched {
    ids: Vec<String>,
    succeeded: usize,
    transient: Option<String>,
    /// Longest wait any host asked for.
    retry_after: Option<Duration>,
    permanent: Option<String>,
}

impl Fetched {
    fn record(&mut self, subject: Subject, result: provider::Result<Vec<String>>) {
        match result {
            Ok(ids) => {
                self.succeeded += 1;
                self.ids.extend(ids);
            }
            Err(err) if err.is_retryable() => {
                let message = short_error_message(&err);
                let wait = err.retry_after();
                self.retry_after = self.retry_after.max(wait);
                let ids = err.into_partial_ids();
                tracing::warn!(
                    %subject,
                    fetched = ids.len(),
                    retry_after = ?wait,
                    error = %message,
                    "Permissions fetch failed"
                );
                self.ids.extend(ids);
                self.transient = Some(message);
            }
            Err(err) => {
                let message = short_error_message(&err);
                tracing::warn!(%subject, error = %message, "Permissions fetch failed permanently");
                self.permanent = Some(message);
            }
        }
    }
}

impl PermsSyncer {
    pub fn new(
        store: Arc<dyn PermsStore>,
        providers: Arc<ProviderRegistry>,
        options: SyncerOptions,
    ) -> Self {
        Self {
            store,
            providers,
            queue: Arc::new(SyncQueue::new()),
            options,
            on_event: None,
        }
    }

    /// Report every finished sync to `callback`.
    #[must_use]
    pub fn with_event_callback(mut self, callback: SyncEventCallback) -> Self {
        self.on_event = Some(Arc::new(callback));
        self
    }

    /// Enqueue users for a permissions sync.
    ///
    /// Never blocks on I/O. A user already queued is upgraded to `priority` if
    /// that is higher; a user being synced right now is left alone. Returns the
    /// number of users newly queued or upgraded.
    pub fn schedule_users(
        &self,
        priority: Priority,
        user_ids: impl IntoIterator<Item = UserId>,
    ) -> Result<usize, EnqueueError> {
        self.queue
            .enqueue_many(priority, user_ids.into_iter().map(Subject::User))
    }

    /// Enqueue repositories for a permissions sync. Same rules as [`Self::schedule_users`].
    pub fn schedule_repos(
        &self,
        priority: Priority,
        repo_ids: impl IntoIterator<Item = RepoId>,
    ) -> Result<usize, EnqueueError> {
        self.queue
            .enqueue_many(priority, repo_ids.into_iter().map(Subject::Repo))
    }

    /// Number of requests waiting for a worker.
    pub fn queued_len(&self) -> usize {
        self.queue.queued_len()
    }

    /// Number of subjects being synced right now.
    pub fn in_flight_len(&self) -> usize {
        self.queue.in_flight_len()
    }

    /// The priority `subject` is queued at, if it is waiting for a worker.
    pub fn queued_priority(&self, subject: Subject) -> Option<Priority> {
        self.queue.queued_priority(subject)
    }

    /// When a requeued `subject` becomes eligible for dispatch again.
    ///
    /// `None` if the subject is not waiting out a requeue delay.
    pub fn retry_at(&self, subject: Subject) -> Option<tokio::time::Instant> {
        self.queue.not_before(subject)
    }

    /// Whether enqueues of `subject` are ignored because it was recently
    /// skipped or failed permanently.
    pub fn is_held(&self, subject: Subject) -> bool {
        self.queue.is_held(subject)
    }

    /// Whether the syncer has shut down and rejects enqueues.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Run `options.concurrency` workers until `cancel` fires.
    ///
    /// On cancellation every in-flight fetch is dropped, the queue is closed
    /// and this returns once all workers have stopped.
    pub async fn run(&self, cancel: CancellationToken) {
        let concurrency = self.options.concurrency.max(1);
        tracing::info!(concurrency, "Permissions syncer started");

        let mut workers = JoinSet::new();
        for worker_id in 0..concurrency {
            let syncer = self.clone();
            let cancel = cancel.clone();
            workers.spawn(async move { syncer.worker_loop(worker_id, cancel).await });
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result
                && e.is_panic()
            {
                tracing::error!(error = %e, "Sync worker panicked");
            }
        }

        self.queue.close();
        tracing::info!("Permissions syncer stopped");
    }

    async fn worker_loop(self, worker_id: usize, cancel: CancellationToken) {
        while let Some(request) = self.queue.next(&cancel).await {
            let subject = request.subject;
            tracing::debug!(
                worker_id,
                %subject,
                priority = ?request.priority,
                waited_ms = request.enqueued_at.elapsed().as_millis() as u64,
                "Syncing permissions"
            );

            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.queue.complete(subject, Completion::Done);
                    tracing::debug!(worker_id, %subject, "Sync cancelled");
                    break;
                }
                event = self.sync_subject(subject) => event,
            };

            self.finish_request(event);
        }
        tracing::debug!(worker_id, "Sync worker stopped");
    }

    fn finish_request(&self, event: SyncEvent) {
        let subject = event.subject();
        self.queue.complete(subject, self.completion(&event));

        match &event {
            SyncEvent::Synced {
                granted, partial, ..
            } => {
                tracing::debug!(%subject, granted, partial, "Permissions synced");
            }
            SyncEvent::Requeued {
                granted,
                reason,
                retry_in,
                ..
            } => {
                tracing::debug!(
                    %subject,
                    granted,
                    retry_in_secs = retry_in.as_secs(),
                    reason = %reason,
                    "Permissions sync requeued"
                );
            }
            SyncEvent::Skipped { reason, .. } => {
                tracing::debug!(%subject, reason = %reason, "Permissions sync skipped");
            }
            SyncEvent::Failed { error, .. } => {
                tracing::warn!(%subject, error = %error, "Permissions sync failed");
            }
        }

        emit(self.on_event.as_deref(), event);
    }

    fn completion(&self, event: &SyncEvent) -> Completion {
        match event {
            SyncEvent::Requeued { retry_in, .. } => Completion::Requeue {
                priority: Priority::Low,
                after: *retry_in,
            },
            SyncEvent::Skipped { .. } | SyncEvent::Failed { .. } => {
                Completion::Hold(self.options.skip_hold)
            }
            SyncEvent::Synced { .. } => Completion::Done,
        }
    }

    /// Wait before redispatching: the host's hint if it gave one, never below
    /// [`MIN_REQUEUE_DELAY`].
    fn requeue_delay(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or(self.options.requeue_delay)
            .max(MIN_REQUEUE_DELAY)
    }

    fn requeued(
        &self,
        subject: Subject,
        granted: usize,
        reason: String,
        retry_after: Option<Duration>,
    ) -> SyncEvent {
        SyncEvent::Requeued {
            subject,
            granted,
            reason,
            retry_in: self.requeue_delay(retry_after),
        }
    }

    /// Take the next queued request without syncing it.
    #[cfg(test)]
    pub(crate) fn take_next(&self) -> Option<super::types::SyncRequest> {
        self.queue.try_take()
    }

    /// Take one queued request and sync it, without waiting.
    #[cfg(test)]
    pub(crate) async fn sync_next(&self) -> Option<SyncEvent> {
        let request = self.queue.try_take()?;
        let event = self.sync_subject(request.subject).await;
        self.finish_request(event.clone());
        Some(event)
    }

    async fn sync_subject(&self, subject: Subject) -> SyncEvent {
        match subject {
            Subject::User(user_id) => self.sync_user(user_id).await,
            Subject::Repo(repo_id) => self.sync_repo(repo_id).await,
        }
    }

    async fn sync_user(&self, user_id: UserId) -> SyncEvent {
        let subject = Subject::User(user_id);
        let accounts = match self.store.user_external_accounts(user_id).await {
            Ok(accounts) => accounts,
            Err(err) => return self.store_read_failed(subject, err),
        };

        let mut fetched = Fetched::default();
        for account in &accounts {
            let Some(provider) = self
                .providers
                .get(&account.service_type, &account.service_id)
            else {
                tracing::debug!(
                    %subject,
                    service_type = %account.service_type,
                    service_id = %account.service_id,
                    "No permissions provider for account"
                );
                continue;
            };
            fetched.record(subject, provider.fetch_user_perms(account).await);
        }

        // Users without any syncable account still get an (empty) record so
        // they leave the "missing permissions" scan.
        self.write_back(subject, fetched).await
    }

    async fn sync_repo(&self, repo_id: RepoId) -> SyncEvent {
        let subject = Subject::Repo(repo_id);
        let spec = match self.store.repo_external_spec(repo_id).await {
            Ok(Some(spec)) => spec,
            Ok(None) => {
                return SyncEvent::Skipped {
                    subject,
                    reason: "no external repository".to_string(),
                };
            }
            Err(err) => return self.store_read_failed(subject, err),
        };

        let Some(provider) = self.providers.get(&spec.service_type, &spec.service_id) else {
            return SyncEvent::Skipped {
                subject,
                reason: format!(
                    "no permissions provider for {} - {}",
                    spec.service_type, spec.service_id
                ),
            };
        };
        if !provider.supports_repo_perms() {
            return SyncEvent::Skipped {
                subject,
                reason: format!(
                    "permissions provider for {} - {} cannot list repository access",
                    spec.service_type, spec.service_id
                ),
            };
        }

        let mut fetched = Fetched::default();
        fetched.record(subject, provider.fetch_repo_perms(&spec).await);
        self.write_back(subject, fetched).await
    }

    async fn write_back(&self, subject: Subject, fetched: Fetched) -> SyncEvent {
        let Fetched {
            ids,
            succeeded,
            transient,
            retry_after,
            permanent,
        } = fetched;

        // Nothing was retrieved: keep whatever was stored before.
        if succeeded == 0 && ids.is_empty() {
            if let Some(reason) = transient {
                return self.requeued(subject, 0, reason, retry_after);
            }
            if let Some(error) = permanent {
                return SyncEvent::Failed { subject, error };
            }
        }

        let partial = transient.is_some() || permanent.is_some();
        let record = PermissionsRecord::new(subject, ids, Utc::now(), partial);
        let granted = record.granted_ids.len();

        if let Err(err) = self.save(record).await {
            let reason = format!("save permissions: {}", short_error_message(&err));
            return self.requeued(subject, 0, reason, None);
        }

        match transient {
            Some(reason) => self.requeued(subject, granted, reason, retry_after),
            None => SyncEvent::Synced {
                subject,
                granted,
                partial,
            },
        }
    }

    async fn save(&self, record: PermissionsRecord) -> Result<(), StoreError> {
        let label = record.subject.to_string();
        with_retry(
            || self.store.save_permissions(record.clone()),
            &self.options.store_retry,
            StoreError::is_retryable,
            &label,
        )
        .await
    }

    fn store_read_failed(&self, subject: Subject, err: StoreError) -> SyncEvent {
        let message = short_error_message(&err);
        if err.is_retryable() {
            tracing::warn!(%subject, error = %message, "Store lookup failed");
            self.requeued(subject, 0, message, None)
        } else {
            SyncEvent::Skipped {
                subject,
                reason: message,
            }
        }
    }
}

//! Periodic scheduling of permissions syncs.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use super::error::{ScheduleError, ScheduleStage};
use super::syncer::PermsSyncer;
use super::types::{Priority, ScheduleSummary};
use crate::store::PermsStore;

/// Shortest accepted interval between scheduling rounds.
pub const MIN_SCHEDULE_INTERVAL: Duration = Duration::from_secs(1);

/// Decides which subjects need a permissions refresh and hands them to the syncer.
///
/// The scheduler never fetches anything itself. Each round enqueues, in this
/// order: users and repositories that have no permissions at all (high
/// priority), then users and repositories whose permissions are the oldest
/// (low priority).
pub struct PermsScheduler {
    store: Arc<dyn PermsStore>,
    syncer: PermsSyncer,
    interval: Duration,
}

impl PermsScheduler {
    /// Create a scheduler running a round every `interval` (at least [`MIN_SCHEDULE_INTERVAL`]).
    pub fn new(store: Arc<dyn PermsStore>, syncer: PermsSyncer, interval: Duration) -> Self {
        Self {
            store,
            syncer,
            interval: interval.max(MIN_SCHEDULE_INTERVAL),
        }
    }

    pub fn syncer(&self) -> &PermsSyncer {
        &self.syncer
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one scheduling round.
    ///
    /// A failing scan or enqueue stops the round; stages after it are not run.
    pub async fn schedule(&self) -> Result<ScheduleSummary, ScheduleError> {
        let mut summary = ScheduleSummary::default();

        let users = self
            .store
            .users_missing_perms()
            .await
            .map_err(|source| scan_error(ScheduleStage::UsersMissing, source))?;
        summary.users_missing = self
            .syncer
            .schedule_users(Priority::High, users)
            .map_err(|source| enqueue_error(ScheduleStage::UsersMissing, source))?;

        let repos = self
            .store
            .repos_missing_perms()
            .await
            .map_err(|source| scan_error(ScheduleStage::ReposMissing, source))?;
        summary.repos_missing = self
            .syncer
            .schedule_repos(Priority::High, repos)
            .map_err(|source| enqueue_error(ScheduleStage::ReposMissing, source))?;

        let users = self
            .store
            .users_oldest_perms()
            .await
            .map_err(|source| scan_error(ScheduleStage::UsersOldest, source))?;
        summary.users_oldest = self
            .syncer
            .schedule_users(Priority::Low, users)
            .map_err(|source| enqueue_error(ScheduleStage::UsersOldest, source))?;

        let repos = self
            .store
            .repos_oldest_perms()
            .await
            .map_err(|source| scan_error(ScheduleStage::ReposOldest, source))?;
        summary.repos_oldest = self
            .syncer
            .schedule_repos(Priority::Low, repos)
            .map_err(|source| enqueue_error(ScheduleStage::ReposOldest, source))?;

        tracing::debug!(
            users_missing = summary.users_missing,
            repos_missing = summary.repos_missing,
            users_oldest = summary.users_oldest,
            repos_oldest = summary.repos_oldest,
            "Scheduled permissions syncs"
        );
        Ok(summary)
    }

    /// Start the syncer and run a scheduling round every interval until `cancel` fires.
    ///
    /// The first round runs one interval after start. A failed round is logged
    /// and the next one runs on schedule. Returns after the syncer has stopped.
    pub async fn run(&self, cancel: CancellationToken) {
        let syncer_task = {
            let syncer = self.syncer.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { syncer.run(cancel).await })
        };

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Permissions scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        result = self.schedule() => {
                            if let Err(e) = result {
                                tracing::error!(stage = %e.stage(), error = %e, "Scheduling round failed");
                            }
                        }
                    }
                }
            }
        }

        if let Err(e) = syncer_task.await {
            tracing::error!(error = %e, "Permissions syncer task failed");
        }
        tracing::info!("Permissions scheduler stopped");
    }
}

fn scan_error(stage: ScheduleStage, source: crate::store::StoreError) -> ScheduleError {
    ScheduleError::Scan { stage, source }
}

fn enqueue_error(stage: ScheduleStage, source: super::error::EnqueueError) -> ScheduleError {
    ScheduleError::Enqueue { stage, source }
}

//! Shared sync types and constants.

use std::time::Duration;

use tokio::time::Instant;

use crate::retry::RetryConfig;
use crate::types::Subject;

/// Default number of concurrent sync workers.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default time between scheduling rounds.
pub const DEFAULT_SCHEDULE_INTERVAL: Duration = Duration::from_secs(60);

/// Default wait before a subject that hit a transient host error is dispatched again.
pub const DEFAULT_REQUEUE_DELAY: Duration = DEFAULT_SCHEDULE_INTERVAL;

/// Shortest wait before a requeued subject is dispatched again, even when the
/// host asks for less.
pub const MIN_REQUEUE_DELAY: Duration = Duration::from_secs(1);

/// Default time a skipped or permanently failed subject ignores new enqueues.
pub const DEFAULT_SKIP_HOLD: Duration = Duration::from_secs(60 * 60);

/// Dispatch priority of a sync request. `High` is always dispatched before `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    /// Refresh of a subject that already has permissions stored.
    Low,
    /// First sync of a subject with no permissions stored.
    High,
}

/// A request waiting in (or just taken from) the syncer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRequest {
    pub subject: Subject,
    pub priority: Priority,
    /// Enqueue order; lower values were enqueued earlier.
    pub seq: u64,
    pub enqueued_at: Instant,
}

/// Options for [`PermsSyncer`](super::PermsSyncer).
#[derive(Debug, Clone)]
pub struct SyncerOptions {
    /// Number of worker tasks draining the queue.
    pub concurrency: usize,
    /// Backoff for store write-back.
    pub store_retry: RetryConfig,
    /// Wait before redispatching a requeued subject when the host gave no hint.
    pub requeue_delay: Duration,
    /// How long a skipped or permanently failed subject ignores new enqueues.
    pub skip_hold: Duration,
}

impl Default for SyncerOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            store_retry: RetryConfig::default(),
            requeue_delay: DEFAULT_REQUEUE_DELAY,
            skip_hold: DEFAULT_SKIP_HOLD,
        }
    }
}

/// Number of subjects queued or upgraded by each stage of a scheduling round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub users_missing: usize,
    pub repos_missing: usize,
    pub users_oldest: usize,
    pub repos_oldest: usize,
}

impl ScheduleSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.users_missing + self.repos_missing + self.users_oldest + self.repos_oldest
    }
}

use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// Returned when enqueueing into a syncer that has shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("syncer is closed")]
    Closed,
}

/// The four steps of a scheduling round, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleStage {
    UsersMissing,
    ReposMissing,
    UsersOldest,
    ReposOldest,
}

impl ScheduleStage {
    /// Every stage in execution order.
    pub const ALL: [ScheduleStage; 4] = [
        ScheduleStage::UsersMissing,
        ScheduleStage::ReposMissing,
        ScheduleStage::UsersOldest,
        ScheduleStage::ReposOldest,
    ];

    fn subjects(self) -> &'static str {
        match self {
            ScheduleStage::UsersMissing => "users with no permissions",
            ScheduleStage::ReposMissing => "repositories with no permissions",
            ScheduleStage::UsersOldest => "users with oldest permissions",
            ScheduleStage::ReposOldest => "repositories with oldest permissions",
        }
    }
}

impl fmt::Display for ScheduleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subjects())
    }
}

/// A scheduling round stopped early.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("scan {stage}: {source}")]
    Scan {
        stage: ScheduleStage,
        #[source]
        source: StoreError,
    },

    #[error("schedule requests for {stage}: {source}")]
    Enqueue {
        stage: ScheduleStage,
        #[source]
        source: EnqueueError,
    },
}

impl ScheduleError {
    /// The stage that failed.
    #[must_use]
    pub fn stage(&self) -> ScheduleStage {
        match self {
            ScheduleError::Scan { stage, .. } | ScheduleError::Enqueue { stage, .. } => *stage,
        }
    }
}

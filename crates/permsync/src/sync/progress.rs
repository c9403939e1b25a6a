//! Per-subject sync outcome events.
//!
//! Workers report every finished sync through an optional callback so callers
//! can drive logging, metrics or test assertions without touching the store.

use std::time::Duration;

use crate::types::Subject;

/// Outcome of one dispatched sync.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SyncEvent {
    /// A record was written.
    Synced {
        subject: Subject,
        /// Number of distinct granted IDs stored.
        granted: usize,
        /// Some host calls failed permanently; the IDs may be incomplete.
        partial: bool,
    },

    /// A transient failure occurred; the subject was put back in the queue at low priority.
    ///
    /// Any IDs fetched before the failure have already been written as a partial record.
    Requeued {
        subject: Subject,
        /// Number of IDs written before requeueing (0 when nothing was written).
        granted: usize,
        reason: String,
        /// The subject is not dispatched again before this much time has passed.
        retry_in: Duration,
    },

    /// Nothing could be synced for the subject (no code host identity, no
    /// provider, or a provider that cannot answer). Enqueues of the subject are
    /// ignored for a while.
    Skipped { subject: Subject, reason: String },

    /// Every host call failed permanently; the previous record, if any, is kept.
    /// Enqueues of the subject are ignored for a while.
    Failed { subject: Subject, error: String },
}

impl SyncEvent {
    /// The subject this event is about.
    #[must_use]
    pub fn subject(&self) -> Subject {
        match self {
            SyncEvent::Synced { subject, .. }
            | SyncEvent::Requeued { subject, .. }
            | SyncEvent::Skipped { subject, .. }
            | SyncEvent::Failed { subject, .. } => *subject,
        }
    }

    /// Whether the worker should put the subject back in the queue.
    #[must_use]
    pub fn is_requeue(&self) -> bool {
        matches!(self, SyncEvent::Requeued { .. })
    }
}

/// Callback invoked by sync workers after every dispatched sync.
pub type SyncEventCallback = Box<dyn Fn(SyncEvent) + Send + Sync>;

/// Emit an event if a callback is provided.
#[inline]
pub fn emit(on_event: Option<&SyncEventCallback>, event: SyncEvent) {
    if let Some(cb) = on_event {
        cb(event);
    }
}

//! Deduplicating priority queue with in-flight exclusion.
//!
//! One map holds the state of every known subject, so dedup, priority
//! upgrades and "at most one fetch per subject" are a single lookup under one
//! lock. The lock is never held across an await point.
//!
//! A requeued subject carries a not-before instant and stays invisible to
//! workers until then. A subject can also be held: enqueues of it are ignored
//! until the hold runs out.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::EnqueueError;
use super::types::{Priority, SyncRequest};
use crate::types::Subject;

#[derive(Debug, Clone, Copy)]
enum Entry {
    Queued {
        priority: Priority,
        seq: u64,
        enqueued_at: Instant,
        /// Set while the entry waits in `deferred`.
        not_before: Option<Instant>,
    },
    InFlight,
}

/// What happens to a subject once its sync is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    /// Forget the subject; the next enqueue queues it as usual.
    Done,
    /// Queue the subject again at `priority`, dispatchable once `after` has passed.
    Requeue { priority: Priority, after: Duration },
    /// Ignore enqueues of the subject for this long.
    Hold(Duration),
}

/// Dispatch order: highest priority first, then oldest enqueue.
type ReadyKey = (Reverse<Priority>, u64);

#[derive(Debug, Default)]
struct QueueState {
    entries: HashMap<Subject, Entry>,
    ready: BTreeMap<ReadyKey, Subject>,
    /// Queued subjects that may not be dispatched before the instant in the key.
    deferred: BTreeMap<(Instant, u64), Subject>,
    /// Subjects whose enqueues are ignored until the mapped instant. Expired
    /// holds are dropped on the next enqueue of the subject.
    held: HashMap<Subject, Instant>,
    next_seq: u64,
    closed: bool,
}

impl QueueState {
    fn push(&mut self, subject: Subject, priority: Priority, delay: Duration) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let enqueued_at = Instant::now();
        let not_before = (!delay.is_zero()).then(|| enqueued_at + delay);
        self.entries.insert(
            subject,
            Entry::Queued {
                priority,
                seq,
                enqueued_at,
                not_before,
            },
        );
        match not_before {
            Some(at) => self.deferred.insert((at, seq), subject),
            None => self.ready.insert((Reverse(priority), seq), subject),
        };
    }

    /// Returns whether the subject was newly queued or upgraded.
    fn enqueue(&mut self, subject: Subject, priority: Priority) -> bool {
        if let Some(until) = self.held.get(&subject).copied() {
            if until > Instant::now() {
                return false;
            }
            self.held.remove(&subject);
        }

        match self.entries.get_mut(&subject) {
            None => {
                self.push(subject, priority, Duration::ZERO);
                true
            }
            Some(Entry::Queued {
                priority: queued,
                seq,
                not_before,
                ..
            }) if priority > *queued => {
                // Keep the original seq so the upgraded request keeps its place among equals.
                // A deferred entry keeps its not-before; only its priority changes.
                if not_before.is_none() {
                    self.ready.remove(&(Reverse(*queued), *seq));
                    self.ready.insert((Reverse(priority), *seq), subject);
                }
                *queued = priority;
                true
            }
            Some(Entry::Queued { .. }) | Some(Entry::InFlight) => false,
        }
    }

    /// Queue a subject that just finished, not dispatchable before `after` has passed.
    fn requeue(&mut self, subject: Subject, priority: Priority, after: Duration) -> bool {
        if self.entries.contains_key(&subject) {
            return self.enqueue(subject, priority);
        }
        self.push(subject, priority, after);
        true
    }

    /// Move every deferred entry whose time has come into `ready`.
    fn promote_due(&mut self, now: Instant) {
        while let Some((&(at, seq), &subject)) = self.deferred.first_key_value() {
            if at > now {
                break;
            }
            self.deferred.remove(&(at, seq));
            if let Some(Entry::Queued {
                priority,
                not_before,
                ..
            }) = self.entries.get_mut(&subject)
            {
                *not_before = None;
                self.ready.insert((Reverse(*priority), seq), subject);
            }
        }
    }

    /// When the earliest deferred entry becomes dispatchable.
    fn next_due(&self) -> Option<Instant> {
        self.deferred.first_key_value().map(|(&(at, _), _)| at)
    }

    fn take(&mut self) -> Option<SyncRequest> {
        self.promote_due(Instant::now());
        let ((Reverse(priority), seq), subject) = self.ready.pop_first()?;
        let entry = self.entries.insert(subject, Entry::InFlight);
        let enqueued_at = match entry {
            Some(Entry::Queued { enqueued_at, .. }) => enqueued_at,
            _ => Instant::now(),
        };
        Some(SyncRequest {
            subject,
            priority,
            seq,
            enqueued_at,
        })
    }

    fn queued_len(&self) -> usize {
        self.ready.len() + self.deferred.len()
    }
}

/// Sleep until `at`, or forever when there is nothing to wait for.
async fn sleep_until_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Queue shared by the syncer's workers and its enqueue API.
#[derive(Debug, Default)]
pub(crate) struct SyncQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl SyncQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // The state is consistent after every statement, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue `subjects` at `priority`.
    ///
    /// Returns the number of subjects that were newly queued or upgraded.
    /// Held subjects are not counted.
    pub(crate) fn enqueue_many(
        &self,
        priority: Priority,
        subjects: impl IntoIterator<Item = Subject>,
    ) -> Result<usize, EnqueueError> {
        let added = {
            let mut state = self.lock();
            if state.closed {
                return Err(EnqueueError::Closed);
            }
            subjects
                .into_iter()
                .filter(|subject| state.enqueue(*subject, priority))
                .count()
        };
        if added > 0 {
            self.notify.notify_waiters();
        }
        Ok(added)
    }

    /// Take the next dispatchable request without waiting, marking its subject in flight.
    pub(crate) fn try_take(&self) -> Option<SyncRequest> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        state.take()
    }

    /// Wait for the next dispatchable request.
    ///
    /// Returns `None` once the queue is closed or `cancel` fires. A cancelled
    /// token wins over a ready request.
    pub(crate) async fn next(&self, cancel: &CancellationToken) -> Option<SyncRequest> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so an enqueue between the check and the await is not missed.
            notified.as_mut().enable();

            let due = {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(request) = state.take() {
                    return Some(request);
                }
                state.next_due()
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = &mut notified => {}
                _ = sleep_until_due(due) => {}
            }
        }
    }

    /// Clear the in-flight marker for `subject` and apply `completion`.
    ///
    /// Returns whether the subject was queued again.
    pub(crate) fn complete(&self, subject: Subject, completion: Completion) -> bool {
        let requeued = {
            let mut state = self.lock();
            if matches!(state.entries.get(&subject), Some(Entry::InFlight)) {
                state.entries.remove(&subject);
            }
            match completion {
                _ if state.closed => false,
                Completion::Done => false,
                Completion::Requeue { priority, after } => state.requeue(subject, priority, after),
                Completion::Hold(hold) => {
                    if !hold.is_zero() {
                        state.held.insert(subject, Instant::now() + hold);
                    }
                    false
                }
            }
        };
        // Waiters also need to learn about a new deferred deadline.
        if requeued {
            self.notify.notify_waiters();
        }
        requeued
    }

    /// Drop every queued request and refuse further enqueues.
    pub(crate) fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.entries.clear();
            state.ready.clear();
            state.deferred.clear();
            state.held.clear();
        }
        self.notify.notify_waiters();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of queued (not in-flight) requests, deferred ones included.
    pub(crate) fn queued_len(&self) -> usize {
        self.lock().queued_len()
    }

    /// Number of subjects currently being synced.
    pub(crate) fn in_flight_len(&self) -> usize {
        let state = self.lock();
        state.entries.len() - state.queued_len()
    }

    /// The priority a subject is queued at, if it is queued.
    pub(crate) fn queued_priority(&self, subject: Subject) -> Option<Priority> {
        match self.lock().entries.get(&subject) {
            Some(Entry::Queued { priority, .. }) => Some(*priority),
            _ => None,
        }
    }

    /// When a deferred subject becomes dispatchable. `None` if it is not deferred.
    pub(crate) fn not_before(&self, subject: Subject) -> Option<Instant> {
        match self.lock().entries.get(&subject) {
            Some(Entry::Queued { not_before, .. }) => *not_before,
            _ => None,
        }
    }

    /// Whether enqueues of `subject` are being ignored right now.
    pub(crate) fn is_held(&self, subject: Subject) -> bool {
        self.lock()
            .held
            .get(&subject)
            .is_some_and(|until| *until > Instant::now())
    }

    pub(crate) fn is_in_flight(&self, subject: Subject) -> bool {
        matches!(self.lock().entries.get(&subject), Some(Entry::InFlight))
    }
}

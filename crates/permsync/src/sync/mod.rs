//! Permissions scheduling and syncing.
//!
//! # Module Structure
//!
//! - [`types`] - Core types: `Priority`, `SyncRequest`, `SyncerOptions`, constants
//! - [`progress`] - Outcome reporting: `SyncEvent`, `SyncEventCallback`, `emit()`
//! - [`syncer`] - `PermsSyncer`: deduplicated priority queue and workers
//! - [`scheduler`] - `PermsScheduler`: periodic scans feeding the syncer
//!
//! # Example
//!
//! ```ignore
//! use permsync::sync::{PermsScheduler, PermsSyncer, SyncerOptions, DEFAULT_SCHEDULE_INTERVAL};
//! use tokio_util::sync::CancellationToken;
//!
//! let syncer = PermsSyncer::new(store.clone(), providers, SyncerOptions::default());
//! let scheduler = PermsScheduler::new(store, syncer, DEFAULT_SCHEDULE_INTERVAL);
//!
//! let cancel = CancellationToken::new();
//! scheduler.run(cancel.clone()).await;
//! ```

mod error;
mod progress;
mod queue;
mod scheduler;
mod syncer;
mod types;

pub use error::{EnqueueError, ScheduleError, ScheduleStage};
pub use progress::{SyncEvent, SyncEventCallback, emit};
pub use scheduler::{MIN_SCHEDULE_INTERVAL, PermsScheduler};
pub use syncer::PermsSyncer;
pub use types::{
    DEFAULT_CONCURRENCY, DEFAULT_REQUEUE_DELAY, DEFAULT_SCHEDULE_INTERVAL, DEFAULT_SKIP_HOLD,
    MIN_REQUEUE_DELAY, Priority, ScheduleSummary, SyncRequest, SyncerOptions,
};

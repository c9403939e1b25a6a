//! permsync - keeps a local store of repository permissions in sync with code hosts.
//!
//! The crate is built from three pieces:
//!
//! - [`sync::PermsScheduler`] periodically scans the store for users and
//!   repositories that need a refresh and enqueues them.
//! - [`sync::PermsSyncer`] deduplicates and prioritizes those requests and
//!   drains them with a bounded number of workers.
//! - [`provider::PermsProvider`] implementations fetch the authoritative
//!   access lists from a code host (see [`gitlab`]).
//!
//! Persistence is consumed through the [`store::PermsStore`] trait;
//! [`store::MemoryStore`] is a process-local implementation.
//!
//! # Features
//!
//! - `gitlab` (default) - GitLab providers and the reqwest HTTP transport.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use permsync::gitlab::SudoProvider;
//! use permsync::provider::ProviderRegistry;
//! use permsync::store::MemoryStore;
//! use permsync::sync::{PermsScheduler, PermsSyncer, SyncerOptions, DEFAULT_SCHEDULE_INTERVAL};
//!
//! let store = Arc::new(MemoryStore::default());
//! let mut providers = ProviderRegistry::new();
//! providers.register(Arc::new(SudoProvider::new("https://gitlab.example.com", token, None)?));
//!
//! let syncer = PermsSyncer::new(store.clone(), Arc::new(providers), SyncerOptions::default());
//! PermsScheduler::new(store, syncer, DEFAULT_SCHEDULE_INTERVAL)
//!     .run(cancel)
//!     .await;
//! ```

pub mod http;
pub mod provider;
pub mod retry;
pub mod store;
pub mod sync;
pub mod types;

#[cfg(feature = "gitlab")]
pub mod gitlab;

pub use provider::{CodeHost, PermsProvider, ProviderError, ProviderRegistry};
pub use store::{MemoryStore, PermsStore, StoreError};
pub use sync::{PermsScheduler, PermsSyncer, Priority, SyncEvent, SyncerOptions};
pub use types::{ExternalAccount, ExternalRepoSpec, PermissionsRecord, RepoId, Subject, UserId};

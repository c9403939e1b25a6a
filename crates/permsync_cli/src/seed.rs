//! Startup data for the in-memory store.
//!
//! ```json
//! {
//!   "users": [
//!     {
//!       "id": 7,
//!       "accounts": [
//!         {
//!           "service_type": "gitlab",
//!           "service_id": "https://gitlab.example.com/",
//!           "account_id": "42",
//!           "account_data": { "id": 42, "username": "alice" }
//!         }
//!       ]
//!     }
//!   ],
//!   "repos": [
//!     {
//!       "id": 3,
//!       "external": {
//!         "service_type": "gitlab",
//!         "service_id": "https://gitlab.example.com/",
//!         "id": "101"
//!       }
//!     }
//!   ]
//! }
//! ```

use std::fs;
use std::io;
use std::path::Path;

use permsync::{ExternalAccount, ExternalRepoSpec, MemoryStore, RepoId, UserId};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Seed {
    pub users: Vec<SeedUser>,
    pub repos: Vec<SeedRepo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SeedUser {
    pub id: UserId,
    #[serde(default)]
    pub accounts: Vec<ExternalAccount>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SeedRepo {
    pub id: RepoId,
    /// Absent for repositories that are not mirrored from a code host.
    #[serde(default)]
    pub external: Option<ExternalRepoSpec>,
}

impl Seed {
    pub(crate) fn from_path(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{}: {}", path.display(), e)))
    }

    pub(crate) fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Load every user and repository into the store.
    ///
    /// Returns the number of users and repositories added.
    pub(crate) async fn apply(self, store: &MemoryStore) -> (usize, usize) {
        let users = self.users.len();
        let repos = self.repos.len();

        for user in self.users {
            store.add_user(user.id, user.accounts).await;
        }
        for repo in self.repos {
            store.add_repo(repo.id, repo.external).await;
        }

        (users, repos)
    }
}

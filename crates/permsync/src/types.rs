//! Core data model shared by the store, providers and syncer.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal user ID.
pub type UserId = i32;

/// Internal repository ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoId(pub i32);

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for RepoId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

/// The user or repository whose permissions are being synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    User(UserId),
    Repo(RepoId),
}

impl Subject {
    /// Short label used in log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Subject::User(_) => "user",
            Subject::Repo(_) => "repo",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::User(id) => write!(f, "user:{id}"),
            Subject::Repo(id) => write!(f, "repo:{id}"),
        }
    }
}

/// A user's identity on a specific code host instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalAccount {
    /// Kind of code host, e.g. `"gitlab"`.
    pub service_type: String,
    /// Code host instance, e.g. `"https://gitlab.com/"`.
    pub service_id: String,
    /// The account's ID on the code host.
    pub account_id: String,
    /// Provider-specific account payload (the host's user object).
    #[serde(default)]
    pub account_data: serde_json::Value,
    /// Provider-specific credential payload, when the host issued one for this account.
    #[serde(default)]
    pub auth_data: Option<serde_json::Value>,
}

/// A repository's identity on a specific code host instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalRepoSpec {
    pub service_type: String,
    pub service_id: String,
    /// The repository's ID on the code host (a GitLab project ID).
    pub id: String,
}

/// Stored result of the last completed permissions sync for a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsRecord {
    pub subject: Subject,
    /// External IDs granted to (user) or granting access on (repo) the subject.
    pub granted_ids: BTreeSet<String>,
    pub synced_at: DateTime<Utc>,
    /// Set when at least one host request failed and the IDs may be incomplete.
    pub partial: bool,
}

impl PermissionsRecord {
    #[must_use]
    pub fn new(
        subject: Subject,
        granted_ids: impl IntoIterator<Item = String>,
        synced_at: DateTime<Utc>,
        partial: bool,
    ) -> Self {
        Self {
            subject,
            granted_ids: granted_ids.into_iter().collect(),
            synced_at,
            partial,
        }
    }
}

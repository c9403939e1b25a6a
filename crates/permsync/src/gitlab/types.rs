//! GitLab API data types.

use serde::Deserialize;

/// Access level granted to project members.
///
/// See <https://docs.gitlab.com/ee/api/members.html#roles>.
pub mod access_level {
    pub const GUEST: u32 = 10;
    /// The lowest level that can read repository code.
    pub const REPORTER: u32 = 20;
    pub const DEVELOPER: u32 = 30;
    pub const MAINTAINER: u32 = 40;
    pub const OWNER: u32 = 50;
}

/// Something listed by a paginated GitLab endpoint that maps to an external ID.
pub trait ExternalId {
    fn external_id(&self) -> String;
}

/// GitLab project - fields we need from the list projects response.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabProject {
    /// Project ID.
    pub id: i64,
    /// Full path including namespace (e.g., "group/subgroup/project").
    #[serde(default)]
    pub path_with_namespace: Option<String>,
    /// Visibility level: "public", "private", or "internal".
    #[serde(default)]
    pub visibility: Option<String>,
}

impl ExternalId for GitLabProject {
    fn external_id(&self) -> String {
        self.id.to_string()
    }
}

/// A project member, direct or inherited from a parent group.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabMember {
    /// User ID.
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub access_level: Option<u32>,
}

impl ExternalId for GitLabMember {
    fn external_id(&self) -> String {
        self.id.to_string()
    }
}

/// The GitLab user object stored as an external account's `account_data`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabUser {
    /// User ID.
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// OAuth token stored as an external account's `auth_data`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabOAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_ignores_unknown_fields() {
        let project: GitLabProject = serde_json::from_value(serde_json::json!({
            "id": 101,
            "name": "secret",
            "path_with_namespace": "acme/secret",
            "visibility": "private",
            "star_count": 3
        }))
        .expect("project should deserialize");
        assert_eq!(project.external_id(), "101");
        assert_eq!(project.visibility.as_deref(), Some("private"));
    }

    #[test]
    fn test_member_minimal_payload() {
        let member: GitLabMember =
            serde_json::from_value(serde_json::json!({ "id": 7 })).expect("member");
        assert_eq!(member.external_id(), "7");
        assert!(member.access_level.is_none());
    }

    #[test]
    fn test_user_requires_id() {
        let err = serde_json::from_value::<GitLabUser>(serde_json::json!({ "username": "a" }));
        assert!(err.is_err());
    }

    #[test]
    fn test_access_levels_are_ordered() {
        assert!(access_level::GUEST < access_level::REPORTER);
        assert!(access_level::REPORTER < access_level::DEVELOPER);
        assert!(access_level::MAINTAINER < access_level::OWNER);
    }
}

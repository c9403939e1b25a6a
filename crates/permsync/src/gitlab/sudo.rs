//! Permissions provider that impersonates users with an admin token.

use async_trait::async_trait;

use super::SERVICE_TYPE;
use super::client::{Credential, GitLabClient, project_members_url, user_projects_url};
use super::error::GitLabError;
use super::types::{GitLabMember, GitLabProject, GitLabUser};
use crate::provider::{ApiRateLimiter, CodeHost, PermsProvider, ProviderError, Result};
use crate::types::{ExternalAccount, ExternalRepoSpec};

/// Fetches permissions from a GitLab instance using an admin access token
/// with the `sudo` scope.
///
/// User fetches impersonate the account through the `Sudo` header, so the
/// result is exactly what that user would see. Repository fetches use the
/// admin token directly.
pub struct SudoProvider {
    host: CodeHost,
    client: GitLabClient,
}

impl SudoProvider {
    /// Create a provider for `base_url` authenticating with `token`.
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        rate_limiter: Option<ApiRateLimiter>,
    ) -> std::result::Result<Self, GitLabError> {
        let client = GitLabClient::new(base_url, rate_limiter)?;
        Ok(Self::with_client(base_url, client, token))
    }

    /// Create a provider on top of an existing client.
    pub fn with_client(base_url: &str, client: GitLabClient, token: impl Into<String>) -> Self {
        Self {
            host: CodeHost::new(SERVICE_TYPE, base_url),
            client: client.with_credential(Credential::PrivateToken(token.into())),
        }
    }
}

/// Decode the GitLab user ID stored in an account's `account_data`.
pub(crate) fn gitlab_user_id(account: &ExternalAccount) -> Result<i64> {
    let user: GitLabUser = serde_json::from_value(account.account_data.clone()).map_err(|e| {
        ProviderError::malformed(format!(
            "account {} has no GitLab user in account data: {}",
            account.account_id, e
        ))
    })?;
    Ok(user.id)
}

#[async_trait]
impl PermsProvider for SudoProvider {
    fn code_host(&self) -> &CodeHost {
        &self.host
    }

    async fn fetch_user_perms(&self, account: &ExternalAccount) -> Result<Vec<String>> {
        self.host.check_account(account)?;
        let user_id = gitlab_user_id(account)?;

        self.client
            .clone()
            .with_sudo(user_id.to_string())
            .collect_ids::<GitLabProject>(user_projects_url())
            .await
    }

    async fn fetch_repo_perms(&self, repo: &ExternalRepoSpec) -> Result<Vec<String>> {
        self.host.check_repo(repo)?;

        self.client
            .collect_ids::<GitLabMember>(project_members_url(&repo.id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::http::{HttpResponse, MockTransport, header_get};

    const HOST: &str = "https://gitlab.test";

    fn provider(transport: &MockTransport) -> SudoProvider {
        let client = GitLabClient::new_with_transport(HOST, None, Arc::new(transport.clone()))
            .expect("client should build");
        SudoProvider::with_client(HOST, client, "admin-token")
    }

    fn account(user_id: i64) -> ExternalAccount {
        ExternalAccount {
            service_type: "gitlab".to_string(),
            service_id: "https://gitlab.test/".to_string(),
            account_id: user_id.to_string(),
            account_data: serde_json::json!({ "id": user_id, "username": "alice" }),
            auth_data: None,
        }
    }

    fn page(ids: &[i64], next: Option<&str>) -> HttpResponse {
        let items: Vec<_> = ids.iter().map(|id| serde_json::json!({ "id": id })).collect();
        HttpResponse {
            status: 200,
            headers: next
                .map(|url| vec![("Link".to_string(), format!("<{url}>; rel=\"next\""))])
                .unwrap_or_default(),
            body: serde_json::to_vec(&items).expect("page should serialize"),
        }
    }

    fn projects_url() -> String {
        format!("{HOST}/api/v4/projects?visibility=private&min_access_level=20&per_page=100")
    }

    #[tokio::test]
    async fn test_fetch_user_perms_impersonates_account() {
        let transport = MockTransport::new();
        transport.push_response(projects_url(), page(&[101, 102], None));

        let ids = provider(&transport)
            .fetch_user_perms(&account(7))
            .await
            .expect("fetch should succeed");

        assert_eq!(ids, vec!["101", "102"]);
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(header_get(&requests[0].headers, "sudo"), Some("7"));
        assert_eq!(
            header_get(&requests[0].headers, "private-token"),
            Some("admin-token")
        );
    }

    #[tokio::test]
    async fn test_fetch_user_perms_keeps_earlier_pages_when_later_page_fails() {
        let transport = MockTransport::new();
        let second = format!("{HOST}/api/v4/projects?page=2");
        let third = format!("{HOST}/api/v4/projects?page=3");
        transport.push_response(projects_url(), page(&[101], Some(second.as_str())));
        transport.push_response(
            &second,
            HttpResponse {
                status: 502,
                headers: Vec::new(),
                body: b"Bad Gateway".to_vec(),
            },
        );
        transport.push_response(&third, page(&[103], None));

        let err = provider(&transport)
            .fetch_user_perms(&account(7))
            .await
            .expect_err("second page should fail");

        assert!(err.is_retryable());
        assert_eq!(err.partial_ids(), ["101".to_string()]);
        assert!(err.to_string().contains("502"));
        let urls: Vec<_> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec![projects_url(), second]);
    }

    #[tokio::test]
    async fn test_fetch_user_perms_transport_error_on_first_page_has_no_ids() {
        let transport = MockTransport::new();
        transport.push_transport_error(projects_url(), "connection reset by peer");

        let err = provider(&transport)
            .fetch_user_perms(&account(7))
            .await
            .expect_err("transport error should fail");
        assert!(matches!(err, ProviderError::HostApi { .. }));
        assert!(err.partial_ids().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_user_perms_rejects_other_instance_without_requests() {
        let transport = MockTransport::new();
        let mut other = account(7);
        other.service_id = "https://gitlab.com/".to_string();

        let err = provider(&transport)
            .fetch_user_perms(&other)
            .await
            .expect_err("mismatch should fail");

        assert!(matches!(err, ProviderError::ServiceMismatch { .. }));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_user_perms_rejects_account_without_user_id() {
        let transport = MockTransport::new();
        let mut broken = account(7);
        broken.account_data = serde_json::json!({ "username": "alice" });

        let err = provider(&transport)
            .fetch_user_perms(&broken)
            .await
            .expect_err("missing id should fail");

        assert!(matches!(err, ProviderError::MalformedAccountData { .. }));
        assert!(!err.is_retryable());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_repo_perms_lists_all_members_without_sudo() {
        let transport = MockTransport::new();
        let first = format!("{HOST}/api/v4/projects/55/members/all?per_page=100");
        let second = format!("{HOST}/api/v4/projects/55/members/all?page=2&per_page=100");
        transport.push_response(&first, page(&[7, 8], Some(second.as_str())));
        transport.push_response(&second, page(&[9], None));

        let repo = ExternalRepoSpec {
            service_type: "gitlab".to_string(),
            service_id: "https://gitlab.test/".to_string(),
            id: "55".to_string(),
        };
        let provider = provider(&transport);
        assert!(provider.supports_repo_perms());
        let ids = provider
            .fetch_repo_perms(&repo)
            .await
            .expect("fetch should succeed");

        assert_eq!(ids, vec!["7", "8", "9"]);
        for request in transport.requests() {
            assert_eq!(header_get(&request.headers, "sudo"), None);
            assert_eq!(
                header_get(&request.headers, "private-token"),
                Some("admin-token")
            );
        }
    }

    #[tokio::test]
    async fn test_fetch_repo_perms_rejects_other_service_type() {
        let transport = MockTransport::new();
        let repo = ExternalRepoSpec {
            service_type: "github".to_string(),
            service_id: "https://gitlab.test/".to_string(),
            id: "55".to_string(),
        };

        let err = provider(&transport)
            .fetch_repo_perms(&repo)
            .await
            .expect_err("mismatch should fail");
        assert!(matches!(err, ProviderError::ServiceMismatch { .. }));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_gitlab_user_id_accepts_full_user_object() {
        let mut acct = account(12);
        acct.account_data = serde_json::json!({
            "id": 12,
            "username": "bob",
            "state": "active",
            "web_url": "https://gitlab.test/bob"
        });
        assert_eq!(gitlab_user_id(&acct).expect("id should decode"), 12);
    }
}

//! Permissions provider that authenticates as each account with its own OAuth token.
//!
//! Used when no admin token is available. The token issued to the account
//! during sign-in is stored in the account's `auth_data`:
//!
//! ```json
//! { "access_token": "…", "token_type": "Bearer" }
//! ```

use async_trait::async_trait;

use super::SERVICE_TYPE;
use super::client::{Credential, GitLabClient, user_projects_url};
use super::error::GitLabError;
use super::types::{GitLabOAuthToken, GitLabProject};
use crate::provider::{ApiRateLimiter, CodeHost, PermsProvider, ProviderError, Result};
use crate::types::{ExternalAccount, ExternalRepoSpec};

/// Fetches a user's permissions with the user's own OAuth token.
///
/// A user token cannot enumerate who else can read a project, so repository
/// fetches are [`ProviderError::Unsupported`].
pub struct OAuthProvider {
    host: CodeHost,
    client: GitLabClient,
}

impl OAuthProvider {
    pub fn new(
        base_url: &str,
        rate_limiter: Option<ApiRateLimiter>,
    ) -> std::result::Result<Self, GitLabError> {
        let client = GitLabClient::new(base_url, rate_limiter)?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: &str, client: GitLabClient) -> Self {
        Self {
            host: CodeHost::new(SERVICE_TYPE, base_url),
            client,
        }
    }
}

fn access_token(account: &ExternalAccount) -> Result<String> {
    let Some(auth_data) = account.auth_data.clone() else {
        return Err(ProviderError::malformed(format!(
            "account {} has no OAuth token",
            account.account_id
        )));
    };
    let token: GitLabOAuthToken = serde_json::from_value(auth_data).map_err(|e| {
        ProviderError::malformed(format!(
            "account {} has unreadable auth data: {}",
            account.account_id, e
        ))
    })?;
    if token.access_token.is_empty() {
        return Err(ProviderError::malformed(format!(
            "account {} has an empty OAuth token",
            account.account_id
        )));
    }
    Ok(token.access_token)
}

#[async_trait]
impl PermsProvider for OAuthProvider {
    fn code_host(&self) -> &CodeHost {
        &self.host
    }

    async fn fetch_user_perms(&self, account: &ExternalAccount) -> Result<Vec<String>> {
        self.host.check_account(account)?;
        let token = access_token(account)?;

        self.client
            .clone()
            .with_credential(Credential::OAuthToken(token))
            .collect_ids::<GitLabProject>(user_projects_url())
            .await
    }

    async fn fetch_repo_perms(&self, repo: &ExternalRepoSpec) -> Result<Vec<String>> {
        self.host.check_repo(repo)?;
        Err(ProviderError::Unsupported {
            operation: "fetch_repo_perms",
        })
    }

    fn supports_repo_perms(&self) -> bool {
        false
    }
}

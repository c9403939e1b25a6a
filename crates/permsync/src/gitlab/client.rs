//! GitLab API client creation and pagination.

use std::fmt;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use serde::de::DeserializeOwned;
use url::{Url, form_urlencoded};

use super::error::{GitLabError, short_error_message};
use super::types::{ExternalId, GitLabMember, GitLabProject, access_level};
use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{HttpRequest, HttpTransport};
use crate::provider::{self, ApiRateLimiter};

/// Maximum page size accepted by the GitLab REST API.
pub const MAX_PAGE_SIZE: u32 = 100;

const API_PATH: &str = "api/v4/";

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// How a client authenticates against GitLab.
#[derive(Clone)]
pub enum Credential {
    /// Personal or impersonation access token, sent as `PRIVATE-TOKEN`.
    PrivateToken(String),
    /// OAuth access token, sent as a bearer token.
    OAuthToken(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::PrivateToken(_) => f.write_str("PrivateToken(<redacted>)"),
            Credential::OAuthToken(_) => f.write_str("OAuthToken(<redacted>)"),
        }
    }
}

/// One page of a list endpoint.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Absolute URL of the next page, taken from the `Link` header.
    pub next: Option<String>,
}

/// GitLab REST client.
///
/// Cheap to clone: the transport and rate limiter are shared, so deriving a
/// client for another credential or another impersonated user costs nothing.
#[derive(Clone)]
pub struct GitLabClient {
    transport: Arc<dyn HttpTransport>,
    api_url: Url,
    credential: Option<Credential>,
    sudo: Option<String>,
    rate_limiter: Option<ApiRateLimiter>,
}

impl GitLabClient {
    /// Create a client for a GitLab instance backed by reqwest.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Instance URL (e.g., "https://gitlab.com" or "https://gitlab.example.com/")
    /// * `rate_limiter` - Optional pacer shared by every client of this instance
    pub fn new(base_url: &str, rate_limiter: Option<ApiRateLimiter>) -> Result<Self, GitLabError> {
        let transport = ReqwestTransport::with_timeout(REQUEST_TIMEOUT)?;
        Self::new_with_transport(base_url, rate_limiter, Arc::new(transport))
    }

    pub fn new_with_transport(
        base_url: &str,
        rate_limiter: Option<ApiRateLimiter>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, GitLabError> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        let api_url = base.join(API_PATH)?;
        Ok(Self {
            transport,
            api_url,
            credential: None,
            sudo: None,
            rate_limiter,
        })
    }

    /// Derive a client that authenticates with `credential`.
    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Derive a client that impersonates `user` (a GitLab user ID or username).
    ///
    /// Requires an admin token with the `sudo` scope.
    #[must_use]
    pub fn with_sudo(mut self, user: impl Into<String>) -> Self {
        self.sudo = Some(user.into());
        self
    }

    /// The `api/v4/` root every relative request is resolved against.
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }
    }

    /// Resolve a relative path or an absolute next-page URL.
    ///
    /// Next-page URLs come from response headers; anything pointing away from
    /// the configured instance is rejected so credentials never leave it.
    fn resolve(&self, page_url: &str) -> Result<Url, GitLabError> {
        let url = self.api_url.join(page_url)?;
        if url.origin() != self.api_url.origin() {
            return Err(GitLabError::InvalidUrl(format!(
                "refusing to request {} outside {}",
                url, self.api_url
            )));
        }
        Ok(url)
    }

    /// Fetch one page of a list endpoint.
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        page_url: &str,
    ) -> Result<Page<T>, GitLabError> {
        let url = self.resolve(page_url)?;
        self.wait_for_rate_limit().await;

        let mut request = HttpRequest::get(url.as_str())
            .header("Accept", "application/json")
            .header("User-Agent", "permsync");
        request = match &self.credential {
            Some(Credential::PrivateToken(token)) => request.header("PRIVATE-TOKEN", token),
            Some(Credential::OAuthToken(token)) => {
                request.header("Authorization", format!("Bearer {}", token))
            }
            None => request,
        };
        if let Some(ref sudo) = self.sudo {
            request = request.header("Sudo", sudo);
        }

        let response = self.transport.send(request).await?;

        if !response.is_success() {
            return Err(GitLabError::from_response(&response));
        }

        Ok(Page {
            items: serde_json::from_slice(&response.body)?,
            next: response.next_page(),
        })
    }

    /// List a page of projects.
    ///
    /// API docs: <https://docs.gitlab.com/ee/api/projects.html#list-all-projects>
    pub async fn list_projects(&self, page_url: &str) -> Result<Page<GitLabProject>, GitLabError> {
        self.get_page(page_url).await
    }

    /// List a page of project members, including inherited members.
    ///
    /// API docs: <https://docs.gitlab.com/ee/api/members.html#list-all-members-of-a-group-or-project-including-inherited-members>
    pub async fn list_members(&self, page_url: &str) -> Result<Page<GitLabMember>, GitLabError> {
        self.get_page(page_url).await
    }

    /// Follow next-page links from `first_page_url` until the last page,
    /// collecting the external ID of every item in encounter order.
    ///
    /// When a page fails, the IDs collected from the earlier pages are returned
    /// inside [`provider::ProviderError::HostApi`] and no further page is requested.
    pub async fn collect_ids<T: DeserializeOwned + ExternalId>(
        &self,
        first_page_url: String,
    ) -> provider::Result<Vec<String>> {
        // One full page is the common case.
        let mut ids: Vec<String> = Vec::with_capacity(MAX_PAGE_SIZE as usize);
        let mut next_url = first_page_url;
        let mut page_number = 0u32;

        loop {
            let page = match self.get_page::<T>(&next_url).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(
                        url = %next_url,
                        fetched = ids.len(),
                        error = %short_error_message(&e),
                        "GitLab page request failed"
                    );
                    return Err(e.into_provider_error(ids));
                }
            };
            page_number += 1;

            ids.extend(page.items.iter().map(ExternalId::external_id));
            tracing::debug!(
                url = %next_url,
                page = page_number,
                count = page.items.len(),
                total_so_far = ids.len(),
                "Fetched page"
            );

            match page.next {
                Some(next) => next_url = next,
                None => break,
            }
        }

        Ok(ids)
    }
}

/// First page of the private projects the authenticated (or impersonated)
/// user can read code in.
pub fn user_projects_url() -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("visibility", "private")
        .append_pair("min_access_level", &access_level::REPORTER.to_string())
        .append_pair("per_page", &MAX_PAGE_SIZE.to_string())
        .finish();
    format!("projects?{}", query)
}

/// First page of everyone who can access a project, directly or through groups.
pub fn project_members_url(project_id: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("per_page", &MAX_PAGE_SIZE.to_string())
        .finish();
    format!("projects/{}/members/all?{}", project_id, query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpHeaders, HttpResponse, MockTransport, header_get};
    use crate::provider::ProviderError;

    const HOST: &str = "https://gitlab.test";

    fn to_headers(pairs: Vec<(&str, &str)>) -> HttpHeaders {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn response(status: u16, headers: Vec<(&str, &str)>, body: impl AsRef<[u8]>) -> HttpResponse {
        HttpResponse {
            status,
            headers: to_headers(headers),
            body: body.as_ref().to_vec(),
        }
    }

    fn projects_json(ids: &[i64]) -> String {
        let projects: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({ "id": id, "path_with_namespace": format!("acme/p{id}") }))
            .collect();
        serde_json::to_string(&projects).expect("projects should serialize")
    }

    fn link_next(url: &str) -> String {
        format!("<{url}>; rel=\"next\"")
    }

    fn client(transport: &MockTransport) -> GitLabClient {
        GitLabClient::new_with_transport(HOST, None, Arc::new(transport.clone()))
            .expect("client should build")
    }

    #[test]
    fn test_first_page_urls() {
        assert_eq!(
            user_projects_url(),
            "projects?visibility=private&min_access_level=20&per_page=100"
        );
        assert_eq!(
            project_members_url("42"),
            "projects/42/members/all?per_page=100"
        );
    }

    #[test]
    fn test_new_normalizes_api_url() {
        let transport = MockTransport::new();
        for base in ["https://gitlab.test", "https://gitlab.test/", "https://gitlab.test//"] {
            let client = GitLabClient::new_with_transport(base, None, Arc::new(transport.clone()))
                .expect("client should build");
            assert_eq!(client.api_url().as_str(), "https://gitlab.test/api/v4/");
        }
    }

    #[test]
    fn test_new_rejects_invalid_base_url() {
        let err = GitLabClient::new_with_transport("not a url", None, Arc::new(MockTransport::new()))
            .err()
            .expect("invalid URL should fail");
        assert!(matches!(err, GitLabError::InvalidUrl(_)));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let debug = format!("{:?}", Credential::PrivateToken("glpat-secret".to_string()));
        assert!(!debug.contains("glpat-secret"));
    }

    #[tokio::test]
    async fn test_get_page_sends_token_and_sudo_headers() {
        let transport = MockTransport::new();
        let url = format!("{HOST}/api/v4/{}", user_projects_url());
        transport.push_response(&url, response(200, vec![], projects_json(&[1])));

        let page = client(&transport)
            .with_credential(Credential::PrivateToken("admin-token".to_string()))
            .with_sudo("42")
            .list_projects(&user_projects_url())
            .await
            .expect("page should load");
        assert_eq!(page.items.len(), 1);
        assert!(page.next.is_none());

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, url);
        assert_eq!(
            header_get(&requests[0].headers, "private-token"),
            Some("admin-token")
        );
        assert_eq!(header_get(&requests[0].headers, "sudo"), Some("42"));
        assert_eq!(header_get(&requests[0].headers, "authorization"), None);
    }

    #[tokio::test]
    async fn test_get_page_sends_bearer_for_oauth_token() {
        let transport = MockTransport::new();
        let url = format!("{HOST}/api/v4/{}", user_projects_url());
        transport.push_response(&url, response(200, vec![], "[]"));

        client(&transport)
            .with_credential(Credential::OAuthToken("oauth-token".to_string()))
            .list_projects(&user_projects_url())
            .await
            .expect("page should load");

        let requests = transport.requests();
        assert_eq!(
            header_get(&requests[0].headers, "authorization"),
            Some("Bearer oauth-token")
        );
        assert_eq!(header_get(&requests[0].headers, "sudo"), None);
    }

    #[tokio::test]
    async fn test_get_page_maps_error_status() {
        let transport = MockTransport::new();
        let url = format!("{HOST}/api/v4/projects/9/members/all?per_page=100");
        transport.push_response(&url, response(401, vec![], "401 Unauthorized"));

        let err = client(&transport)
            .list_members(&project_members_url("9"))
            .await
            .expect_err("401 should fail");
        assert!(matches!(err, GitLabError::Auth { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_collect_ids_follows_link_headers() {
        let transport = MockTransport::new();
        let first = format!("{HOST}/api/v4/{}", user_projects_url());
        let second = format!("{HOST}/api/v4/projects?page=2&per_page=100");
        let third = format!("{HOST}/api/v4/projects?page=3&per_page=100");
        let next_second = link_next(&second);
        let next_third = link_next(&third);

        transport.push_response(
            &first,
            response(200, vec![("Link", &next_second)], projects_json(&[1, 2])),
        );
        transport.push_response(
            &second,
            response(200, vec![("Link", &next_third)], projects_json(&[3])),
        );
        transport.push_response(&third, response(200, vec![], projects_json(&[4, 5])));

        let ids = client(&transport)
            .collect_ids::<GitLabProject>(user_projects_url())
            .await
            .expect("all pages should load");

        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
        let urls: Vec<_> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec![first, second, third]);
    }

    #[tokio::test]
    async fn test_collect_ids_returns_partial_on_malformed_page() {
        let transport = MockTransport::new();
        let first = format!("{HOST}/api/v4/{}", user_projects_url());
        let second = format!("{HOST}/api/v4/projects?page=2");
        let next_second = link_next(&second);

        transport.push_response(
            &first,
            response(200, vec![("Link", &next_second)], projects_json(&[1])),
        );
        transport.push_response(&second, response(200, vec![], "<html>oops</html>"));

        let err = client(&transport)
            .collect_ids::<GitLabProject>(user_projects_url())
            .await
            .expect_err("malformed page should fail");
        match err {
            ProviderError::HostApi {
                partial,
                message,
                retry_after,
            } => {
                assert_eq!(partial, vec!["1".to_string()]);
                assert!(message.contains("JSON"));
                assert_eq!(retry_after, None);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_collect_ids_refuses_next_link_to_other_host() {
        let transport = MockTransport::new();
        let first = format!("{HOST}/api/v4/{}", user_projects_url());
        let next_elsewhere = link_next("https://evil.test/api/v4/projects?page=2");
        transport.push_response(
            &first,
            response(200, vec![("Link", &next_elsewhere)], projects_json(&[1])),
        );

        let err = client(&transport)
            .with_credential(Credential::PrivateToken("admin-token".to_string()))
            .collect_ids::<GitLabProject>(user_projects_url())
            .await
            .expect_err("foreign next link should fail");

        assert_eq!(err.partial_ids(), ["1".to_string()]);
        assert_eq!(transport.requests().len(), 1);
    }
}

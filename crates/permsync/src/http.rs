//! HTTP transport seam.
//!
//! Code host clients talk to the network only through [`HttpTransport`], so
//! tests can swap in an in-memory transport and count every request.

use async_trait::async_trait;
use thiserror::Error;

/// Header name/value pairs in the order they were sent or received.
pub type HttpHeaders = Vec<(String, String)>;

/// A GET request. Permissions are only ever read from code hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HttpHeaders,
}

impl HttpRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// First value of header `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `rel="next"` target of the `Link` header, if any.
    #[must_use]
    pub fn next_page(&self) -> Option<String> {
        self.header("link").and_then(next_link)
    }

    /// The body as text, for error messages.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("http transport error: {0}")]
    Transport(String),

    #[error("no mock response registered for GET {url}")]
    NoMockResponse { url: String },
}

/// Sends requests to a code host.
///
/// Dropping the returned future must abort the request; cancelling a sync
/// relies on it.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

#[must_use]
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find_map(|(k, v)| k.eq_ignore_ascii_case(name).then_some(v.as_str()))
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header value.
///
/// GitLab sends e.g.
/// `<https://gitlab.example.com/api/v4/projects?page=2>; rel="next", <...>; rel="last"`.
#[must_use]
pub fn next_link(link_header: &str) -> Option<String> {
    link_header.split(',').find_map(|link| {
        let (target, params) = link.split_once(';')?;
        let is_next = params
            .split(';')
            .filter_map(|param| param.trim().strip_prefix("rel="))
            .any(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"));

        is_next
            .then(|| target.trim().strip_prefix('<')?.strip_suffix('>'))
            .flatten()
            .map(str::to_string)
    })
}

#[cfg(feature = "gitlab")]
pub mod reqwest_transport {
    use std::time::Duration;

    use super::*;

    /// [`HttpTransport`] backed by a shared `reqwest::Client`.
    #[derive(Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    fn transport_error(err: reqwest::Error) -> HttpError {
        if err.is_timeout() {
            HttpError::Timeout(err.to_string())
        } else {
            HttpError::Transport(err.to_string())
        }
    }

    impl ReqwestTransport {
        pub fn new(client: reqwest::Client) -> Self {
            Self { client }
        }

        /// A client whose requests, body included, fail after `timeout`.
        pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
            reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map(Self::new)
                .map_err(transport_error)
        }
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let builder = request
                .headers
                .iter()
                .fold(self.client.get(&request.url), |builder, (name, value)| {
                    builder.header(name.as_str(), value.as_str())
                });

            let response = builder.send().await.map_err(transport_error)?;

            let status = response.status().as_u16();
            // Non-UTF-8 header values are dropped; none of the ones we read can be.
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    let value = value.to_str().ok()?;
                    Some((name.as_str().to_string(), value.to_string()))
                })
                .collect();
            let body = response.bytes().await.map_err(transport_error)?.to_vec();

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}

#[cfg(test)]
pub use mock::MockTransport;


#[cfg(test)]
mod tests {
    use super::*;

    fn link_response(link: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: vec![("Link".to_string(), link.to_string())],
            body: b"[]".to_vec(),
        }
    }

    #[test]
    fn next_link_picks_next_among_other_relations() {
        let header = "<https://gl.test/api/v4/projects?page=1>; rel=\"first\", \
                      <https://gl.test/api/v4/projects?page=3>; rel=\"next\", \
                      <https://gl.test/api/v4/projects?page=9>; rel=\"last\"";
        assert_eq!(
            next_link(header).as_deref(),
            Some("https://gl.test/api/v4/projects?page=3")
        );
    }

    #[test]
    fn next_link_accepts_unquoted_and_multi_valued_rel() {
        assert_eq!(next_link("<a?page=2>; rel=next").as_deref(), Some("a?page=2"));
        assert_eq!(
            next_link("<a?page=2>; rel=\"prev next\"").as_deref(),
            Some("a?page=2")
        );
    }

    #[test]
    fn next_link_is_none_on_last_page_or_garbage() {
        let header = "<https://gl.test/api/v4/projects?page=1>; rel=\"first\", \
                      <https://gl.test/api/v4/projects?page=2>; rel=\"prev\"";
        assert_eq!(next_link(header), None);
        assert_eq!(next_link(""), None);
        assert_eq!(next_link("https://gl.test/no-brackets; rel=\"next\""), None);
    }

    #[test]
    fn response_helpers() {
        let resp = link_response("<https://gl.test/p?page=2>; rel=\"next\"");
        assert!(resp.is_success());
        assert_eq!(resp.header("LINK"), resp.header("link"));
        assert_eq!(resp.next_page().as_deref(), Some("https://gl.test/p?page=2"));
        assert_eq!(resp.text(), "[]");

        let resp = HttpResponse {
            status: 502,
            headers: Vec::new(),
            body: Vec::new(),
        };
        assert!(!resp.is_success());
        assert_eq!(resp.next_page(), None);
    }

    #[test]
    fn request_headers_keep_order_and_match_case_insensitively() {
        let req = HttpRequest::get("https://gl.test/api/v4/projects")
            .header("PRIVATE-TOKEN", "secret")
            .header("Sudo", "42")
            .header("sudo", "43");
        assert_eq!(header_get(&req.headers, "SUDO"), Some("42"));
        assert_eq!(header_get(&req.headers, "missing"), None);
        assert_eq!(req.headers.len(), 3);
    }

    #[tokio::test]
    async fn mock_transport_serves_replies_in_order_and_records_requests() {
        let transport = MockTransport::new();
        let url = "https://gl.test/api/v4/projects";
        transport.push_response(url, link_response("<x>; rel=\"last\""));
        transport.push_transport_error(url, "connection reset");

        let req = HttpRequest::get(url).header("Accept", "application/json");
        assert_eq!(transport.send(req.clone()).await.unwrap().status, 200);
        assert!(matches!(
            transport.send(req.clone()).await,
            Err(HttpError::Transport(ref m)) if m == "connection reset"
        ));
        assert!(matches!(
            transport.send(req.clone()).await,
            Err(HttpError::NoMockResponse { ref url }) if url == "https://gl.test/api/v4/projects"
        ));

        assert_eq!(transport.requests(), vec![req.clone(), req.clone(), req]);
    }

    #[tokio::test]
    #[cfg(feature = "gitlab")]
    async fn reqwest_transport_reports_invalid_url_as_transport_error() {
        let transport =
            reqwest_transport::ReqwestTransport::with_timeout(std::time::Duration::from_secs(1))
                .unwrap();
        let err = transport.send(HttpRequest::get("not a url")).await.unwrap_err();
        assert!(matches!(err, HttpError::Transport(_)));
    }
}

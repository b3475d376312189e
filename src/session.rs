//! Index-session provider: the authenticated channel to the catalog.
//!
//! The catalog-graph and content-index backends reach the catalog through an
//! [`IndexSession`]. Acquiring credentials is someone else's job; a session
//! only knows its base URL and how to POST JSON with whatever credentials it
//! was handed. [`HttpIndexSession`] is the `reqwest`-backed implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::SearchError;

/// Status code and raw body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Map non-2xx statuses to errors.
    ///
    /// 401 and 403 become [`SearchError::BackendUnavailable`] (the session is
    /// not authorised, retrying will not help); anything else outside 2xx is a
    /// [`SearchError::Transport`] error.
    pub fn check(self, what: &str) -> Result<Self, SearchError> {
        match self.status {
            200..=299 => Ok(self),
            401 | 403 => Err(SearchError::BackendUnavailable(format!(
                "{what} rejected credentials (HTTP {})",
                self.status
            ))),
            status => Err(SearchError::Transport(format!(
                "{what} returned HTTP {status}: {}",
                snippet(&self.body)
            ))),
        }
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self, what: &str) -> Result<T, SearchError> {
        serde_json::from_str(&self.body)
            .map_err(|e| SearchError::Parse(format!("{what} response is not valid JSON: {e}")))
    }
}

/// Keep error messages short; bodies can be whole HTML error pages.
fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_owned(),
    }
}

/// An authenticated channel to the catalog's query endpoints.
#[async_trait]
pub trait IndexSession: Send + Sync {
    /// Catalog base URL without a trailing slash, e.g. `https://catalog.example.com`.
    fn base_url(&self) -> String;

    /// POST `body` as JSON to `url` with the session's credentials attached.
    ///
    /// Returns the reply whatever its status; only transport failures
    /// (DNS, TLS, connection, timeout) are errors.
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, SearchError>;
}

/// Build a [`reqwest::Client`] for catalog requests.
///
/// The client has a whole-request timeout and gzip decompression.
///
/// # Errors
///
/// Returns [`SearchError::Transport`] if the client cannot be constructed.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, SearchError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("unisearch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SearchError::Transport(format!("failed to build HTTP client: {e}")))
}

/// [`IndexSession`] over HTTP with an optional bearer token.
#[derive(Clone)]
pub struct HttpIndexSession {
    base_url: String,
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpIndexSession {
    /// Create a session for `base_url` whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `base_url` is not an absolute
    /// http(s) URL, or [`SearchError::Transport`] if the client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SearchError> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| SearchError::Config(format!("invalid catalog URL '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SearchError::Config(format!(
                "catalog URL must be http(s), got '{}'",
                parsed.scheme()
            )));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: build_client(timeout)?,
            token: None,
        })
    }

    /// Attach a bearer token obtained elsewhere.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl std::fmt::Debug for HttpIndexSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIndexSession")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

#[async_trait]
impl IndexSession for HttpIndexSession {
    fn base_url(&self) -> String {
        self.base_url.clone()
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, SearchError> {
        let mut request = self.client.post(url).json(body);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout(format!("request to {url} timed out"))
            } else {
                SearchError::Transport(format!("request to {url} failed: {e}"))
            }
        })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Transport(format!("reading response from {url} failed: {e}")))?;

        tracing::trace!(url, status, bytes = body.len(), "catalog response received");
        Ok(HttpReply { status, body })
    }
}

//! Remote subscription fetching.

use std::time::Duration;

use super::node::ProxyNode;
use super::parser::SubscriptionParser;

/// Default HTTP fetch timeout for subscription URLs.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout for subscription fetch. Capped by the overall timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client identity sent to subscription providers. Many providers pick the
/// response format from the User-Agent, so this must look like Stash.
pub const DEFAULT_USER_AGENT: &str = "Stash/2.7.0 Clash/1.0";

/// Per-source fetch failure. Rendered into a refresh item's `error` string.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to build subscription HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("subscription fetch timed out: {url}")]
    Timeout { url: String },
    #[error("failed to connect to subscription URL: {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("subscription fetch failed: {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("subscription returned HTTP {status}: {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("failed to read subscription response body: {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    fn from_send(url: &str, e: reqwest::Error) -> Self {
        let url = url.to_string();
        if e.is_timeout() {
            Self::Timeout { url }
        } else if e.is_connect() {
            Self::Connect { url, source: e }
        } else {
            Self::Request { url, source: e }
        }
    }
}

/// HTTP client for subscription sources.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct SubscriptionFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl SubscriptionFetcher {
    /// Build a fetcher with the given overall request timeout and
    /// User-Agent.
    ///
    /// The client is direct (no-proxy): subscription URLs must be reachable
    /// without going through the proxies they describe.
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            user_agent: user_agent.into(),
        })
    }

    /// Fetcher with the stock 30 s timeout and Stash User-Agent.
    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::new(DEFAULT_FETCH_TIMEOUT, DEFAULT_USER_AGENT)
    }

    /// Fetch one source and return its raw body.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| FetchError::from_send(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        resp.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            source: e,
        })
    }

    /// Fetch one source and parse it. Zero nodes is a valid outcome.
    pub async fn fetch_and_parse(&self, url: &str) -> Result<Vec<ProxyNode>, FetchError> {
        let body = self.fetch(url).await?;
        let nodes = SubscriptionParser::parse(&body);
        tracing::debug!(url, nodes = nodes.len(), "parsed subscription");
        Ok(nodes)
    }
}

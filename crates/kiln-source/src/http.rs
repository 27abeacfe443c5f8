//! JSON-over-HTTP content source.
//!
//! Wire format:
//!
//! - `GET {base}/changes?since=<cursor>&after=<page>&first=<n>` returns a
//!   [`ChangePage`]
//! - `GET {base}/node-ids` returns `{"ids": [...]}`
//!
//! Requests are blocking `ureq` calls moved onto the tokio blocking pool.

use std::time::Duration;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use ureq::Agent;

use crate::node::{Cursor, NodeId};
use crate::source::{ChangePage, ContentSource, SourceError};

/// Default page size for change queries.
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Default HTTP timeout in seconds.
const DEFAULT_TIMEOUT: u64 = 30;

#[derive(Deserialize)]
struct NodeIdsResponse {
    ids: Vec<NodeId>,
}

/// HTTP client for a Kiln-compatible content endpoint.
#[derive(Clone)]
pub struct HttpSource {
    agent: Agent,
    base_url: String,
    token: Option<String>,
    per_page: u32,
}

impl HttpSource {
    /// Create a client for `base_url` with default page size and timeout.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self::with_options(base_url, None, DEFAULT_PER_PAGE, Duration::from_secs(DEFAULT_TIMEOUT))
    }

    /// Create a client with explicit options.
    ///
    /// An empty `token` is treated as no token.
    #[must_use]
    pub fn with_options(
        base_url: &str,
        token: Option<&str>,
        per_page: u32,
        timeout: Duration,
    ) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.filter(|t| !t.is_empty()).map(str::to_owned),
            per_page,
        }
    }

    fn changes_url(&self, since: Option<&Cursor>, after: Option<&str>) -> String {
        let mut url = format!("{}/changes?first={}", self.base_url, self.per_page);
        if let Some(since) = since {
            url.push_str("&since=");
            url.extend(utf8_percent_encode(since.as_str(), NON_ALPHANUMERIC));
        }
        if let Some(after) = after {
            url.push_str("&after=");
            url.extend(utf8_percent_encode(after, NON_ALPHANUMERIC));
        }
        url
    }

    fn node_ids_url(&self) -> String {
        format!("{}/node-ids", self.base_url)
    }

    async fn get_json<T>(&self, url: String) -> Result<T, SourceError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let agent = self.agent.clone();
        let token = self.token.clone();
        tokio::task::spawn_blocking(move || fetch_json(&agent, &url, token.as_deref())).await?
    }
}

fn fetch_json<T: DeserializeOwned>(
    agent: &Agent,
    url: &str,
    token: Option<&str>,
) -> Result<T, SourceError> {
    tracing::debug!(url, "fetching");

    let mut request = agent.get(url).header("Accept", "application/json");
    if let Some(token) = token {
        request = request.header("Authorization", &format!("Bearer {token}"));
    }

    let response = request.call().map_err(|source| SourceError::Http {
        url: url.to_owned(),
        source,
    })?;

    let status = response.status().as_u16();
    let mut body_reader = response.into_body();

    if status >= 400 {
        let error_body = body_reader
            .read_to_string()
            .unwrap_or_else(|_| "(unable to read error body)".to_owned());
        return Err(SourceError::HttpResponse {
            url: url.to_owned(),
            status,
            body: error_body,
        });
    }

    body_reader.read_json().map_err(|source| SourceError::Decode {
        url: url.to_owned(),
        source,
    })
}

impl ContentSource for HttpSource {
    async fn fetch_changes(
        &self,
        since: Option<&Cursor>,
        after: Option<&str>,
    ) -> Result<ChangePage, SourceError> {
        let url = self.changes_url(since, after);
        self.get_json(url).await
    }

    async fn fetch_node_ids(&self) -> Result<Vec<NodeId>, SourceError> {
        let response: NodeIdsResponse = self.get_json(self.node_ids_url()).await?;
        Ok(response.ids)
    }
}

//! Content source trait and error types.
//!
//! A [`ContentSource`] is the external system content nodes come from (a CMS,
//! a GraphQL endpoint). The reconciler only needs two logical queries:
//!
//! - "every change since cursor X", paginated
//! - "every currently valid node ID", used on full passes to detect deletions
//!
//! Transport is the implementation's concern.

use std::future::Future;

use serde::Deserialize;

use crate::node::{ChangeAction, Cursor, NodeId};

/// One page of a change query.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePage {
    /// Changes in source order.
    pub actions: Vec<ChangeAction>,
    /// Pagination state.
    #[serde(default)]
    pub page_info: PageInfo,
    /// Cursor to pass as `since` on the next pass.
    #[serde(default)]
    pub cursor: Option<Cursor>,
}

/// Pagination state of a [`ChangePage`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// More pages follow this one.
    pub has_next_page: bool,
    /// Value to pass as `after` to get the next page.
    pub end_cursor: Option<String>,
}

/// External data source contract.
pub trait ContentSource: Send + Sync {
    /// Fetch one page of changes made after `since`.
    ///
    /// `since = None` asks for the full history, which a source reports as
    /// creates for every live node. `after` selects the page.
    fn fetch_changes(
        &self,
        since: Option<&Cursor>,
        after: Option<&str>,
    ) -> impl Future<Output = Result<ChangePage, SourceError>> + Send;

    /// Fetch the complete set of currently valid node IDs.
    fn fetch_node_ids(&self) -> impl Future<Output = Result<Vec<NodeId>, SourceError>> + Send;
}

/// Error from the external content source.
///
/// Every variant aborts the reconciliation pass before anything is applied,
/// so the same cursor can be retried.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed (network error, timeout, etc).
    #[error("request to {url} failed")]
    Http {
        /// Requested URL.
        url: String,
        /// Transport error.
        #[source]
        source: ureq::Error,
    },

    /// Server returned an error status.
    #[error("HTTP error from {url}: {status} - {body}")]
    HttpResponse {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body (may contain error details).
        body: String,
    },

    /// Response body was not the expected JSON.
    #[error("malformed response from {url}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Decoding error.
        #[source]
        source: ureq::Error,
    },

    /// Pagination did not terminate.
    #[error("change query did not advance past page cursor {0:?}")]
    StalledPagination(String),

    /// Background fetch task panicked or was cancelled.
    #[error("fetch task failed")]
    Join(#[from] tokio::task::JoinError),

    /// Source cannot be reached (used by non-HTTP sources).
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Unavailable(_) => true,
            Self::HttpResponse { status, .. } => *status == 429 || *status >= 500,
            Self::Decode { .. } | Self::StalledPagination(_) | Self::Join(_) => false,
        }
    }
}

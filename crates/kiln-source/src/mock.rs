//! Mock content source for testing.
//!
//! Provides [`MockSource`], an in-memory change log with the same pagination
//! and cursor semantics as the HTTP endpoint.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::node::{ChangeAction, ChangeKind, ContentNode, Cursor, NodeId};
use crate::source::{ChangePage, ContentSource, PageInfo, SourceError};

#[derive(Debug, Default)]
struct State {
    live: BTreeMap<NodeId, ContentNode>,
    log: Vec<ChangeAction>,
    failures_left: usize,
    node_ids_failures_left: usize,
    changes_calls: usize,
    node_ids_calls: usize,
}

/// Mock content source for testing.
///
/// Mutations append to a change log. The cursor returned by every page is the
/// log length, so passing it back as `since` yields only later changes.
/// Querying with `since = None` reports one create per live node.
///
/// # Example
///
/// ```ignore
/// use kiln_source::MockSource;
/// use serde_json::json;
///
/// let source = MockSource::new()
///     .with_node("post-1", "Post", json!({"title": "Hello"}))
///     .with_page_size(50);
/// source.update("post-1", "Post", json!({"title": "Hello again"}));
/// ```
#[derive(Debug)]
pub struct MockSource {
    state: Mutex<State>,
    page_size: usize,
}

impl Default for MockSource {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: usize::MAX,
        }
    }
}

impl MockSource {
    /// Create an empty mock source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node that exists before the first query.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_node(self, id: &str, node_type: &str, payload: Value) -> Self {
        self.create(id, node_type, payload);
        self
    }

    /// Limit the number of actions per change page.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Create a node and log the change.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn create(&self, id: &str, node_type: &str, payload: Value) {
        self.record(ChangeAction::create(id, node_type, payload));
    }

    /// Replace a node's payload and log the change.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn update(&self, id: &str, node_type: &str, payload: Value) {
        self.record(ChangeAction::update(id, node_type, payload));
    }

    /// Delete a node and log the change.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn delete(&self, id: &str) {
        self.record(ChangeAction::delete(id));
    }

    /// Delete a node without logging it.
    ///
    /// Only a full pass, which compares against the ID universe, notices.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn delete_silently(&self, id: &str) {
        self.state.lock().unwrap().live.remove(&NodeId::new(id));
    }

    /// Log a change without touching the live set.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn push_raw(&self, action: ChangeAction) {
        self.state.lock().unwrap().log.push(action);
    }

    /// Make the next `count` requests fail with [`SourceError::Unavailable`].
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn fail_next(&self, count: usize) {
        self.state.lock().unwrap().failures_left = count;
    }

    /// Make the next `count` ID-universe queries fail, leaving change queries
    /// working.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn fail_next_node_ids(&self, count: usize) {
        self.state.lock().unwrap().node_ids_failures_left = count;
    }

    /// Cursor a caller would hold after draining the log.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn head(&self) -> Cursor {
        Cursor::new(self.state.lock().unwrap().log.len().to_string())
    }

    /// Number of change pages served or refused.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn changes_calls(&self) -> usize {
        self.state.lock().unwrap().changes_calls
    }

    /// Number of ID-universe queries served or refused.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn node_ids_calls(&self) -> usize {
        self.state.lock().unwrap().node_ids_calls
    }

    fn record(&self, action: ChangeAction) {
        let mut state = self.state.lock().unwrap();
        match action.to_node() {
            Some(node) => {
                state.live.insert(node.id.clone(), node);
            }
            None => {
                state.live.remove(&action.id);
            }
        }
        state.log.push(action);
    }
}

fn take_failure(state: &mut State) -> Result<(), SourceError> {
    if state.failures_left > 0 {
        state.failures_left -= 1;
        return Err(SourceError::Unavailable("mock failure".to_owned()));
    }
    Ok(())
}

fn parse_position(value: &str) -> Result<usize, SourceError> {
    value
        .parse()
        .map_err(|_| SourceError::Unavailable(format!("invalid cursor {value:?}")))
}

impl ContentSource for MockSource {
    async fn fetch_changes(
        &self,
        since: Option<&Cursor>,
        after: Option<&str>,
    ) -> Result<ChangePage, SourceError> {
        let mut state = self.state.lock().unwrap();
        state.changes_calls += 1;
        take_failure(&mut state)?;

        let window: Vec<ChangeAction> = match since {
            None => state
                .live
                .values()
                .map(|node| ChangeAction {
                    id: node.id.clone(),
                    kind: ChangeKind::Create,
                    node_type: node.node_type.clone(),
                    payload: node.payload.clone(),
                })
                .collect(),
            Some(cursor) => {
                let start = parse_position(cursor.as_str())?.min(state.log.len());
                state.log[start..].to_vec()
            }
        };

        let offset = after.map(parse_position).transpose()?.unwrap_or(0);
        let offset = offset.min(window.len());
        let end = offset.saturating_add(self.page_size).min(window.len());
        let has_next_page = end < window.len();

        Ok(ChangePage {
            actions: window[offset..end].to_vec(),
            page_info: PageInfo {
                has_next_page,
                end_cursor: has_next_page.then(|| end.to_string()),
            },
            cursor: Some(Cursor::new(state.log.len().to_string())),
        })
    }

    async fn fetch_node_ids(&self) -> Result<Vec<NodeId>, SourceError> {
        let mut state = self.state.lock().unwrap();
        state.node_ids_calls += 1;
        take_failure(&mut state)?;
        if state.node_ids_failures_left > 0 {
            state.node_ids_failures_left -= 1;
            return Err(SourceError::Unavailable("mock ID universe failure".to_owned()));
        }
        Ok(state.live.keys().cloned().collect())
    }
}

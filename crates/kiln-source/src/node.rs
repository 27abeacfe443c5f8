//! Content model shared by sources, the reconciler, and the build pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable identifier of a content node, unique within one source.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque position in the source's change log.
///
/// Returned by every change query and passed back as `since` on the next
/// pass. The caller owns it; nothing in Kiln reads it from ambient state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap a raw cursor value.
    pub fn new(cursor: impl Into<String>) -> Self {
        Self(cursor.into())
    }

    /// Raw cursor value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An entity fetched from the external source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    /// Node identifier.
    pub id: NodeId,
    /// Source-defined type name (e.g., "Post").
    pub node_type: String,
    /// Arbitrary data payload.
    pub payload: Value,
}

/// Kind of a detected change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// Node appeared.
    Create,
    /// Node payload changed.
    Update,
    /// Node disappeared.
    Delete,
}

/// One detected change for one node.
///
/// Produced by the reconciler and consumed once by the caller; never
/// persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeAction {
    /// Affected node.
    pub id: NodeId,
    /// What happened to it.
    #[serde(rename = "action")]
    pub kind: ChangeKind,
    /// Source-defined type name (empty for synthesized deletes).
    #[serde(rename = "type", default)]
    pub node_type: String,
    /// New payload for creates and updates.
    #[serde(rename = "data", default)]
    pub payload: Value,
}

impl ChangeAction {
    /// Build a create action.
    pub fn create(id: impl Into<NodeId>, node_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            kind: ChangeKind::Create,
            node_type: node_type.into(),
            payload,
        }
    }

    /// Build an update action.
    pub fn update(id: impl Into<NodeId>, node_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            kind: ChangeKind::Update,
            node_type: node_type.into(),
            payload,
        }
    }

    /// Build a delete action.
    pub fn delete(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            kind: ChangeKind::Delete,
            node_type: String::new(),
            payload: Value::Null,
        }
    }

    /// The node this action leaves behind, if any.
    #[must_use]
    pub fn to_node(&self) -> Option<ContentNode> {
        match self.kind {
            ChangeKind::Delete => None,
            ChangeKind::Create | ChangeKind::Update => Some(ContentNode {
                id: self.id.clone(),
                node_type: self.node_type.clone(),
                payload: self.payload.clone(),
            }),
        }
    }
}

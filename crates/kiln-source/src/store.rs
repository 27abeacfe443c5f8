//! In-memory node store with generation-based garbage collection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::node::{ChangeAction, ChangeKind, ContentNode, NodeId};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredNode {
    node: ContentNode,
    touched_in: u64,
}

/// Content nodes known to the build.
///
/// Every node remembers the generation in which it was last created, updated,
/// or touched. After a full reconciliation pass, nodes not touched in the
/// current generation are stale and [`NodeStore::collect_garbage`] drops them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeStore {
    nodes: HashMap<NodeId, StoredNode>,
    generation: u64,
}

impl NodeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation. Returns its number.
    pub fn begin_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Apply one change action.
    ///
    /// Creates and updates replace the stored node and mark it touched;
    /// deletes drop it. Deleting an unknown node is a no-op.
    pub fn apply(&mut self, action: &ChangeAction) {
        match action.kind {
            ChangeKind::Delete => {
                if self.nodes.remove(&action.id).is_some() {
                    tracing::debug!(id = %action.id, "deleted node");
                }
            }
            ChangeKind::Create | ChangeKind::Update => {
                if let Some(node) = action.to_node() {
                    self.nodes.insert(
                        action.id.clone(),
                        StoredNode {
                            node,
                            touched_in: self.generation,
                        },
                    );
                }
            }
        }
    }

    /// Mark a node as still live in the current generation.
    ///
    /// Returns `false` if the node is unknown.
    pub fn touch(&mut self, id: &NodeId) -> bool {
        match self.nodes.get_mut(id) {
            Some(stored) => {
                stored.touched_in = self.generation;
                true
            }
            None => false,
        }
    }

    /// Whether the node was touched in the current generation.
    #[must_use]
    pub fn is_touched(&self, id: &NodeId) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|stored| stored.touched_in == self.generation)
    }

    /// Look up a node.
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&ContentNode> {
        self.nodes.get(id).map(|stored| &stored.node)
    }

    /// Drop every node not touched in the current generation.
    ///
    /// Returns the dropped IDs, sorted.
    pub fn collect_garbage(&mut self) -> Vec<NodeId> {
        let generation = self.generation;
        let mut dropped: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, stored)| stored.touched_in != generation)
            .map(|(id, _)| id.clone())
            .collect();
        dropped.sort();

        for id in &dropped {
            self.nodes.remove(id);
        }
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "collected stale nodes");
        }
        dropped
    }

    /// Number of stored nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Stored node IDs, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Iterate over stored nodes in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &ContentNode> {
        self.nodes.values().map(|stored| &stored.node)
    }
}

//! Node reconciliation against an external source.
//!
//! A reconciliation pass drains every change page since the caller's cursor,
//! folds the actions per node, and computes the set of node IDs that are valid
//! after the pass. Full passes additionally compare against the source's ID
//! universe so deletions the change log never reported are still detected.
//!
//! Nothing is applied until every request of the pass has succeeded.

use std::collections::{BTreeSet, HashMap};

use kiln_cache::FingerprintStore;

use crate::node::{ChangeAction, ChangeKind, Cursor, NodeId};
use crate::observer::{NoopObserver, PhaseObserver};
use crate::source::{ContentSource, SourceError};
use crate::store::NodeStore;

/// Fingerprint store key of the valid node-ID set.
pub const CREATED_NODE_IDS: &str = "created-node-ids";

/// Phase reported around full reconciliation passes.
pub const PULL_PHASE: &str = "pull updates since last build";

/// Result of one reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Node IDs valid after the pass.
    pub valid_node_ids: BTreeSet<NodeId>,
    /// Folded actions, one per affected node, in first-seen order.
    pub actions: Vec<ChangeAction>,
    /// At least one action resulted.
    pub did_update: bool,
    /// Cursor to pass as `since` next time.
    pub cursor: Option<Cursor>,
}

impl ReconcileOutcome {
    /// IDs of every node touched by an action.
    #[must_use]
    pub fn changed_ids(&self) -> BTreeSet<NodeId> {
        self.actions.iter().map(|action| action.id.clone()).collect()
    }
}

/// Fetches node updates from a [`ContentSource`] and applies them.
pub struct Reconciler<'a, S> {
    source: &'a S,
    store: &'a FingerprintStore,
    observer: &'a dyn PhaseObserver,
}

impl<'a, S: ContentSource> Reconciler<'a, S> {
    /// Create a reconciler that reports phases nowhere.
    #[must_use]
    pub fn new(source: &'a S, store: &'a FingerprintStore) -> Self {
        Self {
            source,
            store,
            observer: &NoopObserver,
        }
    }

    /// Report phases to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: &'a dyn PhaseObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Compute what changed since `since` without mutating anything.
    ///
    /// `cached_node_ids` is the valid set of the previous pass. With
    /// `interval_refetching` the ID universe is not queried, so only deletions
    /// the change log reports are seen.
    ///
    /// # Errors
    ///
    /// Returns the first [`SourceError`] of the pass.
    pub async fn reconcile(
        &self,
        since: Option<&Cursor>,
        interval_refetching: bool,
        cached_node_ids: &BTreeSet<NodeId>,
    ) -> Result<ReconcileOutcome, SourceError> {
        if interval_refetching {
            return self.pull(since, false, cached_node_ids).await;
        }

        self.observer.on_phase_start(PULL_PHASE);
        let result = self.pull(since, true, cached_node_ids).await;
        self.observer.on_phase_end(PULL_PHASE);
        result
    }

    /// Reconcile and apply the outcome to `nodes`.
    ///
    /// Reads the previous valid set from the fingerprint store. Actions are
    /// applied to `nodes`; then, if anything changed or this is a full pass,
    /// every valid node is touched in a fresh generation and the valid set is
    /// stored. An interval pass that found nothing writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] with `nodes` and the store left untouched.
    pub async fn fetch_and_apply(
        &self,
        since: Option<&Cursor>,
        interval_refetching: bool,
        nodes: &mut NodeStore,
    ) -> Result<ReconcileOutcome, SourceError> {
        let cached: BTreeSet<NodeId> = self.store.get(CREATED_NODE_IDS).unwrap_or_default();
        let outcome = self.reconcile(since, interval_refetching, &cached).await?;

        if apply_outcome(&outcome, interval_refetching, nodes) {
            self.store.set(CREATED_NODE_IDS, &outcome.valid_node_ids);
        }

        Ok(outcome)
    }

    async fn pull(
        &self,
        since: Option<&Cursor>,
        full_pass: bool,
        cached_node_ids: &BTreeSet<NodeId>,
    ) -> Result<ReconcileOutcome, SourceError> {
        let mut raw = Vec::new();
        let mut cursor = since.cloned();
        let mut after: Option<String> = None;

        loop {
            let page = self.source.fetch_changes(since, after.as_deref()).await?;
            raw.extend(page.actions);
            if page.cursor.is_some() {
                cursor = page.cursor;
            }
            if !page.page_info.has_next_page {
                break;
            }
            match page.page_info.end_cursor {
                Some(next) if after.as_deref() != Some(next.as_str()) => after = Some(next),
                stalled => return Err(SourceError::StalledPagination(stalled.unwrap_or_default())),
            }
        }

        let universe: Option<BTreeSet<NodeId>> = if full_pass {
            Some(self.source.fetch_node_ids().await?.into_iter().collect())
        } else {
            None
        };

        let mut folded = ActionFold::default();
        for action in raw {
            folded.push(action);
        }

        if let Some(universe) = &universe {
            let known: Vec<NodeId> = cached_node_ids
                .iter()
                .chain(folded.live_ids())
                .filter(|id| !universe.contains(*id))
                .cloned()
                .collect();
            for id in known {
                folded.push(ChangeAction::delete(id));
            }
        }

        let actions = folded.into_actions();
        let mut valid_node_ids = cached_node_ids.clone();
        if let Some(universe) = universe {
            valid_node_ids.extend(universe);
        }
        for action in &actions {
            match action.kind {
                ChangeKind::Delete => {
                    valid_node_ids.remove(&action.id);
                }
                ChangeKind::Create | ChangeKind::Update => {
                    valid_node_ids.insert(action.id.clone());
                }
            }
        }

        let count = |kind: ChangeKind| actions.iter().filter(|a| a.kind == kind).count();
        tracing::info!(
            created = count(ChangeKind::Create),
            updated = count(ChangeKind::Update),
            deleted = count(ChangeKind::Delete),
            valid = valid_node_ids.len(),
            full_pass,
            "reconciled nodes"
        );

        Ok(ReconcileOutcome {
            did_update: !actions.is_empty(),
            valid_node_ids,
            actions,
            cursor,
        })
    }
}

/// Apply a reconciliation outcome to `nodes`.
///
/// Actions are always applied. Valid nodes are touched in a fresh generation
/// only if something changed or the pass was a full one. Returns whether the
/// valid set should be persisted, which is the same condition.
pub fn apply_outcome(
    outcome: &ReconcileOutcome,
    interval_refetching: bool,
    nodes: &mut NodeStore,
) -> bool {
    if !outcome.did_update && interval_refetching {
        return false;
    }

    nodes.begin_generation();
    for action in &outcome.actions {
        nodes.apply(action);
    }
    for id in &outcome.valid_node_ids {
        nodes.touch(id);
    }
    true
}

/// Per-node folding of the actions of one window.
///
/// A delete wins over anything else reported for the same node. A create
/// followed by updates stays a create carrying the latest payload. Otherwise
/// the last action wins.
#[derive(Default)]
struct ActionFold {
    actions: Vec<ChangeAction>,
    index: HashMap<NodeId, usize>,
}

impl ActionFold {
    fn push(&mut self, action: ChangeAction) {
        let Some(&slot) = self.index.get(&action.id) else {
            self.index.insert(action.id.clone(), self.actions.len());
            self.actions.push(action);
            return;
        };

        let existing = &mut self.actions[slot];
        match (existing.kind, action.kind) {
            (ChangeKind::Delete, _) => {
                tracing::debug!(id = %action.id, "ignoring change to node deleted in the same window");
            }
            (ChangeKind::Create, ChangeKind::Update) => {
                existing.node_type = action.node_type;
                existing.payload = action.payload;
            }
            _ => *existing = action,
        }
    }

    fn live_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.actions
            .iter()
            .filter(|action| action.kind != ChangeKind::Delete)
            .map(|action| &action.id)
    }

    fn into_actions(self) -> Vec<ChangeAction> {
        self.actions
    }
}

//! Content sourcing for Kiln.
//!
//! This crate fetches content nodes from an external system and keeps the
//! local view of them current:
//!
//! - [`ContentSource`]: Trait for the external system (changes since a cursor,
//!   plus the full ID universe)
//! - [`HttpSource`]: JSON-over-HTTP implementation
//! - [`NodeStore`]: In-memory nodes with generation-based touch and GC
//! - [`Reconciler`]: Drains changes, folds conflicts, computes the valid
//!   node-ID set and persists it in a [`kiln_cache::FingerprintStore`]
//! - [`PhaseObserver`]: Injected phase reporting
//! - [`MockSource`] for testing (behind `mock` feature flag)

mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod node;
mod observer;
mod reconcile;
mod source;
mod store;

pub use http::{DEFAULT_PER_PAGE, HttpSource};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockSource;
pub use node::{ChangeAction, ChangeKind, ContentNode, Cursor, NodeId};
pub use observer::{NoopObserver, PhaseObserver, TracingObserver};
pub use reconcile::{CREATED_NODE_IDS, PULL_PHASE, ReconcileOutcome, Reconciler, apply_outcome};
pub use source::{ChangePage, ContentSource, PageInfo, SourceError};
pub use store::NodeStore;

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(HttpSource: Send, Sync, Clone);
    assert_impl_all!(MockSource: Send, Sync);
    assert_impl_all!(NodeStore: Send, Sync);
    assert_impl_all!(TracingObserver: Send, Sync);
}

//! State carried from one build to the next.

use std::collections::{BTreeMap, BTreeSet};

use kiln_source::{Cursor, NodeStore};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::page::Page;

/// Fingerprint store key of the [`BuildState`].
pub const STATE_KEY: &str = "build-state";

/// What the previous build knew about one page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Template module path.
    pub template_id: String,
    /// Page query hash.
    pub query_hash: String,
    /// Entity keys the page depended on.
    pub dependency_ids: BTreeSet<String>,
    /// Static query hashes the page used.
    pub static_query_hashes: Vec<String>,
}

impl From<&Page> for PageRecord {
    fn from(page: &Page) -> Self {
        Self {
            template_id: page.template_id.clone(),
            query_hash: page.query_hash.clone(),
            dependency_ids: page.dependency_ids.clone(),
            static_query_hashes: page.static_query_hashes.clone(),
        }
    }
}

/// Inputs of the last successful build.
///
/// Written only after the manifest is published, so a failed build leaves
/// the previous snapshot in place.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSnapshot {
    /// Page records by path.
    pub pages: BTreeMap<String, PageRecord>,
    /// Fingerprints of every entity pages could depend on.
    pub entity_fingerprints: BTreeMap<String, Fingerprint>,
    /// Browser bundle compilation hash.
    pub browser_hash: String,
    /// SSR bundle compilation hash.
    pub ssr_hash: String,
}

impl BuildSnapshot {
    /// Paths of every page the build produced, sorted.
    pub fn page_paths(&self) -> impl Iterator<Item = &String> {
        self.pages.keys()
    }
}

/// Everything a build hands to the next one, stored as a single entry.
///
/// The node store and the source cursor only make sense together: a cursor
/// without its nodes would skip changes that were never applied. Keeping them
/// in one entry means a lost or corrupt entry loses both, and the next build
/// falls back to a full fetch and a full rebuild.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BuildState {
    /// Inputs of the last successful build.
    pub snapshot: Option<BuildSnapshot>,
    /// Source position the nodes are current to.
    pub cursor: Option<Cursor>,
    /// Nodes known as of `cursor`.
    pub nodes: NodeStore,
    /// A refetch pass saw changes that no successful build has rendered yet.
    #[serde(default)]
    pub rebuild_pending: bool,
}

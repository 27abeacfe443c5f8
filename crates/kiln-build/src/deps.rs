//! Page dependency tracking.
//!
//! Pages depend on entities: content nodes, template modules, and static
//! queries. Entities are identified by a namespaced key (see [`entity`]) so the
//! three kinds never collide.

use std::collections::{BTreeSet, HashMap, HashSet};

/// Entity key constructors.
pub mod entity {
    use kiln_source::NodeId;

    /// Key of a content node.
    #[must_use]
    pub fn node(id: &NodeId) -> String {
        format!("node:{id}")
    }

    /// Key of a module file, by path relative to the site root.
    #[must_use]
    pub fn module(path: &str) -> String {
        format!("module:{path}")
    }

    /// Key of a static query, by query hash.
    #[must_use]
    pub fn static_query(hash: &str) -> String {
        format!("static-query:{hash}")
    }
}

/// Bidirectional page/entity dependency graph.
///
/// Maintains both forward (page → entities) and reverse (entity → pages)
/// mappings, so finding the pages affected by a set of changed entities costs
/// time proportional to the changed entities, not to the site.
///
/// # Invariants
/// - Forward and reverse mappings are always consistent
/// - No entity maps to an empty page set
#[derive(Debug, Default)]
pub struct DependencyTracker {
    forward: HashMap<String, HashSet<String>>,
    reverse: HashMap<String, HashSet<String>>,
}

impl DependencyTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one dependency edge.
    pub fn record_dependency(&mut self, page: &str, dependency: &str) {
        self.forward
            .entry(page.to_owned())
            .or_default()
            .insert(dependency.to_owned());
        self.reverse
            .entry(dependency.to_owned())
            .or_default()
            .insert(page.to_owned());
    }

    /// Record every dependency of a page, replacing earlier ones.
    pub fn record_page<'a, I>(&mut self, page: &str, dependencies: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.remove_page(page);
        self.forward.insert(page.to_owned(), HashSet::new());
        for dependency in dependencies {
            self.record_dependency(page, dependency);
        }
    }

    /// Forget a page and its edges.
    pub fn remove_page(&mut self, page: &str) {
        let Some(old) = self.forward.remove(page) else {
            return;
        };

        for dependency in old {
            if let Some(pages) = self.reverse.get_mut(&dependency) {
                pages.remove(page);
                if pages.is_empty() {
                    self.reverse.remove(&dependency);
                }
            }
        }
    }

    /// Pages depending on any of `changed`.
    #[must_use]
    pub fn changed_since<'a, I>(&self, changed: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        changed
            .into_iter()
            .filter_map(|entity| self.reverse.get(entity))
            .flatten()
            .cloned()
            .collect()
    }

    /// Dependencies of a page.
    #[must_use]
    pub fn uses(&self, page: &str) -> Option<&HashSet<String>> {
        self.forward.get(page)
    }

    /// Pages depending on an entity.
    #[must_use]
    pub fn used_by(&self, entity: &str) -> Option<&HashSet<String>> {
        self.reverse.get(entity)
    }

    /// Number of tracked pages.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.forward.len()
    }
}

//! Build diffing.
//!
//! Compares the current inputs with the previous build's snapshot and decides
//! for every page whether it must be rendered, can be reused, or must be
//! deleted, and whether each bundle's compilation hash changed.

use std::collections::{BTreeMap, BTreeSet};

use crate::bundle::CompilationUnit;
use crate::deps::DependencyTracker;
use crate::fingerprint::Fingerprint;
use crate::manifest::{BuildManifest, CompilationHashChange};
use crate::page::{Page, PageStatus};
use crate::snapshot::{BuildSnapshot, PageRecord};

/// Everything the diff depends on for the current build.
#[derive(Clone, Debug)]
pub struct BuildInputs {
    /// Current pages in discovery order.
    pub pages: Vec<Page>,
    /// Current fingerprint of every entity pages may depend on.
    pub entity_fingerprints: BTreeMap<String, Fingerprint>,
    /// Entity keys reported changed by the source in this build.
    pub changed_entities: BTreeSet<String>,
    /// Browser bundle.
    pub browser: CompilationUnit,
    /// SSR bundle.
    pub ssr: CompilationUnit,
}

impl BuildInputs {
    /// Snapshot to persist once this build succeeds.
    #[must_use]
    pub fn snapshot(&self) -> BuildSnapshot {
        BuildSnapshot {
            pages: self
                .pages
                .iter()
                .map(|page| (page.path.clone(), PageRecord::from(page)))
                .collect(),
            entity_fingerprints: self.entity_fingerprints.clone(),
            browser_hash: self.browser.compilation_hash.clone(),
            ssr_hash: self.ssr.compilation_hash.clone(),
        }
    }
}

/// Outcome of a diff.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildPlan {
    /// Status of every current and removed page.
    pub statuses: BTreeMap<String, PageStatus>,
    /// Pages to render, in discovery order.
    pub generated: Vec<String>,
    /// Pages to delete, sorted.
    pub removed: Vec<String>,
    /// Every current page, in discovery order.
    pub all_pages: Vec<String>,
    /// New browser compilation hash, if it changed.
    pub browser_change: Option<String>,
    /// New SSR compilation hash, if it changed.
    pub ssr_change: Option<String>,
    /// Entity keys considered changed.
    pub changed_entities: BTreeSet<String>,
}

impl BuildPlan {
    /// Status of a page; [`PageStatus::Unknown`] if the plan never saw it.
    #[must_use]
    pub fn status(&self, path: &str) -> PageStatus {
        self.statuses.get(path).copied().unwrap_or_default()
    }

    /// Pages reused as-is.
    pub fn stable(&self) -> impl Iterator<Item = &String> {
        self.all_pages
            .iter()
            .filter(|path| self.status(path) == PageStatus::Stable)
    }

    /// Manifest describing this plan.
    #[must_use]
    pub fn manifest(&self) -> BuildManifest {
        BuildManifest {
            generated: self.generated.clone(),
            removed: self.removed.clone(),
            all_pages: self.all_pages.clone(),
            changed_browser_compilation_hash: CompilationHashChange::from_option(
                self.browser_change.clone(),
            ),
            changed_ssr_compilation_hash: CompilationHashChange::from_option(
                self.ssr_change.clone(),
            ),
        }
    }
}

/// Computes [`BuildPlan`]s.
pub struct DiffEngine;

impl DiffEngine {
    /// Diff the current inputs against the previous snapshot.
    ///
    /// `existing_output` holds the page paths found in the output directory.
    /// With no snapshot every page is new, both bundles count as changed, and
    /// every page found on disk but not produced now is removed. A page whose
    /// output went missing is regenerated even if its inputs did not change.
    /// When either bundle changed every page is stale, since rendered HTML
    /// embeds bundle references.
    #[must_use]
    pub fn diff(
        previous: Option<&BuildSnapshot>,
        inputs: &BuildInputs,
        existing_output: &BTreeSet<String>,
    ) -> BuildPlan {
        let changed_entities = changed_entities(previous, inputs);

        let browser_change = compilation_change(
            previous.map(|p| p.browser_hash.as_str()),
            &inputs.browser,
        );
        let ssr_change = compilation_change(previous.map(|p| p.ssr_hash.as_str()), &inputs.ssr);
        let bundles_changed = browser_change.is_some() || ssr_change.is_some();

        let mut tracker = DependencyTracker::new();
        for page in &inputs.pages {
            tracker.record_page(&page.path, &page.dependency_ids);
        }
        let affected = tracker.changed_since(&changed_entities);

        let mut plan = BuildPlan {
            browser_change,
            ssr_change,
            ..BuildPlan::default()
        };

        for page in &inputs.pages {
            let status = match previous.and_then(|p| p.pages.get(&page.path)) {
                None => PageStatus::New,
                Some(record) => {
                    let stale = bundles_changed
                        || affected.contains(&page.path)
                        || !existing_output.contains(&page.path)
                        || record.query_hash != page.query_hash
                        || record.template_id != page.template_id
                        || record.dependency_ids != page.dependency_ids
                        || record.static_query_hashes != page.static_query_hashes;
                    if stale {
                        PageStatus::Stale
                    } else {
                        PageStatus::Stable
                    }
                }
            };

            plan.all_pages.push(page.path.clone());
            if status.is_generated() {
                plan.generated.push(page.path.clone());
            }
            plan.statuses.insert(page.path.clone(), status);
        }

        let produced_before = previous.into_iter().flat_map(BuildSnapshot::page_paths);
        let removed: BTreeSet<&String> = produced_before
            .chain(existing_output)
            .filter(|path| !plan.statuses.contains_key(*path))
            .collect();
        for path in removed {
            plan.removed.push(path.clone());
            plan.statuses.insert(path.clone(), PageStatus::Removed);
        }

        tracing::info!(
            pages = plan.all_pages.len(),
            generated = plan.generated.len(),
            removed = plan.removed.len(),
            changed_entities = changed_entities.len(),
            browser_changed = plan.browser_change.is_some(),
            ssr_changed = plan.ssr_change.is_some(),
            "computed build plan"
        );

        plan.changed_entities = changed_entities;
        plan
    }
}

/// Source-reported changes plus every entity whose fingerprint differs from
/// the snapshot, including entities that disappeared.
fn changed_entities(previous: Option<&BuildSnapshot>, inputs: &BuildInputs) -> BTreeSet<String> {
    let mut changed = inputs.changed_entities.clone();
    let Some(previous) = previous else {
        return changed;
    };

    for (key, fingerprint) in &inputs.entity_fingerprints {
        if previous.entity_fingerprints.get(key) != Some(fingerprint) {
            changed.insert(key.clone());
        }
    }
    for key in previous.entity_fingerprints.keys() {
        if !inputs.entity_fingerprints.contains_key(key) {
            changed.insert(key.clone());
        }
    }
    changed
}

fn compilation_change(previous: Option<&str>, unit: &CompilationUnit) -> Option<String> {
    (previous != Some(unit.compilation_hash.as_str())).then(|| unit.compilation_hash.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleKind;
    use crate::deps::entity;
    use crate::page::PageSpec;
    use kiln_source::NodeId;
    use pretty_assertions::assert_eq;

    fn page(path: &str, nodes: &[&str]) -> Page {
        Page::resolve(
            &PageSpec {
                path: path.to_owned(),
                template: "src/templates/post.js".to_owned(),
                query: Some("{ post { title } }".to_owned()),
                dependencies: nodes.iter().map(|n| NodeId::new(*n)).collect(),
                static_queries: Vec::new(),
            },
            0,
        )
    }

    fn unit(kind: BundleKind, content: &[u8]) -> CompilationUnit {
        CompilationUnit::from_inputs(
            kind,
            BTreeMap::from([("src/app.js".to_owned(), Fingerprint::of_bytes(content))]),
        )
    }

    fn inputs(pages: Vec<Page>) -> BuildInputs {
        let mut entity_fingerprints = BTreeMap::new();
        for p in &pages {
            for dep in &p.dependency_ids {
                entity_fingerprints.insert(dep.clone(), Fingerprint::of_bytes(dep.as_bytes()));
            }
        }
        BuildInputs {
            pages,
            entity_fingerprints,
            changed_entities: BTreeSet::new(),
            browser: unit(BundleKind::Browser, b"browser"),
            ssr: unit(BundleKind::Ssr, b"ssr"),
        }
    }

    fn paths(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| (*v).to_owned()).collect()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_owned()).collect()
    }

    #[test]
    fn test_first_build_generates_everything() {
        let current = inputs(vec![page("/a", &["1"]), page("/b", &["2"])]);
        let plan = DiffEngine::diff(None, &current, &BTreeSet::new());

        assert_eq!(plan.generated, strings(&["/a", "/b"]));
        assert_eq!(plan.generated, plan.all_pages);
        assert_eq!(plan.status("/a"), PageStatus::New);
        assert!(plan.browser_change.is_some());
        assert!(plan.ssr_change.is_some());
        assert!(plan.removed.is_empty());
    }

    #[test]
    fn test_unchanged_rebuild_is_stable() {
        let current = inputs(vec![page("/a", &["1"]), page("/b", &["2"])]);
        let snapshot = current.snapshot();

        let plan = DiffEngine::diff(Some(&snapshot), &current, &paths(&["/a", "/b"]));
        assert!(plan.generated.is_empty());
        assert_eq!(plan.stable().count(), 2);
        assert_eq!(plan.manifest().changed_browser_compilation_hash, CompilationHashChange::NotChanged);
    }

    #[test]
    fn test_content_change_regenerates_dependents_only() {
        let before = inputs(vec![page("/a", &["1"]), page("/b", &["2"])]);
        let snapshot = before.snapshot();

        let mut after = before.clone();
        after.changed_entities.insert(entity::node(&NodeId::new("2")));

        let plan = DiffEngine::diff(Some(&snapshot), &after, &paths(&["/a", "/b"]));
        assert_eq!(plan.generated, strings(&["/b"]));
        assert_eq!(plan.status("/a"), PageStatus::Stable);
        assert_eq!(plan.status("/b"), PageStatus::Stale);
        assert!(plan.browser_change.is_none());
        assert!(plan.ssr_change.is_none());
    }

    #[test]
    fn test_fingerprint_change_without_report_is_detected() {
        let before = inputs(vec![page("/a", &["1"]), page("/b", &["2"])]);
        let snapshot = before.snapshot();

        let mut after = before.clone();
        after
            .entity_fingerprints
            .insert("node:1".to_owned(), Fingerprint::of_bytes(b"edited"));

        let plan = DiffEngine::diff(Some(&snapshot), &after, &paths(&["/a", "/b"]));
        assert_eq!(plan.generated, strings(&["/a"]));
        assert!(plan.changed_entities.contains("node:1"));
    }

    #[test]
    fn test_changed_dependency_set_regenerates_page() {
        let before = inputs(vec![page("/a", &["1"]), page("/b", &["2"])]);
        let snapshot = before.snapshot();

        let after = inputs(vec![page("/a", &["1", "2"]), page("/b", &["2"])]);

        let plan = DiffEngine::diff(Some(&snapshot), &after, &paths(&["/a", "/b"]));
        assert!(plan.changed_entities.is_empty());
        assert_eq!(plan.generated, strings(&["/a"]));
        assert_eq!(plan.status("/b"), PageStatus::Stable);
    }

    #[test]
    fn test_bundle_change_regenerates_everything() {
        let before = inputs(vec![page("/a", &["1"]), page("/b", &["2"])]);
        let snapshot = before.snapshot();

        let mut after = before.clone();
        after.ssr = unit(BundleKind::Ssr, b"ssr v2");

        let plan = DiffEngine::diff(Some(&snapshot), &after, &paths(&["/a", "/b"]));
        assert_eq!(plan.generated, plan.all_pages);
        assert!(plan.browser_change.is_none());
        assert_eq!(plan.ssr_change, Some(after.ssr.compilation_hash.clone()));
    }

    #[test]
    fn test_query_change_makes_page_stale() {
        let before = inputs(vec![page("/a", &["1"])]);
        let snapshot = before.snapshot();

        let mut after = before.clone();
        after.pages[0].query_hash = "changed".to_owned();

        let plan = DiffEngine::diff(Some(&snapshot), &after, &paths(&["/a"]));
        assert_eq!(plan.status("/a"), PageStatus::Stale);
    }

    #[test]
    fn test_dropped_page_is_removed() {
        let before = inputs(vec![page("/a", &["1"]), page("/b", &["2"])]);
        let snapshot = before.snapshot();
        let after = inputs(vec![page("/a", &["1"])]);

        let plan = DiffEngine::diff(Some(&snapshot), &after, &paths(&["/a", "/b"]));
        assert_eq!(plan.removed, strings(&["/b"]));
        assert_eq!(plan.status("/b"), PageStatus::Removed);
        assert!(plan.changed_entities.contains("node:2"));
        assert!(plan.generated.is_empty());
    }

    #[test]
    fn test_wiped_cache_with_output_kept() {
        let current = inputs(vec![page("/a", &["1"])]);
        let on_disk = paths(&["/a", "/stale/page"]);

        let plan = DiffEngine::diff(None, &current, &on_disk);
        assert_eq!(plan.generated, strings(&["/a"]));
        assert_eq!(plan.removed, strings(&["/stale/page"]));
        assert!(plan.browser_change.is_some() && plan.ssr_change.is_some());
    }

    #[test]
    fn test_missing_output_is_regenerated() {
        let current = inputs(vec![page("/a", &["1"]), page("/b", &["2"])]);
        let snapshot = current.snapshot();

        let plan = DiffEngine::diff(Some(&snapshot), &current, &paths(&["/a"]));
        assert_eq!(plan.generated, strings(&["/b"]));
    }

    #[test]
    fn test_unknown_page_status() {
        let plan = DiffEngine::diff(None, &inputs(Vec::new()), &BTreeSet::new());
        assert_eq!(plan.status("/nowhere"), PageStatus::Unknown);
    }
}

//! Build orchestration.
//!
//! [`SiteBuilder`] ties the pieces together. A full build:
//!
//! 1. acquires the build lock
//! 2. loads the build state (snapshot, node store, source cursor)
//! 3. reconciles nodes against the source (full pass)
//! 4. fingerprints templates, static queries, nodes, and bundle modules
//! 5. diffs against the snapshot
//! 6. renders generated pages, refreshes page data of stable pages, and
//!    deletes removed pages
//! 7. publishes the manifest
//! 8. persists the valid node IDs and the new build state
//!
//! Nothing is persisted before the manifest is published, so a failed build
//! leaves the fingerprint store as it was. A missing or corrupt build state
//! drops the cursor along with the nodes, so the next build fetches all
//! content again and rebuilds every page.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use kiln_cache::Cache;
use kiln_config::Config;
use kiln_source::{
    CREATED_NODE_IDS, ContentSource, NodeId, NodeStore, NoopObserver, PhaseObserver, Reconciler,
    apply_outcome,
};
use rayon::prelude::*;
use serde_json::{Value, json};

use crate::bundle::{BundleKind, CompilationUnit, fingerprint_modules};
use crate::deps::entity;
use crate::diff::{BuildInputs, BuildPlan, DiffEngine};
use crate::error::BuildError;
use crate::fingerprint::{Fingerprint, FingerprintStore};
use crate::lock::BuildLock;
use crate::manifest::{BuildManifest, ManifestWriter};
use crate::output::{BasicRenderer, OutputDir, PageData, PageRenderer, RenderContext};
use crate::page::{Page, load_pages};
use crate::query::strip_ignored_characters;
use crate::snapshot::{BuildSnapshot, BuildState, STATE_KEY};

/// Where a build reads from and writes to.
#[derive(Clone, Debug)]
pub struct BuildOptions {
    /// Base directory for templates and bundle modules.
    pub root: PathBuf,
    /// Page definitions file.
    pub pages_file: PathBuf,
    /// Output directory.
    pub output_dir: PathBuf,
    /// Directory for the manifest and the build lock.
    pub cache_dir: PathBuf,
    /// Query hash seed.
    pub query_seed: u32,
    /// Browser bundle module patterns.
    pub browser_patterns: Vec<String>,
    /// SSR bundle module patterns.
    pub ssr_patterns: Vec<String>,
}

impl BuildOptions {
    /// Options from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let site = &config.site_resolved;
        Self {
            root: site.root.clone(),
            pages_file: site.pages_file.clone(),
            output_dir: site.output_dir.clone(),
            cache_dir: site.cache_dir.clone(),
            query_seed: config.query.seed,
            browser_patterns: config.bundles.browser.clone(),
            ssr_patterns: config.bundles.ssr.clone(),
        }
    }
}

/// Result of a successful build.
#[derive(Clone, Debug)]
pub struct BuildReport {
    /// Published manifest.
    pub manifest: BuildManifest,
    /// Where it was published.
    pub manifest_path: PathBuf,
    /// Full build plan.
    pub plan: BuildPlan,
    /// Nodes known after the build.
    pub node_count: usize,
}

/// Runs full builds and interval refetch passes.
pub struct SiteBuilder<S> {
    options: BuildOptions,
    source: S,
    cache: Box<dyn Cache>,
    renderer: Box<dyn PageRenderer>,
    observer: Box<dyn PhaseObserver>,
}

impl<S: ContentSource> SiteBuilder<S> {
    /// Create a builder rendering with [`BasicRenderer`].
    pub fn new(options: BuildOptions, source: S, cache: Box<dyn Cache>) -> Self {
        Self {
            options,
            source,
            cache,
            renderer: Box::new(BasicRenderer),
            observer: Box::new(NoopObserver),
        }
    }

    /// Render pages with `renderer`.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Box<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Report phases to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn PhaseObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Build options.
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Content source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run a full build.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] for any failure; the fingerprint store is then
    /// left as it was before the build.
    pub async fn build(&self) -> Result<BuildReport, BuildError> {
        let _lock = BuildLock::acquire(&self.options.cache_dir)?;
        let store = FingerprintStore::open(self.cache.as_ref());

        let (state, cached_ids) = match store.get::<BuildState>(STATE_KEY) {
            Some(state) => {
                let cached_ids: BTreeSet<NodeId> =
                    store.get(CREATED_NODE_IDS).unwrap_or_default();
                (state, cached_ids)
            }
            None => {
                tracing::info!("no build state, fetching all content");
                (BuildState::default(), BTreeSet::new())
            }
        };
        let BuildState {
            snapshot: previous,
            cursor,
            mut nodes,
            ..
        } = state;
        if previous.is_none() {
            tracing::info!("no previous build snapshot, building everything");
        }

        let outcome = Reconciler::new(&self.source, &store)
            .with_observer(self.observer.as_ref())
            .reconcile(cursor.as_ref(), false, &cached_ids)
            .await?;
        apply_outcome(&outcome, false, &mut nodes);
        nodes.collect_garbage();

        self.observer.on_phase_start("compute build plan");
        let planned = self.plan(previous.as_ref(), &outcome.changed_ids(), &nodes);
        self.observer.on_phase_end("compute build plan");
        let (inputs, plan) = planned?;

        self.observer.on_phase_start("write pages");
        let written = self.write_pages(&inputs, &plan, &nodes);
        self.observer.on_phase_end("write pages");
        written?;

        let manifest = plan.manifest();
        let manifest_path = ManifestWriter::new(&self.options.cache_dir).write(&manifest)?;

        let node_count = nodes.len();
        store.set(CREATED_NODE_IDS, &outcome.valid_node_ids);
        store.set(
            STATE_KEY,
            &BuildState {
                snapshot: Some(inputs.snapshot()),
                cursor: outcome.cursor,
                nodes,
                rebuild_pending: false,
            },
        );

        Ok(BuildReport {
            manifest,
            manifest_path,
            plan,
            node_count,
        })
    }

    /// Run one interval refetch pass.
    ///
    /// Returns whether a build is due: the source reported changes in this
    /// pass, or an earlier pass did and no build has succeeded since. A quiet
    /// pass writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Locked`] while a build runs and
    /// [`BuildError::Source`] if fetching fails.
    pub async fn refetch(&self) -> Result<bool, BuildError> {
        let _lock = BuildLock::acquire(&self.options.cache_dir)?;
        let store = FingerprintStore::open(self.cache.as_ref());

        let mut state: BuildState = store.get(STATE_KEY).unwrap_or_default();

        let outcome = Reconciler::new(&self.source, &store)
            .with_observer(self.observer.as_ref())
            .fetch_and_apply(state.cursor.as_ref(), true, &mut state.nodes)
            .await?;

        if outcome.did_update {
            state.cursor = outcome.cursor;
            state.rebuild_pending = true;
            store.set(STATE_KEY, &state);
            tracing::info!(changes = outcome.actions.len(), "source reported changes");
        } else if state.rebuild_pending {
            tracing::info!("changes from an earlier pass are not built yet");
        }
        Ok(state.rebuild_pending)
    }

    fn plan(
        &self,
        previous: Option<&BuildSnapshot>,
        changed_nodes: &BTreeSet<NodeId>,
        nodes: &NodeStore,
    ) -> Result<(BuildInputs, BuildPlan), BuildError> {
        let specs = load_pages(&self.options.pages_file)?;
        let pages: Vec<Page> = specs
            .iter()
            .map(|spec| Page::resolve(spec, self.options.query_seed))
            .collect();

        let mut entity_fingerprints = BTreeMap::new();
        for node in nodes.nodes() {
            let fingerprint =
                Fingerprint::of_json(&json!({"type": node.node_type, "payload": node.payload}));
            entity_fingerprints.insert(entity::node(&node.id), fingerprint);
        }

        let templates: BTreeSet<String> = specs.iter().map(|spec| spec.template.clone()).collect();
        for (module, fingerprint) in fingerprint_modules(&self.options.root, &templates)? {
            entity_fingerprints.insert(entity::module(&module), fingerprint);
        }

        for spec in &specs {
            for query in &spec.static_queries {
                let hash = crate::query::hash_query(query, self.options.query_seed);
                let stripped = strip_ignored_characters(query);
                entity_fingerprints.insert(
                    entity::static_query(&hash),
                    Fingerprint::of_bytes(stripped.as_bytes()),
                );
            }
        }

        let browser = CompilationUnit::collect(
            BundleKind::Browser,
            &self.options.root,
            &self.options.browser_patterns,
        )?;
        let ssr =
            CompilationUnit::collect(BundleKind::Ssr, &self.options.root, &self.options.ssr_patterns)?;

        let inputs = BuildInputs {
            pages,
            entity_fingerprints,
            changed_entities: changed_nodes.iter().map(entity::node).collect(),
            browser,
            ssr,
        };

        let output = OutputDir::new(&self.options.output_dir);
        let existing = output.existing_pages()?;
        let plan = DiffEngine::diff(previous, &inputs, &existing);
        Ok((inputs, plan))
    }

    fn write_pages(
        &self,
        inputs: &BuildInputs,
        plan: &BuildPlan,
        nodes: &NodeStore,
    ) -> Result<(), BuildError> {
        let output = OutputDir::new(&self.options.output_dir);
        let templates = self.read_templates(inputs)?;
        let by_path: HashMap<&str, &Page> = inputs
            .pages
            .iter()
            .map(|page| (page.path.as_str(), page))
            .collect();

        let renderer = self.renderer.as_ref();
        plan.generated.par_iter().try_for_each(|path| {
            let page = by_path[path.as_str()];
            let data = page_data(page, nodes);
            let ctx = RenderContext {
                page,
                template: &templates[&page.template_id],
                data: &data,
                browser_hash: &inputs.browser.compilation_hash,
            };
            let html = renderer.render(&ctx).map_err(|source| BuildError::Render {
                path: path.clone(),
                source,
            })?;
            output.write_page(path, &html, &data)?;
            Ok::<(), BuildError>(())
        })?;

        let mut refreshed = 0;
        for path in plan.stable() {
            let page = by_path[path.as_str()];
            if output.write_page_data(path, &page_data(page, nodes))? {
                refreshed += 1;
            }
        }

        for path in &plan.removed {
            output.remove_page(path)?;
        }

        tracing::info!(
            rendered = plan.generated.len(),
            refreshed,
            removed = plan.removed.len(),
            "wrote pages"
        );
        Ok(())
    }

    fn read_templates(&self, inputs: &BuildInputs) -> Result<HashMap<String, String>, BuildError> {
        let mut templates = HashMap::new();
        for page in &inputs.pages {
            if templates.contains_key(&page.template_id) {
                continue;
            }
            let path = self.options.root.join(&page.template_id);
            let source = read_template(&path)?;
            templates.insert(page.template_id.clone(), source);
        }
        Ok(templates)
    }
}

fn read_template(path: &Path) -> Result<String, BuildError> {
    fs::read_to_string(path).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Page data for a page: its content nodes, in declaration order.
///
/// Nodes the store does not know are left out.
fn page_data(page: &Page, nodes: &NodeStore) -> PageData {
    let resolved: Vec<Value> = page
        .nodes
        .iter()
        .filter_map(|id| {
            let node = nodes.get(id);
            if node.is_none() {
                tracing::debug!(page = %page.path, node = %id, "page depends on unknown node");
            }
            node
        })
        .map(|node| json!({"id": node.id, "type": node.node_type, "payload": node.payload}))
        .collect();

    PageData {
        path: page.path.clone(),
        template_id: page.template_id.clone(),
        static_query_hashes: page.static_query_hashes.clone(),
        result: json!({"data": {"nodes": resolved}}),
    }
}

//! Page definitions and resolved pages.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use kiln_source::NodeId;
use serde::{Deserialize, Serialize};

use crate::deps::entity;
use crate::error::BuildError;
use crate::query::hash_query;

/// One entry of `pages.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSpec {
    /// URL path, starting with `/`.
    pub path: String,
    /// Template module, relative to the site root.
    pub template: String,
    /// Page query text.
    #[serde(default)]
    pub query: Option<String>,
    /// Content nodes the page reads.
    #[serde(default)]
    pub dependencies: Vec<NodeId>,
    /// Static query texts used by the page's components.
    #[serde(default)]
    pub static_queries: Vec<String>,
}

/// Build status of a page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageStatus {
    /// Not part of the current plan.
    #[default]
    Unknown,
    /// Inputs unchanged; artifacts reused.
    Stable,
    /// Some input changed; must be regenerated.
    Stale,
    /// Not present in the previous build.
    New,
    /// Produced before, not produced now; artifacts deleted.
    Removed,
}

impl PageStatus {
    /// Whether the page is rendered in this build.
    #[must_use]
    pub fn is_generated(self) -> bool {
        matches!(self, Self::New | Self::Stale)
    }
}

/// A page with its fingerprintable inputs resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page {
    /// URL path, unique key.
    pub path: String,
    /// Template module path.
    pub template_id: String,
    /// Hash of the page query (of the empty query if none).
    pub query_hash: String,
    /// Entity keys the page depends on.
    pub dependency_ids: BTreeSet<String>,
    /// Hashes of the static queries the page uses, sorted.
    pub static_query_hashes: Vec<String>,
    /// Content nodes read by the page query.
    pub nodes: Vec<NodeId>,
}

impl Page {
    /// Resolve a page definition.
    ///
    /// Dependencies are the page's content nodes, its template module, and
    /// its static queries.
    #[must_use]
    pub fn resolve(spec: &PageSpec, seed: u32) -> Self {
        let static_query_hashes: BTreeSet<String> = spec
            .static_queries
            .iter()
            .map(|query| hash_query(query, seed))
            .collect();

        let mut dependency_ids: BTreeSet<String> =
            spec.dependencies.iter().map(entity::node).collect();
        dependency_ids.insert(entity::module(&spec.template));
        dependency_ids.extend(static_query_hashes.iter().map(|hash| entity::static_query(hash)));

        Self {
            path: spec.path.clone(),
            template_id: spec.template.clone(),
            query_hash: hash_query(spec.query.as_deref().unwrap_or_default(), seed),
            dependency_ids,
            static_query_hashes: static_query_hashes.into_iter().collect(),
            nodes: spec.dependencies.clone(),
        }
    }
}

/// Load and validate page definitions.
///
/// # Errors
///
/// Returns [`BuildError::Io`] if the file cannot be read and
/// [`BuildError::Pages`] if it is malformed, a path is invalid, or a path
/// appears twice.
pub fn load_pages(file: &Path) -> Result<Vec<PageSpec>, BuildError> {
    let content = fs::read_to_string(file).map_err(|source| BuildError::Io {
        path: file.to_path_buf(),
        source,
    })?;

    let specs: Vec<PageSpec> = serde_json::from_str(&content).map_err(|e| BuildError::Pages {
        file: file.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut seen = HashSet::new();
    for spec in &specs {
        if !is_valid_page_path(&spec.path) {
            return Err(BuildError::Pages {
                file: file.to_path_buf(),
                message: format!("invalid page path {:?}", spec.path),
            });
        }
        if !seen.insert(spec.path.as_str()) {
            return Err(BuildError::Pages {
                file: file.to_path_buf(),
                message: format!("duplicate page path {:?}", spec.path),
            });
        }
        if spec.template.is_empty() {
            return Err(BuildError::Pages {
                file: file.to_path_buf(),
                message: format!("page {:?} has no template", spec.path),
            });
        }
    }

    Ok(specs)
}

/// Whether `path` is absolute and free of `.`/`..` and empty segments.
///
/// Only the root path `/` may end with a slash. Paths under `/page-data` are
/// reserved for page data files, and `/index` is reserved because the root
/// page's data lives under `page-data/index`.
#[must_use]
pub fn is_valid_page_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    if rest == "index" || rest.split('/').next() == Some("page-data") {
        return false;
    }
    rest.is_empty()
        || rest.split('/').all(|segment| {
            !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('\\')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_pages(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("pages.json");
        fs::write(&file, content).unwrap();
        (temp, file)
    }

    #[test]
    fn test_load_pages() {
        let (_temp, file) = write_pages(
            r#"[
                {"path": "/", "template": "src/templates/index.js"},
                {
                    "path": "/blog/hello",
                    "template": "src/templates/post.js",
                    "query": "{ post(id: \"hello\") { title } }",
                    "dependencies": ["post-hello"],
                    "staticQueries": ["{ site { title } }"]
                }
            ]"#,
        );

        let specs = load_pages(&file).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].dependencies, vec![NodeId::new("post-hello")]);
        assert_eq!(specs[1].static_queries.len(), 1);
        assert!(specs[0].query.is_none());
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let (_temp, file) = write_pages(
            r#"[{"path": "/a", "template": "t.js"}, {"path": "/a", "template": "t.js"}]"#,
        );
        let err = load_pages(&file).unwrap_err();
        assert!(err.to_string().contains("duplicate page path"), "{err}");
    }

    #[test]
    fn test_malformed_file_rejected() {
        let (_temp, file) = write_pages("{not json");
        assert!(matches!(load_pages(&file), Err(BuildError::Pages { .. })));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_pages(&temp.path().join("pages.json")),
            Err(BuildError::Io { .. })
        ));
    }

    #[test]
    fn test_page_path_validation() {
        assert!(is_valid_page_path("/"));
        assert!(is_valid_page_path("/blog/hello"));
        assert!(!is_valid_page_path("/blog/hello/"));
        assert!(!is_valid_page_path("blog"));
        assert!(!is_valid_page_path("/blog/../etc"));
        assert!(!is_valid_page_path("/blog//x"));
        assert!(!is_valid_page_path(""));
        assert!(!is_valid_page_path("/page-data/x"));
        assert!(!is_valid_page_path("/index"));
        assert!(is_valid_page_path("/index/archive"));
    }

    #[test]
    fn test_root_and_index_cannot_share_page_data() {
        let (_temp, file) = write_pages(
            r#"[{"path": "/", "template": "t.js"}, {"path": "/index", "template": "t.js"}]"#,
        );
        let err = load_pages(&file).unwrap_err();
        assert!(err.to_string().contains("invalid page path \"/index\""), "{err}");
    }

    #[test]
    fn test_resolve_collects_dependencies() {
        let spec = PageSpec {
            path: "/blog/hello".to_owned(),
            template: "src/templates/post.js".to_owned(),
            query: None,
            dependencies: vec![NodeId::new("post-hello")],
            static_queries: vec!["{ site { title } }".to_owned(), "{site{title}}".to_owned()],
        };

        let page = Page::resolve(&spec, 0);
        let title_hash = hash_query("{site{title}}", 0);

        assert_eq!(page.static_query_hashes, vec![title_hash.clone()]);
        assert_eq!(page.query_hash, hash_query("", 0));
        assert_eq!(
            page.dependency_ids,
            BTreeSet::from([
                "module:src/templates/post.js".to_owned(),
                "node:post-hello".to_owned(),
                format!("static-query:{title_hash}"),
            ])
        );
    }

    #[test]
    fn test_only_new_and_stale_are_generated() {
        assert!(PageStatus::New.is_generated());
        assert!(PageStatus::Stale.is_generated());
        assert!(!PageStatus::Stable.is_generated());
        assert!(!PageStatus::Removed.is_generated());
        assert!(!PageStatus::Unknown.is_generated());
    }
}

//! Page artifacts in the output directory.
//!
//! Layout:
//! ```text
//! {output}/
//! +-- index.html                      # page "/"
//! +-- blog/hello/index.html           # page "/blog/hello"
//! +-- page-data/
//!     +-- index/page-data.json        # page "/"
//!     +-- blog/hello/page-data.json   # page "/blog/hello"
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OutputError, RenderError};
use crate::page::{Page, is_valid_page_path};

/// Directory holding page data files.
const PAGE_DATA_DIR: &str = "page-data";

/// Page data file name.
const PAGE_DATA_FILE: &str = "page-data.json";

/// Contents of a `page-data.json` file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData {
    /// Page path.
    pub path: String,
    /// Template module path.
    pub template_id: String,
    /// Hashes of the static queries the page uses.
    pub static_query_hashes: Vec<String>,
    /// Page query result.
    pub result: Value,
}

/// Inputs available to a renderer for one page.
pub struct RenderContext<'a> {
    /// The page.
    pub page: &'a Page,
    /// Template module source.
    pub template: &'a str,
    /// The page's data.
    pub data: &'a PageData,
    /// Current browser bundle compilation hash.
    pub browser_hash: &'a str,
}

/// Turns a page into HTML.
pub trait PageRenderer: Send + Sync {
    /// Render one page.
    fn render(&self, ctx: &RenderContext<'_>) -> Result<String, RenderError>;
}

/// Placeholder-substituting renderer.
///
/// Replaces `{{path}}`, `{{data}}` (HTML-escaped page data JSON), and
/// `{{scripts}}` (the browser bundle tag) in the template source. Without a
/// `{{scripts}}` placeholder the tag is inserted before `</body>`, or
/// appended.
pub struct BasicRenderer;

impl PageRenderer for BasicRenderer {
    fn render(&self, ctx: &RenderContext<'_>) -> Result<String, RenderError> {
        let data = serde_json::to_string(ctx.data).map_err(|e| RenderError(e.to_string()))?;
        let scripts = format!(r#"<script src="/app-{}.js"></script>"#, ctx.browser_hash);

        let mut html = ctx
            .template
            .replace("{{path}}", &escape_html(&ctx.page.path))
            .replace("{{data}}", &escape_html(&data));

        if html.contains("{{scripts}}") {
            html = html.replace("{{scripts}}", &scripts);
        } else if let Some(pos) = html.rfind("</body>") {
            html.insert_str(pos, &scripts);
        } else {
            html.push_str(&scripts);
        }
        Ok(html)
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Output directory of a site.
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    /// Output directory at `root`. Nothing is created until a page is written.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// HTML file of a page.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::InvalidPath`] for a path that would escape the
    /// output directory.
    pub fn html_path(&self, page_path: &str) -> Result<PathBuf, OutputError> {
        let relative = relative_dir(page_path)?;
        Ok(self.root.join(relative).join("index.html"))
    }

    /// Page data file of a page.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::InvalidPath`] for a path that would escape the
    /// output directory.
    pub fn page_data_path(&self, page_path: &str) -> Result<PathBuf, OutputError> {
        let relative = relative_dir(page_path)?;
        let dir = if relative.is_empty() { "index" } else { relative };
        Ok(self.root.join(PAGE_DATA_DIR).join(dir).join(PAGE_DATA_FILE))
    }

    /// Write a page's HTML and page data.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError`] if a file cannot be written.
    pub fn write_page(&self, page_path: &str, html: &str, data: &PageData) -> Result<(), OutputError> {
        write_file(&self.html_path(page_path)?, html.as_bytes())?;
        self.write_page_data(page_path, data)?;
        Ok(())
    }

    /// Write a page's data file unless it already holds `data`.
    ///
    /// Returns whether the file was written.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError`] if the file cannot be written.
    pub fn write_page_data(&self, page_path: &str, data: &PageData) -> Result<bool, OutputError> {
        let path = self.page_data_path(page_path)?;
        let json = serde_json::to_vec(data).map_err(|source| OutputError::Serialize {
            path: page_path.to_owned(),
            source,
        })?;

        if fs::read(&path).is_ok_and(|existing| existing == json) {
            return Ok(false);
        }
        write_file(&path, &json)?;
        Ok(true)
    }

    /// Read a page's data file, if present and parsable.
    #[must_use]
    pub fn read_page_data(&self, page_path: &str) -> Option<PageData> {
        let path = self.page_data_path(page_path).ok()?;
        serde_json::from_slice(&fs::read(path).ok()?).ok()
    }

    /// Page paths that have a page data file on disk.
    ///
    /// The path is taken from the file's `path` field; files that cannot be
    /// parsed fall back to their directory name.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Io`] if the page data directory cannot be read.
    pub fn existing_pages(&self) -> Result<BTreeSet<String>, OutputError> {
        let data_root = self.root.join(PAGE_DATA_DIR);
        let mut pages = BTreeSet::new();
        if !data_root.is_dir() {
            return Ok(pages);
        }

        let mut stack = vec![data_root.clone()];
        while let Some(dir) = stack.pop() {
            let entries = fs::read_dir(&dir).map_err(|source| OutputError::Io {
                path: dir.clone(),
                source,
            })?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.file_name().is_some_and(|n| n == PAGE_DATA_FILE) {
                    if let Some(page) = page_of_data_file(&data_root, &path) {
                        pages.insert(page);
                    }
                }
            }
        }
        Ok(pages)
    }

    /// Delete a page's HTML and data, pruning directories left empty.
    ///
    /// Missing files are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Io`] if an existing file cannot be removed.
    pub fn remove_page(&self, page_path: &str) -> Result<(), OutputError> {
        let html = self.html_path(page_path)?;
        let data = self.page_data_path(page_path)?;

        remove_file(&html)?;
        remove_file(&data)?;
        prune_empty_dirs(html.parent(), &self.root);
        prune_empty_dirs(data.parent(), &self.root.join(PAGE_DATA_DIR));
        tracing::debug!(page = page_path, "removed page artifacts");
        Ok(())
    }
}

/// Output-relative directory of a page, without leading slash.
fn relative_dir(page_path: &str) -> Result<&str, OutputError> {
    if !is_valid_page_path(page_path) {
        return Err(OutputError::InvalidPath(page_path.to_owned()));
    }
    Ok(page_path.trim_start_matches('/'))
}

fn page_of_data_file(data_root: &Path, file: &Path) -> Option<String> {
    if let Ok(bytes) = fs::read(file)
        && let Ok(data) = serde_json::from_slice::<PageData>(&bytes)
    {
        return Some(data.path);
    }

    let dir = file.parent()?.strip_prefix(data_root).ok()?;
    let relative = dir
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if relative.is_empty() {
        None
    } else if relative == "index" {
        Some("/".to_owned())
    } else {
        Some(format!("/{relative}"))
    }
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), OutputError> {
    let io_err = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, data).map_err(io_err)
}

fn remove_file(path: &Path) -> Result<(), OutputError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(OutputError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Remove `dir` and its ancestors while empty, stopping at `stop`.
fn prune_empty_dirs(dir: Option<&Path>, stop: &Path) {
    let mut current = dir;
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }
        // Fails on non-empty directories
        if fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageSpec;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn data(path: &str) -> PageData {
        PageData {
            path: path.to_owned(),
            template_id: "src/templates/post.js".to_owned(),
            static_query_hashes: vec!["123".to_owned()],
            result: json!({"data": {}}),
        }
    }

    #[test]
    fn test_paths() {
        let out = OutputDir::new("/site/public");
        assert_eq!(out.html_path("/").unwrap(), Path::new("/site/public/index.html"));
        assert_eq!(
            out.html_path("/blog/hello").unwrap(),
            Path::new("/site/public/blog/hello/index.html")
        );
        assert_eq!(
            out.page_data_path("/").unwrap(),
            Path::new("/site/public/page-data/index/page-data.json")
        );
        assert_eq!(
            out.page_data_path("/blog/hello").unwrap(),
            Path::new("/site/public/page-data/blog/hello/page-data.json")
        );
        assert!(matches!(out.html_path("/../etc"), Err(OutputError::InvalidPath(_))));
    }

    #[test]
    fn test_page_data_wire_format() {
        assert_eq!(
            serde_json::to_value(data("/a")).unwrap(),
            json!({
                "path": "/a",
                "templateId": "src/templates/post.js",
                "staticQueryHashes": ["123"],
                "result": {"data": {}}
            })
        );
    }

    #[test]
    fn test_write_and_discover_pages() {
        let temp = tempfile::tempdir().unwrap();
        let out = OutputDir::new(temp.path());

        out.write_page("/", "<html></html>", &data("/")).unwrap();
        out.write_page("/blog/hello", "<html></html>", &data("/blog/hello")).unwrap();

        assert_eq!(
            out.existing_pages().unwrap(),
            BTreeSet::from(["/".to_owned(), "/blog/hello".to_owned()])
        );
        assert_eq!(out.read_page_data("/blog/hello"), Some(data("/blog/hello")));
    }

    #[test]
    fn test_existing_pages_without_output() {
        let temp = tempfile::tempdir().unwrap();
        let out = OutputDir::new(temp.path().join("public"));
        assert!(out.existing_pages().unwrap().is_empty());
    }

    #[test]
    fn test_unparsable_page_data_falls_back_to_directory() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("page-data/docs/intro/page-data.json");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, "garbage").unwrap();

        let out = OutputDir::new(temp.path());
        assert_eq!(
            out.existing_pages().unwrap(),
            BTreeSet::from(["/docs/intro".to_owned()])
        );
    }

    #[test]
    fn test_write_page_data_skips_identical_content() {
        let temp = tempfile::tempdir().unwrap();
        let out = OutputDir::new(temp.path());

        assert!(out.write_page_data("/a", &data("/a")).unwrap());
        assert!(!out.write_page_data("/a", &data("/a")).unwrap());

        let mut changed = data("/a");
        changed.result = json!({"data": {"x": 1}});
        assert!(out.write_page_data("/a", &changed).unwrap());
    }

    #[test]
    fn test_remove_page_prunes_empty_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let out = OutputDir::new(temp.path());
        out.write_page("/blog/hello", "x", &data("/blog/hello")).unwrap();
        out.write_page("/blog/other", "x", &data("/blog/other")).unwrap();

        out.remove_page("/blog/hello").unwrap();
        assert!(!temp.path().join("blog/hello").exists());
        assert!(temp.path().join("blog/other/index.html").exists());
        assert!(!temp.path().join("page-data/blog/hello").exists());

        out.remove_page("/blog/other").unwrap();
        assert!(!temp.path().join("blog").exists());
        assert!(temp.path().join("page-data").exists());
        assert!(out.existing_pages().unwrap().is_empty());

        // Removing again is harmless
        out.remove_page("/blog/other").unwrap();
    }

    #[test]
    fn test_remove_root_page_keeps_output_root() {
        let temp = tempfile::tempdir().unwrap();
        let out = OutputDir::new(temp.path().join("public"));
        out.write_page("/", "x", &data("/")).unwrap();
        out.write_page("/a", "x", &data("/a")).unwrap();

        out.remove_page("/").unwrap();
        assert!(temp.path().join("public").exists());
        assert!(!temp.path().join("public/index.html").exists());
        assert!(!temp.path().join("public/page-data/index").exists());
        assert!(temp.path().join("public/a/index.html").exists());
    }

    #[test]
    fn test_basic_renderer() {
        let page = Page::resolve(
            &PageSpec {
                path: "/a".to_owned(),
                template: "t.js".to_owned(),
                query: None,
                dependencies: Vec::new(),
                static_queries: Vec::new(),
            },
            0,
        );
        let mut page_data = data("/a");
        page_data.result = json!({"title": "<b>"});

        let ctx = RenderContext {
            page: &page,
            template: "<html><body><h1>{{path}}</h1><pre>{{data}}</pre></body></html>",
            data: &page_data,
            browser_hash: "abc",
        };
        let html = BasicRenderer.render(&ctx).unwrap();

        assert!(html.starts_with("<html><body><h1>/a</h1>"));
        assert!(html.contains("&lt;b&gt;"));
        assert!(html.ends_with(r#"<script src="/app-abc.js"></script></body></html>"#));
    }

    #[test]
    fn test_basic_renderer_scripts_placeholder() {
        let page = Page::resolve(
            &PageSpec {
                path: "/".to_owned(),
                template: "t.js".to_owned(),
                query: None,
                dependencies: Vec::new(),
                static_queries: Vec::new(),
            },
            0,
        );
        let ctx = RenderContext {
            page: &page,
            template: "{{scripts}}|{{path}}",
            data: &data("/"),
            browser_hash: "h",
        };
        assert_eq!(
            BasicRenderer.render(&ctx).unwrap(),
            r#"<script src="/app-h.js"></script>|/"#
        );
    }
}

//! Configuration management for Kiln.
//!
//! Parses `kiln.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `source.url`
//! - `source.token`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override output directory.
    pub output_dir: Option<PathBuf>,
    /// Override cache enabled flag.
    pub cache_enabled: Option<bool>,
    /// Override content source URL.
    pub source_url: Option<String>,
    /// Override refetch interval.
    pub refetch_interval_secs: Option<u64>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "kiln.toml";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Site layout (paths are relative strings from TOML).
    site: SiteConfigRaw,
    /// Content source configuration (optional section).
    pub source: Option<SourceConfig>,
    /// Interval refetch configuration.
    pub refetch: RefetchConfig,
    /// Query fingerprinting configuration.
    pub query: QueryConfig,
    /// Module patterns feeding each compiled bundle.
    pub bundles: BundlesConfig,

    /// Resolved site configuration (set after loading).
    #[serde(skip)]
    pub site_resolved: SiteConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw site configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SiteConfigRaw {
    root: Option<String>,
    pages: Option<String>,
    output_dir: Option<String>,
    cache_dir: Option<String>,
    cache_enabled: Option<bool>,
}

/// Resolved site configuration with absolute paths.
#[derive(Debug, Default)]
pub struct SiteConfig {
    /// Base directory for templates, modules, and the pages file.
    pub root: PathBuf,
    /// Page definitions file.
    pub pages_file: PathBuf,
    /// Directory receiving HTML and page-data artifacts.
    pub output_dir: PathBuf,
    /// Directory holding fingerprints, the build manifest, and the build lock.
    pub cache_dir: PathBuf,
    /// Whether fingerprints are persisted between builds.
    pub cache_enabled: bool,
}

impl SiteConfig {
    /// Path of the JSON build manifest.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.cache_dir.join("build-manifest.json")
    }
}

/// External content source configuration.
#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the content API.
    pub url: String,
    /// Bearer token (empty means no authentication).
    #[serde(default)]
    pub token: String,
    /// Page size for change queries.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl SourceConfig {
    /// Validate that all required fields are properly set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.url, "source.url")?;
        require_http_url(&self.url, "source.url")?;
        if self.per_page == 0 {
            return Err(ConfigError::Validation(
                "source.per_page must be greater than 0".to_owned(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "source.timeout_secs must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }
}

fn default_per_page() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

/// Interval refetch configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RefetchConfig {
    /// Seconds between polling passes.
    pub interval_secs: u64,
}

impl Default for RefetchConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

/// Query fingerprinting configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Seed for the query hash. Changing it changes every query fingerprint.
    pub seed: u32,
}

/// Module patterns (glob, relative to the site root) per compiled bundle.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BundlesConfig {
    /// Modules feeding the browser bundle.
    pub browser: Vec<String>,
    /// Modules feeding the server-rendering bundle.
    pub ssr: Vec<String>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`source.token`").
        field: String,
        /// Error message (e.g., "${`CMS_TOKEN`} not set").
        message: String,
    },
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `kiln.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(output_dir) = &settings.output_dir {
            self.site_resolved.output_dir.clone_from(output_dir);
        }
        if let Some(cache_enabled) = settings.cache_enabled {
            self.site_resolved.cache_enabled = cache_enabled;
        }
        if let Some(url) = &settings.source_url {
            match &mut self.source {
                Some(source) => source.url.clone_from(url),
                None => {
                    self.source = Some(SourceConfig {
                        url: url.clone(),
                        token: String::new(),
                        per_page: default_per_page(),
                        timeout_secs: default_timeout_secs(),
                    });
                }
            }
        }
        if let Some(interval) = settings.refetch_interval_secs {
            self.refetch.interval_secs = interval;
        }
    }

    /// Get validated source configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if the section is missing or invalid.
    pub fn require_source(&self) -> Result<&SourceConfig, ConfigError> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| ConfigError::Validation("[source] section required in config".into()))?;
        source.validate()?;
        Ok(source)
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    fn default_with_base(base: &Path) -> Self {
        Self {
            site: SiteConfigRaw::default(),
            source: None,
            refetch: RefetchConfig::default(),
            query: QueryConfig::default(),
            bundles: BundlesConfig::default(),
            site_resolved: SiteConfig {
                root: base.to_path_buf(),
                pages_file: base.join("pages.json"),
                output_dir: base.join("public"),
                cache_dir: base.join(".cache"),
                cache_enabled: true,
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site_resolved.output_dir == self.site_resolved.cache_dir {
            return Err(ConfigError::Validation(
                "site.output_dir and site.cache_dir must differ".to_owned(),
            ));
        }
        if self.refetch.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "refetch.interval_secs must be greater than 0".to_owned(),
            ));
        }
        if let Some(source) = &self.source {
            source.validate()?;
        }
        for pattern in self.bundles.browser.iter().chain(&self.bundles.ssr) {
            require_non_empty(pattern, "bundles")?;
        }
        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref mut source) = self.source {
            source.url = expand::expand_env(&source.url, "source.url")?;
            source.token = expand::expand_env(&source.token, "source.token")?;
        }
        Ok(())
    }

    /// Resolve relative paths against the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let root = config_dir.join(self.site.root.as_deref().unwrap_or("."));
        let resolve = |path: Option<&str>, default: &str| root.join(path.unwrap_or(default));

        self.site_resolved = SiteConfig {
            pages_file: resolve(self.site.pages.as_deref(), "pages.json"),
            output_dir: resolve(self.site.output_dir.as_deref(), "public"),
            cache_dir: resolve(self.site.cache_dir.as_deref(), ".cache"),
            cache_enabled: self.site.cache_enabled.unwrap_or(true),
            root,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));
        assert_eq!(config.site_resolved.root, PathBuf::from("/test"));
        assert_eq!(config.site_resolved.output_dir, PathBuf::from("/test/public"));
        assert_eq!(config.site_resolved.cache_dir, PathBuf::from("/test/.cache"));
        assert_eq!(
            config.site_resolved.manifest_path(),
            PathBuf::from("/test/.cache/build-manifest.json")
        );
        assert!(config.site_resolved.cache_enabled);
        assert_eq!(config.refetch.interval_secs, 30);
        assert_eq!(config.query.seed, 0);
        assert!(config.source.is_none());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.refetch.interval_secs, 30);
        assert!(config.bundles.browser.is_empty());
    }

    #[test]
    fn test_parse_source_config_defaults() {
        let toml = r#"
[source]
url = "https://cms.example.com/api"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let source = config.source.unwrap();
        assert_eq!(source.url, "https://cms.example.com/api");
        assert_eq!(source.token, "");
        assert_eq!(source.per_page, 100);
        assert_eq!(source.timeout_secs, 30);
    }

    #[test]
    fn test_parse_bundles() {
        let toml = r#"
[bundles]
browser = ["src/browser/**/*.js", "src/shared/*.js"]
ssr = ["src/ssr/**/*.js"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.bundles.browser,
            vec!["src/browser/**/*.js".to_owned(), "src/shared/*.js".to_owned()]
        );
        assert_eq!(config.bundles.ssr, vec!["src/ssr/**/*.js".to_owned()]);
    }

    #[test]
    fn test_resolve_paths() {
        let toml = r#"
[site]
root = "site"
output_dir = "dist"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));
        assert_eq!(config.site_resolved.root, PathBuf::from("/project/site"));
        assert_eq!(
            config.site_resolved.output_dir,
            PathBuf::from("/project/site/dist")
        );
        assert_eq!(
            config.site_resolved.pages_file,
            PathBuf::from("/project/site/pages.json")
        );
        assert_eq!(
            config.site_resolved.cache_dir,
            PathBuf::from("/project/site/.cache")
        );
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let toml = r#"
[source]
url = "ftp://cms.example.com"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let err = config.source.unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("source.url"));
    }

    #[test]
    fn test_validate_rejects_zero_per_page() {
        let toml = r#"
[source]
url = "https://cms.example.com"
per_page = 0
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.source.unwrap().validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.refetch.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_require_source_missing_section() {
        let config = Config::default_with_base(Path::new("/test"));
        let err = config.require_source().unwrap_err();
        assert!(err.to_string().contains("[source]"));
    }

    #[test]
    fn test_cli_settings_override() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.apply_cli_settings(&CliSettings {
            output_dir: Some(PathBuf::from("/elsewhere")),
            cache_enabled: Some(false),
            source_url: Some("http://localhost:4000".to_owned()),
            refetch_interval_secs: Some(5),
        });
        assert_eq!(config.site_resolved.output_dir, PathBuf::from("/elsewhere"));
        assert!(!config.site_resolved.cache_enabled);
        assert_eq!(config.source.unwrap().url, "http://localhost:4000");
        assert_eq!(config.refetch.interval_secs, 5);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
[site]
pages = "routes.json"

[source]
url = "https://cms.example.com"
token = "${KILN_TEST_SURELY_UNSET_TOKEN:-anonymous}"

[query]
seed = 42
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path), None).unwrap();
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(config.site_resolved.pages_file, dir.path().join("./routes.json"));
        assert_eq!(config.source.unwrap().token, "anonymous");
        assert_eq!(config.query.seed, 42);
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/kiln.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}

//! Error types for the build pipeline.

use std::path::PathBuf;

use kiln_source::SourceError;

/// Error publishing or reading a build manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// A manifest file could not be written. The previous manifest is intact.
    #[error("failed to write manifest {}", path.display())]
    Write {
        /// File being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest could not be serialized.
    #[error("failed to serialize manifest")]
    Serialize(#[from] serde_json::Error),
}

/// Error managing page artifacts in the output directory.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// Filesystem operation failed.
    #[error("I/O error on {}", path.display())]
    Io {
        /// Affected file or directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Page data could not be serialized.
    #[error("failed to serialize page data for {path}")]
    Serialize {
        /// Page path.
        path: String,
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// Page path cannot be mapped to an output location.
    #[error("invalid page path {0:?}")]
    InvalidPath(String),
}

/// Error produced by a [`PageRenderer`](crate::PageRenderer).
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Error running a build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Fetching content failed. Nothing was applied.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Manifest publication failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Output artifact operation failed.
    #[error(transparent)]
    Output(#[from] OutputError),

    /// Another build holds the lock.
    #[error("another build is running (lock file {})", path.display())]
    Locked {
        /// Lock file path.
        path: PathBuf,
    },

    /// A page failed to render.
    #[error("failed to render page {path}")]
    Render {
        /// Page path.
        path: String,
        /// Renderer error.
        #[source]
        source: RenderError,
    },

    /// Page definitions are invalid.
    #[error("invalid page definitions in {}: {message}", file.display())]
    Pages {
        /// Page definitions file.
        file: PathBuf,
        /// What is wrong.
        message: String,
    },

    /// A bundle glob pattern is malformed.
    #[error("invalid bundle pattern {pattern:?}")]
    Pattern {
        /// Offending pattern.
        pattern: String,
        /// Parse error.
        #[source]
        source: glob::PatternError,
    },

    /// Reading an input file failed.
    #[error("failed to read {}", path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

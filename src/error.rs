//! Error types for resolving and rendering documents.

use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can stop a render call.
///
/// `MalformedIndentation` and `Execution` only reach the caller in production
/// mode; in debug mode they are inlined into the rendered body instead.
/// `PathSecurityViolation` is fatal in both modes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed indentation on line {line}: less indentation than the first line of the block")]
    MalformedIndentation { line: usize },

    #[error("Code block failed: {diagnostic}")]
    Execution { diagnostic: String },

    #[error("File not found: {}", path.display())]
    PathNotFound { path: PathBuf },

    #[error("Path is a directory: {}", path.display())]
    PathIsDirectory { path: PathBuf },

    #[error("Access denied: '{}' is outside of '{}'", path.display(), root.display())]
    PathSecurityViolation { path: PathBuf, root: PathBuf },

    #[error("Invalid cookie {key:?}: {reason}")]
    InvalidCookie { key: String, reason: String },

    #[error("Invalid redirect URL {url:?}: control characters are not allowed")]
    InvalidRedirect { url: String },

    #[error("Invalid root directory '{}': {source}", path.display())]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Runtime error: {0}")]
    Runtime(#[from] anyhow::Error),
}

impl Error {
    /// True for the resolver failures the serving layer turns into "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PathNotFound { .. } | Self::PathIsDirectory { .. })
    }

    pub fn is_security_violation(&self) -> bool {
        matches!(self, Self::PathSecurityViolation { .. })
    }
}

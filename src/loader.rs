//! Sandboxed document loader that only resolves paths inside one directory.
//!
//! Resolution policy, in order:
//! 1. the exact path, if it is a file;
//! 2. a directory is reported as [`Error::PathIsDirectory`] so the caller can
//!    fall back to the directory's index document;
//! 3. the path with the `.jshp` extension appended;
//! 4. otherwise [`Error::PathNotFound`].
//!
//! Every candidate is checked against the root before it is touched, first
//! lexically and then through canonicalization, so neither `..` traversal nor
//! a symlink can leave the root.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Extension appended when the exact path does not exist.
pub const FILE_EXTENSION: &str = "jshp";

/// Name of the document served for a directory request.
pub const INDEX_NAME: &str = "index";

/// What a resolved path should be treated as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedKind {
    /// A `.jshp` document that goes through the render engine.
    Document,
    /// Any other file, passed through as-is by the serving layer.
    Asset,
}

/// A path that exists and is confined to the loader's root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Location relative to the root.
    pub relative: PathBuf,
    /// Canonical absolute location.
    pub absolute: PathBuf,
    pub kind: ResolvedKind,
}

impl Resolved {
    /// Directory of the resolved file, relative to the root.
    pub fn directory(&self) -> PathBuf {
        self.relative.parent().map(Path::to_path_buf).unwrap_or_default()
    }

    pub fn is_document(&self) -> bool {
        self.kind == ResolvedKind::Document
    }
}

/// Resolves and reads documents below a single root directory.
#[derive(Debug, Clone)]
pub struct SandboxedLoader {
    root: PathBuf,
}

impl SandboxedLoader {
    /// Create a loader confined to `root`, which must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let canonical = root.canonicalize().map_err(|source| Error::InvalidRoot {
            path: root.to_path_buf(),
            source,
        })?;

        if !canonical.is_dir() {
            return Err(Error::InvalidRoot {
                path: root.to_path_buf(),
                source: std::io::Error::other("not a directory"),
            });
        }

        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `requested` (relative to the root) to a confined file.
    pub fn resolve(&self, requested: &Path) -> Result<Resolved> {
        let relative = self.confine(requested)?;
        let absolute = self.absolute(&relative)?;

        if absolute.is_dir() {
            return Err(Error::PathIsDirectory { path: relative });
        }
        if absolute.is_file() {
            return Ok(self.resolved(relative, absolute));
        }

        let relative = with_appended_extension(&relative);
        let absolute = self.absolute(&relative)?;
        if absolute.is_file() {
            return Ok(self.resolved(relative, absolute));
        }

        Err(Error::PathNotFound {
            path: requested.to_path_buf(),
        })
    }

    /// Resolve the index document of the directory `requested`.
    pub fn resolve_index(&self, requested: &Path) -> Result<Resolved> {
        self.resolve(&requested.join(INDEX_NAME))
    }

    /// Read a resolved file as UTF-8 text.
    pub fn read(&self, resolved: &Resolved) -> Result<String> {
        std::fs::read_to_string(&resolved.absolute).map_err(|source| Error::Io {
            path: resolved.relative.clone(),
            source,
        })
    }

    fn resolved(&self, relative: PathBuf, absolute: PathBuf) -> Resolved {
        let kind = if is_document_path(&relative) {
            ResolvedKind::Document
        } else {
            ResolvedKind::Asset
        };
        Resolved {
            relative,
            absolute,
            kind,
        }
    }

    /// Lexically normalize `requested` and reject anything that climbs above
    /// the root. Returns the normalized relative path.
    fn confine(&self, requested: &Path) -> Result<PathBuf> {
        let mut normalized = PathBuf::new();
        for component in requested.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(self.violation(requested));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(self.violation(requested));
                }
            }
        }
        Ok(normalized)
    }

    /// Absolute location of a normalized relative path, with symlinks in the
    /// existing part of the path resolved.
    fn absolute(&self, relative: &Path) -> Result<PathBuf> {
        let joined = self.root.join(relative);

        let mut existing = joined.as_path();
        let mut missing = Vec::new();
        let canonical = loop {
            match existing.canonicalize() {
                Ok(canonical) => break canonical,
                Err(_) => {
                    let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                        return Err(self.violation(relative));
                    };
                    missing.push(name.to_os_string());
                    existing = parent;
                }
            }
        };

        if !self.is_path_allowed(&canonical) {
            return Err(self.violation(relative));
        }

        Ok(missing.into_iter().rev().fold(canonical, |path, name| path.join(name)))
    }

    fn is_path_allowed(&self, canonical: &Path) -> bool {
        canonical.starts_with(&self.root)
    }

    fn violation(&self, path: &Path) -> Error {
        tracing::warn!(path = %path.display(), root = %self.root.display(), "path escapes the document root");
        Error::PathSecurityViolation {
            path: path.to_path_buf(),
            root: self.root.clone(),
        }
    }
}

/// True when `path` carries the template extension.
pub fn is_document_path(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION)
}

/// `foo.txt` -> `foo.txt.jshp`, `foo` -> `foo.jshp`.
fn with_appended_extension(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(FILE_EXTENSION);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn site() -> (tempfile::TempDir, SandboxedLoader) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("index.jshp"), "<jshp>print('Hello')</jshp>").unwrap();
        fs::write(dir.path().join("style.css"), "p {}").unwrap();
        fs::create_dir_all(dir.path().join("foo/bar")).unwrap();
        fs::create_dir(dir.path().join("dir")).unwrap();
        fs::write(dir.path().join("foo/page.jshp"), "page").unwrap();
        let loader = SandboxedLoader::new(dir.path()).unwrap();
        (dir, loader)
    }

    #[test]
    fn test_resolves_exact_and_extension_fallback() {
        let (_dir, loader) = site();

        for (requested, expected) in [
            ("index", "index.jshp"),
            ("index.jshp", "index.jshp"),
            ("./index", "index.jshp"),
            ("foo/page", "foo/page.jshp"),
            ("foo/bar/../page", "foo/page.jshp"),
        ] {
            let resolved = loader.resolve(Path::new(requested)).unwrap();
            assert_eq!(resolved.relative, PathBuf::from(expected), "{requested}");
            assert!(resolved.is_document());
            assert!(resolved.absolute.starts_with(loader.root()));
        }
    }

    #[test]
    fn test_assets_are_not_documents() {
        let (_dir, loader) = site();
        let resolved = loader.resolve(Path::new("style.css")).unwrap();
        assert_eq!(resolved.kind, ResolvedKind::Asset);
        assert_eq!(resolved.directory(), PathBuf::new());
    }

    #[test]
    fn test_directories_and_missing_files() {
        let (_dir, loader) = site();

        for requested in ["", "dir", "foo/bar"] {
            let err = loader.resolve(Path::new(requested)).unwrap_err();
            assert!(matches!(err, Error::PathIsDirectory { .. }), "{requested}: {err}");
        }
        for requested in ["index.jshp.txt", "foo/baz", "missing/deeper/file"] {
            let err = loader.resolve(Path::new(requested)).unwrap_err();
            assert!(matches!(err, Error::PathNotFound { .. }), "{requested}: {err}");
        }
    }

    #[test]
    fn test_index_fallback() {
        let (_dir, loader) = site();
        let resolved = loader.resolve_index(Path::new("")).unwrap();
        assert_eq!(resolved.relative, PathBuf::from("index.jshp"));
        assert!(loader.resolve_index(Path::new("dir")).is_err());
    }

    #[test]
    fn test_blocks_path_traversal() {
        let (_dir, loader) = site();

        for requested in ["../secret", "../../../etc/passwd", "foo/../../secret", "/etc/passwd"] {
            let err = loader.resolve(Path::new(requested)).unwrap_err();
            assert!(err.is_security_violation(), "{requested}: {err}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_blocks_symlink_escape() {
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("secret.jshp"), "secret").unwrap();
        let (dir, loader) = site();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        for requested in ["link/secret.jshp", "link/secret", "link/missing"] {
            let err = loader.resolve(Path::new(requested)).unwrap_err();
            assert!(err.is_security_violation(), "{requested}: {err}");
        }
    }

    #[test]
    fn test_read_returns_contents() {
        let (_dir, loader) = site();
        let resolved = loader.resolve(Path::new("foo/page")).unwrap();
        assert_eq!(loader.read(&resolved).unwrap(), "page");
    }

    #[test]
    fn test_rejects_missing_root() {
        let dir = tempdir().unwrap();
        let err = SandboxedLoader::new(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::InvalidRoot { .. }));
    }
}

//! Top-level render calls.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::context::{ExecutionContext, Redirect, RenderSettings, RequestData};
use crate::cookies::{DeleteCookie, NewCookie};
use crate::error::Result;
use crate::loader::{Resolved, SandboxedLoader};
use crate::runtime::render_file;

/// Configuration for the preprocessor
pub struct EngineConfig {
    /// Directory documents are served from (nothing outside it is readable)
    pub root_dir: PathBuf,
    /// Inline failures into the page instead of failing the render
    pub debug: bool,
    /// Maximum heap size in bytes per document runtime (default: 64MB, None = unlimited)
    pub max_heap_size: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            debug: false,
            max_heap_size: Some(64 * 1024 * 1024), // 64MB default
        }
    }
}

/// Outcome of a successful top-level render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub body: String,
    pub new_cookies: BTreeMap<String, NewCookie>,
    pub delete_cookies: BTreeMap<String, DeleteCookie>,
    /// When set, the response is this redirect instead of `body`.
    pub redirect: Option<Redirect>,
}

impl Rendered {
    /// One `Set-Cookie` header value per pending cookie operation.
    pub fn cookie_headers(&self) -> Vec<String> {
        self.new_cookies
            .values()
            .map(NewCookie::to_header)
            .chain(self.delete_cookies.values().map(DeleteCookie::to_header))
            .collect()
    }
}

/// Resolves requests below one root and renders them.
///
/// The engine holds no per-request state: every [`Engine::run`] call builds
/// its own context and runtimes, so concurrent calls never interact.
#[derive(Debug, Clone)]
pub struct Engine {
    loader: SandboxedLoader,
    settings: RenderSettings,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let loader = SandboxedLoader::new(&config.root_dir)?;
        tracing::debug!(root = %loader.root().display(), debug = config.debug, "engine ready");
        Ok(Self {
            loader,
            settings: RenderSettings {
                debug: config.debug,
                max_heap_size: config.max_heap_size,
            },
        })
    }

    pub fn root(&self) -> &Path {
        self.loader.root()
    }

    pub fn debug(&self) -> bool {
        self.settings.debug
    }

    /// Resolve a request path relative to the root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<Resolved> {
        self.loader.resolve(path.as_ref())
    }

    /// Resolve the index document of a directory.
    pub fn resolve_index(&self, dir: impl AsRef<Path>) -> Result<Resolved> {
        self.loader.resolve_index(dir.as_ref())
    }

    /// Resolve and render `path` for one request.
    pub fn run(&self, path: impl AsRef<Path>, request: RequestData) -> Result<Rendered> {
        let resolved = self.resolve(path)?;
        self.run_resolved(&resolved, request)
    }

    /// Render an already resolved file for one request.
    pub fn run_resolved(&self, resolved: &Resolved, request: RequestData) -> Result<Rendered> {
        let context = ExecutionContext::new(self.loader.clone(), resolved.directory(), self.settings, request);
        let response = context.response();

        let body = render_file(context, resolved).inspect_err(|err| {
            tracing::warn!(path = %resolved.relative.display(), %err, "render failed");
        })?;

        let state = std::mem::take(&mut *response.borrow_mut());
        tracing::debug!(
            path = %resolved.relative.display(),
            bytes = body.len(),
            redirect = state.redirect.is_some(),
            "render finished"
        );

        Ok(Rendered {
            body,
            new_cookies: state.new_cookies,
            delete_cookies: state.delete_cookies,
            redirect: state.redirect,
        })
    }
}

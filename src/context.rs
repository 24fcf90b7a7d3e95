//! The environment every code section of one document runs against.
//!
//! An [`ExecutionContext`] is created for the top-level document of a request
//! and a fresh child is created for every included document. Children copy
//! the request data and debug flag, and share the pending cookie and redirect
//! state through [`ResponseState`], so whatever a nested document sets is seen
//! by the whole request.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Deserialize;

use crate::cookies::{check_cookie, CookieOptions, DeleteCookie, NewCookie};
use crate::error::{Error, Result};
use crate::loader::SandboxedLoader;
use crate::runtime;
use crate::sanitize::escape_html;

/// Status used by `redirect()` when none is given.
pub const DEFAULT_REDIRECT_STATUS: u16 = 302;

/// Request-scoped data, visible to every document of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RequestData {
    pub cookies: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub form: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub url: String,
    pub status: u16,
}

/// Response mutations accumulated while rendering one request.
///
/// Both cookie maps are keyed by cookie name and the last write wins. Only the
/// last redirect is kept.
#[derive(Debug, Default)]
pub struct ResponseState {
    pub new_cookies: BTreeMap<String, NewCookie>,
    pub delete_cookies: BTreeMap<String, DeleteCookie>,
    pub redirect: Option<Redirect>,
    violation: Option<(PathBuf, PathBuf)>,
}

impl ResponseState {
    /// The first path security violation seen anywhere in the request.
    pub fn violation(&self) -> Option<Error> {
        self.violation.as_ref().map(|(path, root)| Error::PathSecurityViolation {
            path: path.clone(),
            root: root.clone(),
        })
    }

    fn record_violation(&mut self, error: &Error) {
        if let (None, Error::PathSecurityViolation { path, root }) = (&self.violation, error) {
            self.violation = Some((path.clone(), root.clone()));
        }
    }
}

/// Settings copied unchanged from a context to its children.
#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub debug: bool,
    /// V8 heap ceiling for each document's runtime.
    pub max_heap_size: Option<usize>,
}

pub struct ExecutionContext {
    loader: SandboxedLoader,
    current_dir: PathBuf,
    settings: RenderSettings,
    request: RequestData,
    response: Rc<RefCell<ResponseState>>,
    output: String,
}

impl ExecutionContext {
    /// Context for the top-level document of a request.
    pub fn new(
        loader: SandboxedLoader,
        current_dir: impl Into<PathBuf>,
        settings: RenderSettings,
        request: RequestData,
    ) -> Self {
        Self {
            loader,
            current_dir: current_dir.into(),
            settings,
            request,
            response: Rc::default(),
            output: String::new(),
        }
    }

    /// Context for a document included from this one, living in `current_dir`.
    fn child(&self, current_dir: PathBuf) -> Self {
        Self {
            loader: self.loader.clone(),
            current_dir,
            settings: self.settings,
            request: self.request.clone(),
            response: Rc::clone(&self.response),
            output: String::new(),
        }
    }

    /// Render another document, relative to this one, and return its output.
    pub fn include(&self, relative_path: &str) -> Result<String> {
        let requested = self.current_dir.join(relative_path);
        let resolved = self
            .loader
            .resolve(&requested)
            .inspect_err(|err| self.response.borrow_mut().record_violation(err))?;

        tracing::trace!(from = %self.current_dir.display(), path = %resolved.relative.display(), "including document");
        runtime::render_file(self.child(resolved.directory()), &resolved)
    }

    /// Render another document straight into this document's output.
    pub fn display(&mut self, relative_path: &str) -> Result<()> {
        let rendered = self.include(relative_path)?;
        self.write(&rendered);
        Ok(())
    }

    /// Replace any pending redirect. The URL ends up in a header line, so
    /// control characters are rejected.
    pub fn redirect(&self, url: impl Into<String>, status: u16) -> Result<()> {
        let url = url.into();
        if url.chars().any(char::is_control) {
            return Err(Error::InvalidRedirect { url });
        }
        self.response.borrow_mut().redirect = Some(Redirect { url, status });
        Ok(())
    }

    pub fn set_cookie(&self, key: &str, options: CookieOptions) -> Result<()> {
        check_cookie(key, &options)?;
        self.response
            .borrow_mut()
            .new_cookies
            .insert(key.to_owned(), NewCookie::from_options(key, options));
        Ok(())
    }

    pub fn delete_cookie(&self, key: &str, options: CookieOptions) -> Result<()> {
        check_cookie(key, &options)?;
        self.response
            .borrow_mut()
            .delete_cookies
            .insert(key.to_owned(), DeleteCookie::from_options(key, options));
        Ok(())
    }

    pub fn escape(text: &str) -> String {
        escape_html(text)
    }

    /// Append to the output of the code section currently running.
    pub fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }

    /// Take everything written since the last call.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    pub fn debug(&self) -> bool {
        self.settings.debug
    }

    pub fn settings(&self) -> RenderSettings {
        self.settings
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.request.cookies
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.request.query
    }

    pub fn form(&self) -> &HashMap<String, String> {
        &self.request.form
    }

    pub fn loader(&self) -> &SandboxedLoader {
        &self.loader
    }

    /// Handle on the state shared by every document of this request.
    pub fn response(&self) -> Rc<RefCell<ResponseState>> {
        Rc::clone(&self.response)
    }
}

//! # jshp
//!
//! A hypertext preprocessor: documents are HTML with embedded `<jshp>`
//! JavaScript blocks. Blocks run in source order against one shared scope per
//! document and each is replaced by what it printed.
//!
//! ## Guarantees
//!
//! - **Confined file access**: documents and includes resolve only inside the
//!   configured root; `..` traversal and symlink escapes fail with
//!   [`Error::PathSecurityViolation`] in every mode
//! - **Per-request isolation**: every render builds its own context and V8
//!   runtimes, nothing is process-global
//! - **Per-document scope**: blocks of one document share bindings, included
//!   documents start from a clean scope
//! - **Debug vs production**: debug mode inlines failures and stops the
//!   document; production mode fails the whole render
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jshp::{Engine, EngineConfig, RequestData};
//!
//! fn main() -> Result<(), jshp::Error> {
//!     let engine = Engine::new(EngineConfig {
//!         root_dir: "./site".into(),
//!         ..Default::default()
//!     })?;
//!
//!     let rendered = engine.run("index", RequestData::default())?;
//!     println!("{}", rendered.body);
//!     Ok(())
//! }
//! ```

mod context;
mod cookies;
mod engine;
mod error;
mod loader;
mod ops;
mod render;
mod runtime;
mod sanitize;
mod sections;

pub use context::{ExecutionContext, Redirect, RenderSettings, RequestData, ResponseState, DEFAULT_REDIRECT_STATUS};
pub use cookies::{check_cookie, CookieOptions, DeleteCookie, NewCookie, SameSite};
pub use engine::{Engine, EngineConfig, Rendered};
pub use error::{Error, Result};
pub use loader::{is_document_path, Resolved, ResolvedKind, SandboxedLoader, FILE_EXTENSION, INDEX_NAME};
pub use render::{diagnostic_block, render, BlockError, Interpreter};
pub use runtime::{create_runtime, render_file, JsInterpreter};
pub use sanitize::escape_html;
pub use sections::{prepare_code, remove_initial_indentation, Document, Section, TAG_NAME};

//! jshp CLI
//!
//! Single-file mode:
//!   jshp [--debug] file <file>
//!
//! Server mode (persistent process, reads from stdin):
//!   jshp [--debug] serve <root-dir>
//!
//! Protocol (server mode):
//!   Request (stdin):
//!     blog/post
//!     {"cookies":{"session":"abc"},"query":{"id":"7"},"form":{}}
//!
//!   Response (stdout):
//!     Status:200
//!     Length:1234
//!     Set-Cookie:seen=1; Path=/
//!
//!     <!DOCTYPE html>...
//!
//!   Redirect response:
//!     Status:302
//!     Length:0
//!     Location:/login
//!

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use jshp::{Engine, EngineConfig, Error, Rendered, RequestData};
use tracing_subscriber::EnvFilter;

/// jshp - JavaScript hypertext preprocessor.
#[derive(Parser)]
#[command(name = "jshp", version, about)]
struct Cli {
    /// Inline code block failures into the page instead of failing.
    #[arg(short, long, global = true, env = "JSHP_DEBUG")]
    debug: bool,

    /// Log at info level (otherwise RUST_LOG, default warn).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// V8 heap ceiling per document in MiB (0 = unlimited).
    #[arg(long, global = true, default_value_t = 64)]
    max_heap_mb: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one file and print the result.
    File {
        /// File to render; its directory becomes the root.
        file: PathBuf,
    },
    /// Serve a directory over the stdin/stdout protocol.
    Serve {
        /// Directory to serve.
        root: PathBuf,
    },
}

/// A response in the length-prefixed protocol.
struct Response {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
}

impl Response {
    fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    fn redirect(location: impl Into<String>, status: u16) -> Self {
        Self {
            status,
            headers: vec![("Location", location.into())],
            body: Vec::new(),
        }
    }

    fn rendered(rendered: Rendered) -> Self {
        let cookies = rendered.cookie_headers().into_iter().map(|header| ("Set-Cookie", header));

        // Redirects are only honored after a successful render
        let mut response = match rendered.redirect {
            Some(redirect) => Self::redirect(redirect.url, redirect.status),
            None => Self::new(200, rendered.body),
        };
        response.headers.extend(cookies);
        response
    }
}

fn config(cli: &Cli, root_dir: PathBuf) -> EngineConfig {
    EngineConfig {
        root_dir,
        debug: cli.debug,
        max_heap_size: (cli.max_heap_mb > 0).then(|| cli.max_heap_mb * 1024 * 1024),
    }
}

/// Render a single file (its directory is the root)
fn run_file(cli: &Cli, file: &Path) -> Result<()> {
    let root = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = file
        .file_name()
        .ok_or_else(|| anyhow!("Not a file: {}", file.display()))?;

    let engine = Engine::new(config(cli, root))?;
    let rendered = engine
        .run(name, RequestData::default())
        .with_context(|| format!("Failed to render {}", file.display()))?;

    if let Some(redirect) = &rendered.redirect {
        tracing::info!(url = %redirect.url, status = redirect.status, "document requested a redirect");
    }

    println!("{}", rendered.body);

    Ok(())
}

/// Run in server mode (persistent process, reads requests from stdin)
fn run_server(cli: &Cli, root: &Path) -> Result<()> {
    let engine = Engine::new(config(cli, root.to_path_buf()))?;

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut reader = stdin.lock();

    tracing::info!(root = %engine.root().display(), "server ready, reading from stdin");

    loop {
        let mut path_line = String::new();
        let mut request_line = String::new();

        // Read request path (line 1)
        let bytes_read = reader.read_line(&mut path_line)?;
        if bytes_read == 0 {
            // EOF - stdin closed, exit gracefully
            break;
        }

        // Read request data JSON (line 2)
        reader.read_line(&mut request_line)?;

        let path = path_line.trim();
        let request_str = request_line.trim();

        let request: RequestData = if request_str.is_empty() {
            RequestData::default()
        } else {
            match serde_json::from_str(request_str) {
                Ok(request) => request,
                Err(e) => {
                    write_response(&mut stdout, &Response::new(400, format!("Invalid request JSON: {e}")))?;
                    continue;
                }
            }
        };

        let response = handle_request(&engine, path, request);
        tracing::info!(path, status = response.status, "handled request");
        write_response(&mut stdout, &response)?;
    }

    tracing::info!("server shutting down");
    Ok(())
}

/// Map one request path to a response.
fn handle_request(engine: &Engine, path: &str, request: RequestData) -> Response {
    let path = path.trim_start_matches('/');
    let resolved = if path.is_empty() || path.ends_with('/') {
        engine.resolve_index(path)
    } else {
        engine.resolve(path)
    };

    let resolved = match resolved {
        Ok(resolved) => resolved,
        Err(Error::PathIsDirectory { .. }) => return Response::redirect(format!("/{path}/"), 301),
        Err(err) if err.is_not_found() => {
            let body = if engine.debug() {
                format!("File not found: {path}")
            } else {
                String::new()
            };
            return Response::new(404, body);
        }
        Err(err) => return failure(engine, err.into()),
    };

    if !resolved.is_document() {
        return match std::fs::read(&resolved.absolute) {
            Ok(bytes) => Response::new(200, bytes),
            Err(err) => failure(engine, err.into()),
        };
    }

    match engine.run_resolved(&resolved, request) {
        Ok(rendered) => Response::rendered(rendered),
        Err(err) => failure(engine, err.into()),
    }
}

fn failure(engine: &Engine, err: anyhow::Error) -> Response {
    let (status, generic) = match err.downcast_ref::<Error>() {
        Some(e) if e.is_security_violation() => (403, "Forbidden"),
        _ => (500, "Internal Server Error"),
    };
    tracing::error!(status, "{err:#}");
    if engine.debug() {
        Response::new(status, format!("{err:#}"))
    } else {
        Response::new(status, generic)
    }
}

/// Write response in length-prefixed protocol
fn write_response(stdout: &mut std::io::Stdout, response: &Response) -> Result<()> {
    writeln!(stdout, "Status:{}", response.status)?;
    writeln!(stdout, "Length:{}", response.body.len())?;
    for (name, value) in &response.headers {
        writeln!(stdout, "{name}:{value}")?;
    }
    writeln!(stdout)?; // Empty line separator
    stdout.write_all(&response.body)?;
    stdout.flush()?;

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::File { file } => run_file(&cli, file),
        Commands::Serve { root } => run_server(&cli, root),
    }
}

//! JavaScript runtime for code blocks - one V8 isolate per rendered document.
//!
//! Provides only what templates need:
//! - print/write (captured into the document output)
//! - console.log/warn/error (routed to tracing, never into the document)
//! - the `jshp` object (include, display, redirect, cookies, request data)
//! - atob, btoa
//! - crypto.randomUUID, crypto.getRandomValues, crypto.subtle.digest
//! - No module loading, fs, net, env, or other system access
//!
//! Blocks of one document run as classic scripts in the same realm, so
//! top-level bindings carry over from block to block. An included document
//! gets a runtime of its own and therefore a clean scope.

use std::cell::RefCell;
use std::rc::Rc;

use deno_core::error::JsError;
use deno_core::{v8, JsRuntime, RuntimeOptions};

use crate::context::{ExecutionContext, ResponseState};
use crate::error::Result;
use crate::loader::Resolved;
use crate::ops::jshp_runtime;
use crate::render::{render, BlockError, Interpreter};
use crate::sections::Document;

/// Script name reported in stack traces.
const BLOCK_SCRIPT_NAME: &str = "jshp:block";

/// Promises rejected with no handler attached, keyed by promise identity.
///
/// Lives in an isolate slot. Entries are removed again when a handler is
/// attached later, so whatever is left after a block's microtask checkpoint
/// was never handled.
#[derive(Default)]
struct UnhandledRejections(Vec<(i32, String)>);

extern "C" fn track_promise_rejection(message: v8::PromiseRejectMessage) {
    // SAFETY: V8 runs this callback inside the isolate and context that own the promise
    let scope = &mut unsafe { v8::CallbackScope::new(&message) };
    let id = i32::from(message.get_promise().get_identity_hash());

    match message.get_event() {
        v8::PromiseRejectEvent::PromiseRejectWithNoHandler => {
            let reason = match message.get_value() {
                Some(value) => JsError::from_v8_exception(scope, value).to_string(),
                None => String::from("Uncaught (in promise) undefined"),
            };
            if let Some(rejections) = scope.get_slot_mut::<UnhandledRejections>() {
                rejections.0.push((id, reason));
            }
        }
        v8::PromiseRejectEvent::PromiseHandlerAddedAfterReject => {
            if let Some(rejections) = scope.get_slot_mut::<UnhandledRejections>() {
                rejections.0.retain(|(pending, _)| *pending != id);
            }
        }
        _ => {}
    }
}

/// Create a runtime whose ops act on `context`.
pub fn create_runtime(context: ExecutionContext) -> JsRuntime {
    let max_heap_size = context.settings().max_heap_size;

    // Configure V8 heap limits if specified
    let create_params = max_heap_size.map(|max_bytes| {
        deno_core::v8::Isolate::create_params().heap_limits(0, max_bytes)
    });

    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![jshp_runtime::init_ops_and_esm()],
        create_params,
        ..Default::default()
    });

    if max_heap_size.is_some() {
        runtime.add_near_heap_limit_callback(|current, initial| {
            // Keep the limit so V8 raises an OOM error instead of growing
            tracing::warn!(
                current_mb = current / (1024 * 1024),
                initial_mb = initial / (1024 * 1024),
                "near heap limit"
            );
            current
        });
    }

    // Blocks never run the event loop, so rejections are tracked here
    let isolate = runtime.v8_isolate();
    isolate.set_slot(UnhandledRejections::default());
    isolate.set_promise_reject_callback(track_promise_rejection);

    runtime.op_state().borrow_mut().put(context);

    runtime
}

/// [`Interpreter`] backed by a `deno_core` runtime.
pub struct JsInterpreter {
    runtime: JsRuntime,
    response: Rc<RefCell<ResponseState>>,
}

impl JsInterpreter {
    pub fn new(context: ExecutionContext) -> Self {
        let response = context.response();
        Self {
            runtime: create_runtime(context),
            response,
        }
    }

    /// The first rejection left unhandled since the last call.
    fn take_unhandled_rejection(&mut self) -> Option<String> {
        let rejections = self.runtime.v8_isolate().get_slot_mut::<UnhandledRejections>()?;
        let first = std::mem::take(&mut rejections.0).into_iter().next();
        first.map(|(_, reason)| reason)
    }

    fn take_output(&mut self) -> String {
        let state = self.runtime.op_state();
        let mut state = state.borrow_mut();
        state.borrow_mut::<ExecutionContext>().take_output()
    }
}

impl Interpreter for JsInterpreter {
    fn execute(&mut self, code: &str) -> Result<String, BlockError> {
        let result = self.runtime.execute_script(BLOCK_SCRIPT_NAME, code.to_owned());

        // Promise continuations scheduled by the block print into this block
        if result.is_ok() {
            let scope = &mut self.runtime.handle_scope();
            scope.perform_microtask_checkpoint();
        }

        let output = self.take_output();
        let rejection = self.take_unhandled_rejection();

        // A confinement breach aborts even if the script caught the exception
        if let Some(violation) = self.response.borrow().violation() {
            return Err(BlockError::Fatal(violation));
        }

        match (result, rejection) {
            (Ok(_), None) => Ok(output),
            (Ok(_), Some(diagnostic)) => Err(BlockError::Script { output, diagnostic }),
            (Err(err), _) => Err(BlockError::Script {
                output,
                diagnostic: err.to_string(),
            }),
        }
    }
}

/// Load, parse and render one resolved file with `context`.
///
/// Files without code blocks are returned as-is, without starting V8.
pub fn render_file(context: ExecutionContext, resolved: &Resolved) -> Result<String> {
    let text = context.loader().read(resolved)?;
    let document = Document::parse(&text);
    if !document.has_code() {
        return Ok(text);
    }

    let debug = context.debug();
    tracing::debug!(
        path = %resolved.relative.display(),
        sections = document.sections().len(),
        debug = context.debug(),
        "rendering document"
    );

    let mut interpreter = JsInterpreter::new(context);
    render(&document, &mut interpreter, debug)
}

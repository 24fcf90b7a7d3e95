//! Host ops backing the globals installed by `bootstrap.js`.
//!
//! Every document runtime carries its [`ExecutionContext`] in the `OpState`;
//! the `jshp` ops read and mutate it, so the context is what embedded code
//! sees as the `jshp` object.

use deno_core::error::AnyError;
use deno_core::{op2, OpState};

use crate::context::ExecutionContext;
use crate::cookies::CookieOptions;

// ============================================================================
// Output
// ============================================================================

#[op2(fast)]
pub fn op_jshp_write(state: &mut OpState, #[string] text: &str) {
    state.borrow_mut::<ExecutionContext>().write(text);
}

#[op2(fast)]
pub fn op_console_log(state: &mut OpState, #[string] msg: &str) {
    let ctx = state.borrow::<ExecutionContext>();
    tracing::info!(target: "jshp::console", dir = %ctx.current_dir().display(), "{msg}");
}

#[op2(fast)]
pub fn op_console_warn(state: &mut OpState, #[string] msg: &str) {
    let ctx = state.borrow::<ExecutionContext>();
    tracing::warn!(target: "jshp::console", dir = %ctx.current_dir().display(), "{msg}");
}

#[op2(fast)]
pub fn op_console_error(state: &mut OpState, #[string] msg: &str) {
    let ctx = state.borrow::<ExecutionContext>();
    tracing::error!(target: "jshp::console", dir = %ctx.current_dir().display(), "{msg}");
}

// ============================================================================
// Context capabilities
// ============================================================================

#[op2]
#[string]
pub fn op_jshp_include(state: &mut OpState, #[string] path: String) -> Result<String, AnyError> {
    Ok(state.borrow::<ExecutionContext>().include(&path)?)
}

#[op2(fast)]
pub fn op_jshp_display(state: &mut OpState, #[string] path: String) -> Result<(), AnyError> {
    Ok(state.borrow_mut::<ExecutionContext>().display(&path)?)
}

#[op2(fast)]
pub fn op_jshp_redirect(state: &mut OpState, #[string] url: String, status: u32) -> Result<(), AnyError> {
    let status = u16::try_from(status)
        .ok()
        .filter(|s| (100..=599).contains(s))
        .ok_or_else(|| anyhow::anyhow!("Invalid redirect status code: {}", status))?;
    Ok(state.borrow::<ExecutionContext>().redirect(url, status)?)
}

#[op2]
pub fn op_jshp_set_cookie(
    state: &mut OpState,
    #[string] key: String,
    #[serde] options: CookieOptions,
) -> Result<(), AnyError> {
    Ok(state.borrow::<ExecutionContext>().set_cookie(&key, options)?)
}

#[op2]
pub fn op_jshp_delete_cookie(
    state: &mut OpState,
    #[string] key: String,
    #[serde] options: CookieOptions,
) -> Result<(), AnyError> {
    Ok(state.borrow::<ExecutionContext>().delete_cookie(&key, options)?)
}

#[op2]
#[string]
pub fn op_jshp_escape(#[string] text: &str) -> String {
    ExecutionContext::escape(text)
}

/// Request data as key/value pairs; the JS side builds the object with
/// `Object.fromEntries` so keys such as `__proto__` stay plain properties.
#[op2]
#[serde]
pub fn op_jshp_request(state: &mut OpState, #[string] field: &str) -> Result<Vec<(String, String)>, AnyError> {
    let ctx = state.borrow::<ExecutionContext>();
    let map = match field {
        "cookies" => ctx.cookies(),
        "query" => ctx.query(),
        "form" => ctx.form(),
        other => return Err(anyhow::anyhow!("Unknown request field: {}", other)),
    };
    Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

#[op2]
#[string]
pub fn op_jshp_current_dir(state: &mut OpState) -> String {
    state
        .borrow::<ExecutionContext>()
        .current_dir()
        .to_string_lossy()
        .into_owned()
}

#[op2(fast)]
pub fn op_jshp_debug(state: &mut OpState) -> bool {
    state.borrow::<ExecutionContext>().debug()
}

// ============================================================================
// Crypto Ops
// ============================================================================

#[op2]
#[string]
pub fn op_crypto_random_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[op2(fast)]
pub fn op_crypto_get_random_values(#[buffer] buf: &mut [u8]) {
    use rand::RngCore;
    rand::thread_rng().fill_bytes(buf);
}

#[op2]
#[buffer]
pub fn op_crypto_subtle_digest(#[string] algorithm: &str, #[buffer] data: &[u8]) -> Result<Vec<u8>, AnyError> {
    use sha2::{Digest, Sha256, Sha384, Sha512};

    let digest = match algorithm.to_uppercase().replace('-', "").as_str() {
        "SHA256" => Sha256::digest(data).to_vec(),
        "SHA384" => Sha384::digest(data).to_vec(),
        "SHA512" => Sha512::digest(data).to_vec(),
        _ => {
            return Err(anyhow::anyhow!(
                "Unsupported algorithm: {}. Supported: SHA-256, SHA-384, SHA-512",
                algorithm
            ))
        }
    };

    Ok(digest)
}

// ============================================================================
// Encoding Ops
// ============================================================================

#[op2]
#[string]
pub fn op_btoa(#[string] data: &str) -> String {
    use base64::Engine;
    // btoa expects Latin-1, but we'll be lenient and accept UTF-8
    base64::engine::general_purpose::STANDARD.encode(data.as_bytes())
}

#[op2]
#[string]
pub fn op_atob(#[string] data: &str) -> Result<String, AnyError> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| anyhow::anyhow!("Invalid base64: {}", e))?;
    String::from_utf8(bytes).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in decoded data: {}", e))
}

// ============================================================================
// Extension Definition
// ============================================================================

deno_core::extension!(
    jshp_runtime,
    ops = [
        op_jshp_write,
        op_console_log,
        op_console_warn,
        op_console_error,
        op_jshp_include,
        op_jshp_display,
        op_jshp_redirect,
        op_jshp_set_cookie,
        op_jshp_delete_cookie,
        op_jshp_escape,
        op_jshp_request,
        op_jshp_current_dir,
        op_jshp_debug,
        op_crypto_random_uuid,
        op_crypto_get_random_values,
        op_crypto_subtle_digest,
        op_btoa,
        op_atob,
    ],
    esm_entry_point = "ext:jshp_runtime/bootstrap.js",
    esm = ["ext:jshp_runtime/bootstrap.js" = "src/bootstrap.js"],
);

//! Escape text for safe inclusion in HTML.
//!
//! Exposed to templates as `jshp.escape()` and used for inline diagnostics.
//! Quotes use numeric entities, so `"` becomes `&#34;` rather than `&quot;`.

/// Replace `& < > " '` with their entity forms.
///
/// Nothing is ever decoded, so escaping an already escaped string escapes its
/// ampersands again instead of producing the original text.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

//! Splits a document into literal and code sections.
//!
//! A code section is everything between `<jshp>` and the first following
//! `</jshp>`. Sections never nest: an opening tag inside a code section is
//! plain text of that section.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Tag name delimiting code sections.
pub const TAG_NAME: &str = "jshp";

static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?si)<{TAG_NAME}>(.*?)</{TAG_NAME}>")).expect("code block pattern is valid")
});

/// One contiguous unit of a document, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    /// Hypertext copied to the output verbatim.
    Literal(String),
    /// Embedded code, not yet normalized.
    Code(String),
}

impl Section {
    pub fn is_code(&self) -> bool {
        matches!(self, Self::Code(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Literal(text) | Self::Code(text) => text,
        }
    }
}

/// Ordered sections of one document. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    sections: Vec<Section>,
}

impl Document {
    /// Scan `text` left to right and split it into sections.
    ///
    /// Empty literal runs are dropped; empty code blocks are kept because
    /// they still take part in execution order.
    pub fn parse(text: &str) -> Self {
        let mut sections = Vec::new();
        let mut last_end = 0;

        for captures in CODE_BLOCK.captures_iter(text) {
            let (Some(whole), Some(body)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            if whole.start() > last_end {
                sections.push(Section::Literal(text[last_end..whole.start()].to_owned()));
            }
            sections.push(Section::Code(body.as_str().to_owned()));
            last_end = whole.end();
        }

        if last_end < text.len() {
            sections.push(Section::Literal(text[last_end..].to_owned()));
        }

        Self { sections }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn has_code(&self) -> bool {
        self.sections.iter().any(Section::is_code)
    }
}

/// Prepare a code section for execution: drop surrounding blank lines, then
/// strip the first line's indentation from every line.
pub fn prepare_code(code: &str) -> Result<String> {
    remove_initial_indentation(code.trim_start_matches('\n').trim_end_matches('\n'))
}

/// Strip the leading whitespace run of the first line from every line.
///
/// Blank lines are tolerated. A non-blank line whose first characters are
/// not all whitespace, up to the width of that run, is rejected.
pub fn remove_initial_indentation(code: &str) -> Result<String> {
    let first_line = code.split('\n').next().unwrap_or_default();
    let indent = first_line.chars().take_while(|c| c.is_whitespace()).count();
    if indent == 0 {
        return Ok(code.to_owned());
    }

    let mut lines = Vec::new();
    for (index, line) in code.split('\n').enumerate() {
        let split = line.char_indices().nth(indent).map_or(line.len(), |(at, _)| at);
        let (prefix, rest) = line.split_at(split);
        if !prefix.chars().all(char::is_whitespace) {
            return Err(Error::MalformedIndentation { line: index + 1 });
        }
        lines.push(rest);
    }

    Ok(lines.join("\n"))
}

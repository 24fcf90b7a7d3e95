//! Ordered execution of a parsed document.
//!
//! Literal sections are copied through. Code sections are handed to an
//! [`Interpreter`] one at a time, in source order, and replaced by what they
//! printed. The interpreter keeps one scripting scope for the whole call, so
//! bindings made by one block are visible to the blocks after it.

use crate::error::{Error, Result};
use crate::sanitize::escape_html;
use crate::sections::{prepare_code, Document, Section};

/// Why a code block did not complete.
#[derive(Debug)]
pub enum BlockError {
    /// The embedded code raised. Handled according to the debug flag.
    Script {
        /// Whatever the block printed before failing.
        output: String,
        diagnostic: String,
    },
    /// A host-side failure that ends the render in every mode.
    Fatal(Error),
}

/// Runs code blocks against one persistent scope.
pub trait Interpreter {
    /// Execute one normalized code block and return its captured output.
    fn execute(&mut self, code: &str) -> Result<String, BlockError>;
}

/// Render `document` with `interpreter`.
///
/// In debug mode a failing block contributes its partial output plus an
/// inline diagnostic and the remaining sections are skipped. Otherwise the
/// whole call fails and no partial output escapes.
pub fn render<I: Interpreter + ?Sized>(document: &Document, interpreter: &mut I, debug: bool) -> Result<String> {
    let mut output = String::new();

    for (index, section) in document.sections().iter().enumerate() {
        let code = match section {
            Section::Literal(text) => {
                output.push_str(text);
                continue;
            }
            Section::Code(code) => code,
        };

        let code = match prepare_code(code) {
            Ok(code) => code,
            Err(err) => {
                tracing::warn!(section = index, %err, "code block rejected");
                if !debug {
                    return Err(err);
                }
                output.push_str(&diagnostic_block(&err.to_string()));
                break;
            }
        };

        match interpreter.execute(&code) {
            Ok(text) => output.push_str(&text),
            Err(BlockError::Fatal(err)) => return Err(err),
            Err(BlockError::Script {
                output: partial,
                diagnostic,
            }) => {
                tracing::warn!(section = index, %diagnostic, "code block failed");
                if !debug {
                    return Err(Error::Execution { diagnostic });
                }
                output.push_str(&partial);
                output.push_str(&diagnostic_block(&diagnostic));
                break;
            }
        }
    }

    Ok(output)
}

/// Inline error marker shown in debug mode.
pub fn diagnostic_block(diagnostic: &str) -> String {
    format!("<pre class=\"jshp-error\">{}</pre>", escape_html(diagnostic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    /// Tiny line-based script: `set NAME VALUE`, `echo TEXT`, `get NAME`,
    /// `fail MESSAGE`, `deny`.
    #[derive(Default)]
    struct ScriptedInterpreter {
        scope: HashMap<String, String>,
        executed: Vec<String>,
    }

    impl Interpreter for ScriptedInterpreter {
        fn execute(&mut self, code: &str) -> Result<String, BlockError> {
            self.executed.push(code.to_owned());
            let mut output = String::new();
            for line in code.lines() {
                let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
                match command {
                    "set" => {
                        let (name, value) = rest.split_once(' ').unwrap_or((rest, ""));
                        self.scope.insert(name.to_owned(), value.to_owned());
                    }
                    "echo" => output.push_str(rest),
                    "get" => match self.scope.get(rest) {
                        Some(value) => output.push_str(value),
                        None => {
                            return Err(BlockError::Script {
                                output,
                                diagnostic: format!("ReferenceError: {rest} is not defined"),
                            })
                        }
                    },
                    "fail" => {
                        return Err(BlockError::Script {
                            output,
                            diagnostic: format!("Error: {rest}"),
                        })
                    }
                    "deny" => {
                        return Err(BlockError::Fatal(Error::PathSecurityViolation {
                            path: "../secret".into(),
                            root: "/srv".into(),
                        }))
                    }
                    _ => {}
                }
            }
            Ok(output)
        }
    }

    fn run(text: &str, debug: bool) -> (Result<String>, ScriptedInterpreter) {
        let mut interpreter = ScriptedInterpreter::default();
        let result = render(&Document::parse(text), &mut interpreter, debug);
        (result, interpreter)
    }

    #[test]
    fn test_plain_hypertext_is_identity() {
        for text in ["", "Hi", "<p>Hello</p>", "<div>\n  <p>a &amp; b</p>\n</div>\n"] {
            assert_eq!(run(text, false).0.unwrap(), text);
        }
    }

    #[test]
    fn test_blank_blocks_render_empty() {
        for text in ["<jshp></jshp>", "<jshp> </jshp>", "<jshp>\n</jshp>", "<jshp>\n\n</jshp>", "<jshp></jshp><jshp></jshp>"] {
            assert_eq!(run(text, false).0.unwrap(), "", "{text:?}");
        }
    }

    #[test]
    fn test_blocks_share_scope_in_order() {
        let (result, interpreter) = run("<p><jshp>set x 3</jshp><jshp>echo x=\nget x</jshp></p>", false);
        assert_eq!(result.unwrap(), "<p>x=3</p>");
        assert_eq!(interpreter.executed, vec!["set x 3", "echo x=\nget x"]);
    }

    #[test]
    fn test_blocks_are_normalized_before_execution() {
        let (result, interpreter) = run("<jshp>\n    echo a\n    echo b\n</jshp>", false);
        assert_eq!(result.unwrap(), "ab");
        assert_eq!(interpreter.executed, vec!["echo a\necho b"]);
    }

    #[test]
    fn test_debug_failure_inlines_diagnostic_and_stops() {
        let (result, interpreter) = run("before<jshp>echo partial\nfail boom</jshp>after<jshp>echo never</jshp>", true);
        assert_eq!(
            result.unwrap(),
            "beforepartial<pre class=\"jshp-error\">Error: boom</pre>"
        );
        assert_eq!(interpreter.executed.len(), 1);
    }

    #[test]
    fn test_production_failure_is_fatal() {
        let (result, _) = run("before<jshp>fail boom</jshp>after", false);
        match result {
            Err(Error::Execution { diagnostic }) => assert_eq!(diagnostic, "Error: boom"),
            other => panic!("expected execution failure, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_indentation_follows_mode() {
        let text = "<jshp>    echo a\necho b</jshp>";

        let (result, interpreter) = run(text, true);
        let rendered = result.unwrap();
        assert!(rendered.contains("Malformed indentation on line 2"), "{rendered}");
        assert!(interpreter.executed.is_empty());

        let (result, _) = run(text, false);
        assert!(matches!(result, Err(Error::MalformedIndentation { line: 2 })));
    }

    #[test]
    fn test_security_violation_is_fatal_in_debug() {
        let (result, _) = run("<jshp>echo a</jshp><jshp>deny</jshp>", true);
        assert!(result.unwrap_err().is_security_violation());
    }

    #[test]
    fn test_diagnostic_is_escaped() {
        assert_eq!(diagnostic_block("<b>"), "<pre class=\"jshp-error\">&lt;b&gt;</pre>");
    }
}

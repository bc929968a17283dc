//! Error types for grammar compilation and pattern construction
//!
//! Match failures are *not* errors: the engine reports them as `None` and
//! the string operations as `false`/empty results. The types here cover the
//! two failure classes that do abort with a diagnostic: compiling a textual
//! grammar and building an illegal combinator nesting programmatically.

use std::fmt;

/// Error raised while compiling a textual PEG or validating a rule table
///
/// Carries the source position of the offending token. The `Display` form
/// is `file(line, col) Error: message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarError {
    /// Name of the grammar source ("pattern" for inline patterns)
    pub file: String,
    /// Line of the offending token (1-based)
    pub line: usize,
    /// Column of the offending token
    pub col: usize,
    /// What went wrong
    pub message: String,
}

impl GrammarError {
    /// Create a new grammar error at a source position
    pub fn new(
        file: impl Into<String>,
        line: usize,
        col: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            col,
            message: message.into(),
        }
    }
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}, {}) Error: {}",
            self.file, self.line, self.col, self.message
        )
    }
}

impl std::error::Error for GrammarError {}

/// Error raised by the `greedy_rep` combinator when its operand can match
/// the empty string
///
/// Repeating an expression that succeeds without consuming input would loop
/// forever, so the constructor rejects options and repetitions as operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstructionError;

impl ConstructionError {
    /// The diagnostic text, shared with the textual compiler
    pub(crate) const MESSAGE: &'static str =
        "operand of a repetition may not match the empty string";
}

impl fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::MESSAGE)
    }
}

impl std::error::Error for ConstructionError {}

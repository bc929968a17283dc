//! Pegmatch - PEG-based pattern matching for strings
//!
//! This crate compiles Parsing Expression Grammars, written either in the
//! compact textual notation or composed from combinator values, into an
//! internal expression tree and runs a backtracking matching engine over
//! them. On top of the engine it provides the usual string operations:
//! matching, searching, splitting and (parallel) replacing.
//!
//! ## Quick Start
//!
//! ```rust
//! use pegmatch::{parse_peg, Captures};
//!
//! let pat = parse_peg("{\\ident} '=' {\\d+}").unwrap();
//!
//! // Scan for the first match.
//! assert_eq!(pat.find("x = 1; count=42", 0), Some(7));
//!
//! // Match and read the captures.
//! let mut caps = Captures::new();
//! assert!(pat.matches_with("count=42", 0, &mut caps));
//! assert_eq!(caps.group("count=42", 0), Some("count"));
//! assert_eq!(caps.group("count=42", 1), Some("42"));
//! ```
//!
//! ## Replacing and splitting
//!
//! ```rust
//! use pegmatch::peg;
//!
//! let assign = peg("{\\ident}'='{\\ident}");
//! assert_eq!(
//!     assign.replace("var1=key; var2=key2", "$1<-$2$2"),
//!     "var1<-keykey; var2<-key2key2"
//! );
//!
//! let numbers = peg("\\d+");
//! let words: Vec<&str> = numbers.split("00232this02939is39an22example111").collect();
//! assert_eq!(words, vec!["this", "is", "an", "example"]);
//! ```
//!
//! ## Programmatic grammars
//!
//! ```rust
//! use pegmatch::{capture, greedy_plus, sequence, term, Peg};
//!
//! let expr = sequence(vec![
//!     capture(greedy_plus(term("ab")).unwrap()),
//!     term("!"),
//! ]);
//! let pat = Peg::from_expr(expr);
//! assert!(pat.matches("abab!", 0));
//! ```
//!
//! ## Feature Flags
//!
//! - `logging` - Enable debug logging using the `log` crate

// Lint configuration for production quality
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all)]

pub mod char_class;
pub mod compiler;
mod display;
pub mod error;
pub mod grammar;
pub mod lexer;
pub mod matcher;
pub mod ops;

// ============================================================================
// Core Types
// ============================================================================

pub use char_class::CharSet;
pub use grammar::{Expr, NonTerminal, Peg, PegBuilder, RuleId, MAX_SUBPATTERNS};
pub use matcher::Captures;

// ============================================================================
// Compilation
// ============================================================================

pub use compiler::{parse_peg, parse_peg_at, peg};
pub use error::{ConstructionError, GrammarError};

// ============================================================================
// Combinators
// ============================================================================

pub use grammar::{
    and_pred, any, any_rune, back_ref, back_ref_ignore_case, back_ref_ignore_style, capture, ch,
    char_set, empty, greedy_plus, greedy_rep, new_line, not_pred, option, ordered_choice, search,
    sequence, term, term_ignore_case, term_ignore_style,
};

// ============================================================================
// Preset patterns
// ============================================================================

pub use grammar::{digits, ident, ident_chars, ident_start_chars, letters, natural, whitespace};

// ============================================================================
// String operations
// ============================================================================

pub use ops::{parallel_replace, FindAll, Split};

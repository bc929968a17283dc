//! The PEG intermediate representation
//!
//! A compiled pattern is a tree of [`Expr`] nodes plus a table of named
//! rule records ([`NonTerminal`]). Rules reference each other through
//! [`RuleId`] indices into that table, so recursive and mutually recursive
//! grammars form an index-addressed graph with no reference cycles to
//! collect.
//!
//! The constructor functions in this module perform the peephole
//! normalizations the engine relies on: nested sequences and choices are
//! flattened, adjacent literals are fused, single-byte literals become
//! [`Expr::Char`], and repetitions over a byte or byte set specialize to
//! their dedicated superoperator forms.

use serde::{Deserialize, Serialize};

use crate::char_class::{CharSet, DIGITS, IDENT_CHARS, IDENT_START_CHARS, LETTERS, WHITESPACE};
use crate::error::{ConstructionError, GrammarError};

/// Number of capture slots available during a match
pub const MAX_SUBPATTERNS: usize = 10;

/// Rules with a body smaller than this (counted in leaf nodes) are
/// substituted at their reference sites instead of going through a
/// `NonTerminal` indirection.
pub(crate) const INLINE_THRESHOLD: usize = 5;

/// Index of a rule record inside a [`Peg`] or [`PegBuilder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub(crate) usize);

impl RuleId {
    /// Position of the rule in the rule table
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A PEG expression node
///
/// The engine dispatches on this tag in its hot loop; the specialized
/// repetition kinds (`GreedyRepChar`, `GreedyRepSet`, `GreedyAny`) behave
/// exactly like `GreedyRep` over their general forms. `Rule` and `List`
/// only ever appear in the parse-time representation of a whole grammar
/// (see [`Peg::program`]) and are never executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    /// Matches the empty string
    Empty,
    /// Any single byte except NUL (`.`)
    Any,
    /// Any single Unicode code point except NUL (`_`)
    AnyRune,
    /// CR, LF, or CRLF (`\n`)
    NewLine,
    /// A literal byte sequence
    Terminal(Vec<u8>),
    /// A literal, compared case-insensitively rune by rune
    TerminalIgnoreCase(Vec<u8>),
    /// A literal, compared ignoring case and `_` bytes on both sides
    TerminalIgnoreStyle(Vec<u8>),
    /// A single byte (never NUL)
    Char(u8),
    /// A byte-set membership test
    CharChoice(CharSet),
    /// Reference to a named rule
    NonTerminal(RuleId),
    /// Children matched one after another
    Sequence(Vec<Expr>),
    /// First succeeding child wins (`a / b`)
    OrderedChoice(Vec<Expr>),
    /// Zero or more repetitions (`a*`)
    GreedyRep(Box<Expr>),
    /// `'c'*` specialized
    GreedyRepChar(u8),
    /// `[…]*` specialized
    GreedyRepSet(CharSet),
    /// `.*` / `_*` specialized: consumes the rest of the input
    GreedyAny,
    /// Zero or one (`a?`)
    Option(Box<Expr>),
    /// Positive lookahead (`&a`), consumes nothing
    AndPredicate(Box<Expr>),
    /// Negative lookahead (`!a`), consumes nothing
    NotPredicate(Box<Expr>),
    /// Numbered capture (`{a}`)
    Capture(Box<Expr>),
    /// Match the text of capture *i* again (zero-based slot)
    BackRef(usize),
    /// Case-insensitive back-reference
    BackRefIgnoreCase(usize),
    /// Style-insensitive back-reference
    BackRefIgnoreStyle(usize),
    /// Skip input until the child matches (`@a`)
    Search(Box<Expr>),
    /// A rule definition: head (a `NonTerminal`) and body. Parse-time only.
    Rule(Box<Expr>, Box<Expr>),
    /// A whole grammar as a list of rules. Parse-time only.
    List(Vec<Expr>),
}

/// A named rule record
///
/// Created on first reference (forward references included), completed when
/// its `<-` definition is seen. `line`/`col` point at the first occurrence
/// of the name, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonTerminal {
    /// Rule name as written in the grammar
    pub name: String,
    /// Source line of the first occurrence
    pub line: usize,
    /// Source column of the first occurrence
    pub col: usize,
    /// Whether a `<-` definition has been seen
    pub declared: bool,
    /// Whether the rule is referenced anywhere
    pub used: bool,
    /// The rule body (`Empty` until declared)
    pub rule: Expr,
}

/// A compiled PEG: rule table plus the start expression
///
/// Immutable once built; safe to share between concurrent matches as long
/// as each match uses its own capture state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peg {
    rules: Vec<NonTerminal>,
    start: Option<RuleId>,
    root: Expr,
}

impl Peg {
    /// Wrap a bare expression (no named rules) as a compiled pattern
    pub fn from_expr(root: Expr) -> Self {
        Self {
            rules: Vec::new(),
            start: None,
            root,
        }
    }

    /// The start expression the engine runs
    #[inline]
    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// The rule table
    #[inline]
    pub fn rules(&self) -> &[NonTerminal] {
        &self.rules
    }

    /// Look up a rule record by id
    #[inline]
    pub fn rule(&self, id: RuleId) -> Option<&NonTerminal> {
        self.rules.get(id.0)
    }

    /// The start rule, if the grammar was built from named rules
    #[inline]
    pub fn start(&self) -> Option<RuleId> {
        self.start
    }

    /// The whole grammar as a single parse-time expression
    ///
    /// Multi-rule grammars come back as a `List` of `Rule` nodes (start
    /// rule first, rules made unreachable by inlining omitted); a bare
    /// pattern comes back as its root expression.
    pub fn program(&self) -> Expr {
        match self.start {
            None => self.root.clone(),
            Some(_) => Expr::List(
                self.reachable_rules()
                    .into_iter()
                    .map(|id| {
                        Expr::Rule(
                            Box::new(Expr::NonTerminal(id)),
                            Box::new(self.rules[id.0].rule.clone()),
                        )
                    })
                    .collect(),
            ),
        }
    }

    /// Rules reachable from the start rule, start first, then table order
    pub(crate) fn reachable_rules(&self) -> Vec<RuleId> {
        let start = match self.start {
            Some(s) => s,
            None => return Vec::new(),
        };
        let mut seen = vec![false; self.rules.len()];
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if seen[id.0] {
                continue;
            }
            seen[id.0] = true;
            collect_refs(&self.rules[id.0].rule, &mut stack);
        }
        let mut out = vec![start];
        out.extend(
            (0..self.rules.len())
                .filter(|&i| seen[i] && RuleId(i) != start)
                .map(RuleId),
        );
        out
    }

    /// Serialize the compiled grammar to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a compiled grammar from JSON
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

fn collect_refs(e: &Expr, out: &mut Vec<RuleId>) {
    match e {
        Expr::NonTerminal(id) => out.push(*id),
        Expr::Sequence(v) | Expr::OrderedChoice(v) | Expr::List(v) => {
            for c in v {
                collect_refs(c, out);
            }
        }
        Expr::GreedyRep(c)
        | Expr::Option(c)
        | Expr::AndPredicate(c)
        | Expr::NotPredicate(c)
        | Expr::Capture(c)
        | Expr::Search(c) => collect_refs(c, out),
        Expr::Rule(h, b) => {
            collect_refs(h, out);
            collect_refs(b, out);
        }
        _ => {}
    }
}

// ============================================================================
// Combinator constructors
// ============================================================================

/// The empty pattern
#[inline]
pub fn empty() -> Expr {
    Expr::Empty
}

/// Any single byte except NUL
#[inline]
pub fn any() -> Expr {
    Expr::Any
}

/// Any single Unicode code point except NUL
#[inline]
pub fn any_rune() -> Expr {
    Expr::AnyRune
}

/// CR, LF, or CRLF
#[inline]
pub fn new_line() -> Expr {
    Expr::NewLine
}

/// A literal; single-byte literals specialize to [`Expr::Char`]
pub fn term(t: impl Into<Vec<u8>>) -> Expr {
    let bytes = t.into();
    if bytes.len() == 1 && bytes[0] != 0 {
        Expr::Char(bytes[0])
    } else {
        Expr::Terminal(bytes)
    }
}

/// A literal compared case-insensitively
pub fn term_ignore_case(t: impl Into<Vec<u8>>) -> Expr {
    Expr::TerminalIgnoreCase(t.into())
}

/// A literal compared ignoring case and underscores
pub fn term_ignore_style(t: impl Into<Vec<u8>>) -> Expr {
    Expr::TerminalIgnoreStyle(t.into())
}

/// A single byte
///
/// # Panics
/// Panics on NUL: the engine reserves it as its end-of-input sentinel.
pub fn ch(b: u8) -> Expr {
    assert!(b != 0, "the NUL byte cannot be matched");
    Expr::Char(b)
}

/// A byte-set membership test
#[inline]
pub fn char_set(set: CharSet) -> Expr {
    Expr::CharChoice(set)
}

/// Concatenation
///
/// Flattens nested sequences, fuses adjacent literals (`Terminal`+`Terminal`
/// and `Terminal`+`Char`), and unwraps a singleton result.
pub fn sequence(items: Vec<Expr>) -> Expr {
    let mut out: Vec<Expr> = Vec::with_capacity(items.len());
    for item in items {
        let flat = match item {
            Expr::Sequence(sub) => sub,
            other => vec![other],
        };
        for e in flat {
            let fused = match (&e, out.last_mut()) {
                (Expr::Terminal(u), Some(Expr::Terminal(t))) => {
                    t.extend_from_slice(u);
                    true
                }
                (Expr::Char(c), Some(Expr::Terminal(t))) => {
                    t.push(*c);
                    true
                }
                _ => false,
            };
            if !fused {
                out.push(e);
            }
        }
    }
    if out.len() == 1 {
        out.into_iter().next().unwrap_or(Expr::Empty)
    } else if out.is_empty() {
        Expr::Empty
    } else {
        Expr::Sequence(out)
    }
}

/// Ordered choice: first succeeding alternative wins
///
/// Flattens nested choices and merges adjacent `Char`/`CharChoice`
/// alternatives by set union, so `'a' / 'b' / [c-d]` collapses into a
/// single `CharChoice`.
pub fn ordered_choice(items: Vec<Expr>) -> Expr {
    let mut out: Vec<Expr> = Vec::with_capacity(items.len());
    for item in items {
        let flat = match item {
            Expr::OrderedChoice(sub) => sub,
            other => vec![other],
        };
        for e in flat {
            let merged = match (as_set(&e), out.last_mut()) {
                (Some(new), Some(last)) => match as_set(last) {
                    Some(old) => {
                        *last = Expr::CharChoice(old.union(new));
                        true
                    }
                    None => false,
                },
                _ => false,
            };
            if !merged {
                out.push(e);
            }
        }
    }
    if out.len() == 1 {
        out.into_iter().next().unwrap_or(Expr::Empty)
    } else if out.is_empty() {
        Expr::Empty
    } else {
        Expr::OrderedChoice(out)
    }
}

fn as_set(e: &Expr) -> Option<CharSet> {
    match e {
        Expr::Char(c) => Some(CharSet::empty().with(*c)),
        Expr::CharChoice(s) => Some(*s),
        _ => None,
    }
}

/// Zero or one (`a?`)
///
/// An operand that already matches empty is returned unchanged, so
/// `(a?)? ≡ a?` and `(a*)? ≡ a*`.
pub fn option(a: Expr) -> Expr {
    match a {
        Expr::Option(_)
        | Expr::GreedyRep(_)
        | Expr::GreedyRepChar(_)
        | Expr::GreedyRepSet(_)
        | Expr::GreedyAny => a,
        other => Expr::Option(Box::new(other)),
    }
}

/// Zero or more repetitions (`a*`)
///
/// Specializes byte, byte-set and any-byte operands to their superoperator
/// forms. Fails when the operand can already match the empty string, which
/// would repeat forever.
pub fn greedy_rep(a: Expr) -> Result<Expr, ConstructionError> {
    match a {
        Expr::Char(c) => Ok(Expr::GreedyRepChar(c)),
        Expr::CharChoice(s) => Ok(Expr::GreedyRepSet(s)),
        Expr::Any | Expr::AnyRune => Ok(Expr::GreedyAny),
        Expr::Option(_)
        | Expr::GreedyRep(_)
        | Expr::GreedyRepChar(_)
        | Expr::GreedyRepSet(_)
        | Expr::GreedyAny => Err(ConstructionError),
        other => Ok(Expr::GreedyRep(Box::new(other))),
    }
}

/// One or more repetitions: `a+` is `(a, a*)`
pub fn greedy_plus(a: Expr) -> Result<Expr, ConstructionError> {
    let rep = greedy_rep(a.clone())?;
    Ok(sequence(vec![a, rep]))
}

/// Positive lookahead (`&a`)
#[inline]
pub fn and_pred(a: Expr) -> Expr {
    Expr::AndPredicate(Box::new(a))
}

/// Negative lookahead (`!a`)
#[inline]
pub fn not_pred(a: Expr) -> Expr {
    Expr::NotPredicate(Box::new(a))
}

/// Skip input until `a` matches (`@a`)
#[inline]
pub fn search(a: Expr) -> Expr {
    Expr::Search(Box::new(a))
}

/// Numbered capture (`{a}`)
#[inline]
pub fn capture(a: Expr) -> Expr {
    Expr::Capture(Box::new(a))
}

/// Back-reference to capture `n` (1-based, `$n`)
///
/// # Panics
/// Panics when `n` is 0 or exceeds [`MAX_SUBPATTERNS`].
pub fn back_ref(n: usize) -> Expr {
    assert!(n >= 1 && n <= MAX_SUBPATTERNS, "back-reference out of range");
    Expr::BackRef(n - 1)
}

/// Case-insensitive back-reference (`i$n`)
///
/// # Panics
/// Panics when `n` is 0 or exceeds [`MAX_SUBPATTERNS`].
pub fn back_ref_ignore_case(n: usize) -> Expr {
    assert!(n >= 1 && n <= MAX_SUBPATTERNS, "back-reference out of range");
    Expr::BackRefIgnoreCase(n - 1)
}

/// Style-insensitive back-reference (`y$n`)
///
/// # Panics
/// Panics when `n` is 0 or exceeds [`MAX_SUBPATTERNS`].
pub fn back_ref_ignore_style(n: usize) -> Expr {
    assert!(n >= 1 && n <= MAX_SUBPATTERNS, "back-reference out of range");
    Expr::BackRefIgnoreStyle(n - 1)
}

// ============================================================================
// Preset patterns
// ============================================================================

/// `[A-Za-z]`
pub fn letters() -> Expr {
    char_set(LETTERS)
}

/// `[0-9]`
pub fn digits() -> Expr {
    char_set(DIGITS)
}

/// `[ \t\n\v\f\r]`
pub fn whitespace() -> Expr {
    char_set(WHITESPACE)
}

/// `[A-Za-z0-9_]`
pub fn ident_chars() -> Expr {
    char_set(IDENT_CHARS)
}

/// `[A-Za-z_]`
pub fn ident_start_chars() -> Expr {
    char_set(IDENT_START_CHARS)
}

/// An identifier: `[A-Za-z_][A-Za-z0-9_]*`
pub fn ident() -> Expr {
    sequence(vec![
        Expr::CharChoice(IDENT_START_CHARS),
        Expr::GreedyRepSet(IDENT_CHARS),
    ])
}

/// A natural number: `[0-9]+`
pub fn natural() -> Expr {
    sequence(vec![Expr::CharChoice(DIGITS), Expr::GreedyRepSet(DIGITS)])
}

// ============================================================================
// Rule table construction
// ============================================================================

/// Number of leaf nodes in an expression, used to decide rule inlining
///
/// A `NonTerminal` reference counts as over the threshold so recursive
/// rules are never inlined.
pub(crate) fn space_cost(e: &Expr) -> usize {
    match e {
        Expr::Empty => 0,
        Expr::NonTerminal(_) => INLINE_THRESHOLD + 1,
        Expr::Any
        | Expr::AnyRune
        | Expr::NewLine
        | Expr::Terminal(_)
        | Expr::TerminalIgnoreCase(_)
        | Expr::TerminalIgnoreStyle(_)
        | Expr::Char(_)
        | Expr::CharChoice(_)
        | Expr::GreedyRepChar(_)
        | Expr::GreedyRepSet(_)
        | Expr::GreedyAny
        | Expr::BackRef(_)
        | Expr::BackRefIgnoreCase(_)
        | Expr::BackRefIgnoreStyle(_) => 1,
        Expr::Sequence(v) | Expr::OrderedChoice(v) | Expr::List(v) => {
            let mut total = 0;
            for c in v {
                total += space_cost(c);
                if total > INLINE_THRESHOLD {
                    break;
                }
            }
            total
        }
        Expr::GreedyRep(c)
        | Expr::Option(c)
        | Expr::AndPredicate(c)
        | Expr::NotPredicate(c)
        | Expr::Capture(c)
        | Expr::Search(c) => space_cost(c),
        Expr::Rule(h, b) => space_cost(h) + space_cost(b),
    }
}

/// Style-insensitive name comparison: case folded, underscores ignored
pub(crate) fn eq_ignore_style(a: &str, b: &str) -> bool {
    let ai = a
        .chars()
        .filter(|&c| c != '_')
        .map(|c| c.to_ascii_lowercase());
    let bi = b
        .chars()
        .filter(|&c| c != '_')
        .map(|c| c.to_ascii_lowercase());
    ai.eq(bi)
}

/// Builds a rule table and hands out [`Expr::NonTerminal`] references
///
/// This is the programmatic counterpart of the textual compiler: create or
/// look up records, set their bodies, reference them from expressions, then
/// [`build`](PegBuilder::build) to validate and produce a [`Peg`].
#[derive(Debug)]
pub struct PegBuilder {
    file: String,
    rules: Vec<NonTerminal>,
}

impl Default for PegBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PegBuilder {
    /// Create an empty builder; diagnostics report the source as "pattern"
    pub fn new() -> Self {
        Self::with_file("pattern")
    }

    /// Create an empty builder with a source name for diagnostics
    pub fn with_file(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            rules: Vec::new(),
        }
    }

    /// Find a record by style-insensitive name, creating a forward
    /// reference when absent
    pub fn lookup_or_create(&mut self, name: &str, line: usize, col: usize) -> RuleId {
        for (i, nt) in self.rules.iter().enumerate() {
            if eq_ignore_style(&nt.name, name) {
                return RuleId(i);
            }
        }
        self.new_non_terminal(name, line, col)
    }

    /// Create a fresh record, without searching for an existing one
    pub fn new_non_terminal(&mut self, name: &str, line: usize, col: usize) -> RuleId {
        self.rules.push(NonTerminal {
            name: name.to_string(),
            line,
            col,
            declared: false,
            used: false,
            rule: Expr::Empty,
        });
        RuleId(self.rules.len() - 1)
    }

    /// Declare a rule's body; redefinition is an error
    pub fn set_rule(&mut self, id: RuleId, body: Expr) -> Result<(), GrammarError> {
        let nt = &mut self.rules[id.0];
        if nt.declared {
            return Err(GrammarError::new(
                &self.file,
                nt.line,
                nt.col,
                format!("attempt to redefine: {}", nt.name),
            ));
        }
        nt.declared = true;
        nt.rule = body;
        Ok(())
    }

    /// Mark a record as referenced
    pub fn mark_used(&mut self, id: RuleId) {
        self.rules[id.0].used = true;
    }

    /// Reference a rule from an expression
    ///
    /// Marks the record used. Declared rules whose body is small enough are
    /// inlined: the reference is replaced by a copy of the body, which is
    /// structurally identical and skips the indirection at match time.
    pub fn non_terminal(&mut self, id: RuleId) -> Expr {
        self.rules[id.0].used = true;
        let nt = &self.rules[id.0];
        if nt.declared && space_cost(&nt.rule) < INLINE_THRESHOLD {
            nt.rule.clone()
        } else {
            Expr::NonTerminal(id)
        }
    }

    /// Access a record
    pub fn rule(&self, id: RuleId) -> &NonTerminal {
        &self.rules[id.0]
    }

    /// Validate the table and produce a compiled grammar
    ///
    /// The first record created is the start rule (for a textual grammar,
    /// the first rule in the file); its body becomes the engine's root
    /// expression. Every record must be declared, and every rule other
    /// than the start rule must be used somewhere.
    pub fn build(self) -> Result<Peg, GrammarError> {
        if self.rules.is_empty() {
            return Err(GrammarError::new(&self.file, 0, 0, "grammar has no rules"));
        }
        let start = RuleId(0);
        self.check_table(Some(start))?;
        let root = self.rules[start.0].rule.clone();
        Ok(Peg {
            rules: self.rules,
            start: Some(start),
            root,
        })
    }

    /// Produce a compiled grammar from an explicit root expression
    ///
    /// Used for bare patterns; any record left undeclared is an error.
    pub fn build_expr(self, root: Expr) -> Result<Peg, GrammarError> {
        self.check_table(None)?;
        Ok(Peg {
            rules: self.rules,
            start: None,
            root,
        })
    }

    fn check_table(&self, start: Option<RuleId>) -> Result<(), GrammarError> {
        for (i, nt) in self.rules.iter().enumerate() {
            if !nt.declared {
                return Err(GrammarError::new(
                    &self.file,
                    nt.line,
                    nt.col,
                    format!("undeclared identifier: {}", nt.name),
                ));
            }
            if !nt.used && start != Some(RuleId(i)) {
                return Err(GrammarError::new(
                    &self.file,
                    nt.line,
                    nt.col,
                    format!("unused rule: {}", nt.name),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_single_byte_specializes() {
        assert_eq!(term("a"), Expr::Char(b'a'));
        assert_eq!(term("ab"), Expr::Terminal(b"ab".to_vec()));
        assert_eq!(term(""), Expr::Terminal(Vec::new()));
    }

    #[test]
    fn test_sequence_flattens_and_fuses() {
        let inner = sequence(vec![term("cd"), term("e")]);
        assert_eq!(inner, Expr::Terminal(b"cde".to_vec()));

        let outer = sequence(vec![term("ab"), inner, any()]);
        assert_eq!(
            outer,
            Expr::Sequence(vec![Expr::Terminal(b"abcde".to_vec()), Expr::Any])
        );
    }

    #[test]
    fn test_sequence_singleton_unwraps() {
        assert_eq!(sequence(vec![any()]), Expr::Any);
        assert_eq!(sequence(vec![]), Expr::Empty);
    }

    #[test]
    fn test_choice_merges_byte_alternatives() {
        let e = ordered_choice(vec![
            term("a"),
            term("b"),
            char_set(CharSet::from_range(b'c', b'd')),
        ]);
        match e {
            Expr::CharChoice(s) => {
                assert!(s.contains(b'a') && s.contains(b'b') && s.contains(b'c') && s.contains(b'd'));
                assert_eq!(s.len(), 4);
            }
            other => panic!("expected CharChoice, got {:?}", other),
        }
    }

    #[test]
    fn test_choice_keeps_non_mergeable_alternatives() {
        let e = ordered_choice(vec![term("ab"), term("c")]);
        assert_eq!(
            e,
            Expr::OrderedChoice(vec![Expr::Terminal(b"ab".to_vec()), Expr::Char(b'c')])
        );
    }

    #[test]
    fn test_greedy_rep_specialization() {
        assert_eq!(greedy_rep(term("a")), Ok(Expr::GreedyRepChar(b'a')));
        assert!(matches!(
            greedy_rep(char_set(DIGITS)),
            Ok(Expr::GreedyRepSet(_))
        ));
        assert_eq!(greedy_rep(any()), Ok(Expr::GreedyAny));
        assert_eq!(greedy_rep(any_rune()), Ok(Expr::GreedyAny));
        assert!(matches!(greedy_rep(term("ab")), Ok(Expr::GreedyRep(_))));
    }

    #[test]
    fn test_greedy_rep_rejects_empty_matching_operand() {
        assert_eq!(greedy_rep(option(term("ab"))), Err(ConstructionError));
        let rep = greedy_rep(term("ab")).expect("valid rep");
        assert_eq!(greedy_rep(rep), Err(ConstructionError));
        assert_eq!(greedy_rep(Expr::GreedyAny), Err(ConstructionError));
    }

    #[test]
    fn test_option_collapses() {
        let opt = option(term("ab"));
        assert_eq!(option(opt.clone()), opt);
        let rep = greedy_rep(term("ab")).expect("valid rep");
        assert_eq!(option(rep.clone()), rep);
    }

    #[test]
    fn test_greedy_plus_expands() {
        let e = greedy_plus(term("a")).expect("valid plus");
        assert_eq!(
            e,
            Expr::Sequence(vec![Expr::Char(b'a'), Expr::GreedyRepChar(b'a')])
        );
    }

    #[test]
    fn test_back_ref_is_one_based() {
        assert_eq!(back_ref(1), Expr::BackRef(0));
        assert_eq!(back_ref_ignore_case(2), Expr::BackRefIgnoreCase(1));
        assert_eq!(back_ref_ignore_style(10), Expr::BackRefIgnoreStyle(9));
    }

    #[test]
    fn test_space_cost() {
        assert_eq!(space_cost(&term("abc")), 1);
        assert_eq!(space_cost(&sequence(vec![any(), new_line()])), 2);
        assert!(space_cost(&Expr::NonTerminal(RuleId(0))) > INLINE_THRESHOLD);
        assert_eq!(space_cost(&capture(ident())), 2);
    }

    #[test]
    fn test_eq_ignore_style() {
        assert!(eq_ignore_style("fooBar", "foo_bar"));
        assert!(eq_ignore_style("WHILE", "w_hile"));
        assert!(!eq_ignore_style("foo", "fooo"));
    }

    #[test]
    fn test_builder_inlines_small_rules() {
        let mut b = PegBuilder::new();
        let small = b.lookup_or_create("small", 1, 0);
        b.set_rule(small, term("x")).expect("declare");
        assert_eq!(b.non_terminal(small), Expr::Char(b'x'));

        let big = b.lookup_or_create("big", 1, 0);
        b.set_rule(
            big,
            sequence(vec![any(), any(), new_line(), term("abc"), term("d"), ident()]),
        )
        .expect("declare");
        assert_eq!(b.non_terminal(big), Expr::NonTerminal(big));
    }

    #[test]
    fn test_builder_forward_reference_not_inlined() {
        let mut b = PegBuilder::new();
        let fwd = b.lookup_or_create("fwd", 1, 0);
        // Not yet declared: must stay a reference even though Empty is small.
        assert_eq!(b.non_terminal(fwd), Expr::NonTerminal(fwd));
    }

    #[test]
    fn test_builder_rejects_redefinition() {
        let mut b = PegBuilder::new();
        let id = b.lookup_or_create("a", 1, 0);
        b.set_rule(id, term("x")).expect("declare");
        let err = b.set_rule(id, term("y")).expect_err("redefinition");
        assert!(err.message.contains("redefine"));
    }

    #[test]
    fn test_builder_rejects_undeclared_and_unused() {
        let mut b = PegBuilder::new();
        let s = b.lookup_or_create("s", 1, 0);
        let missing = b.lookup_or_create("missing", 1, 5);
        let body = b.non_terminal(missing);
        b.set_rule(s, body).expect("declare");
        let err = b.build().expect_err("undeclared");
        assert!(err.message.contains("undeclared identifier: missing"));

        let mut b = PegBuilder::new();
        let s = b.lookup_or_create("s", 1, 0);
        b.set_rule(s, term("x")).expect("declare");
        let orphan = b.lookup_or_create("orphan", 2, 0);
        b.set_rule(orphan, term("y")).expect("declare");
        let err = b.build().expect_err("unused");
        assert!(err.message.contains("unused rule: orphan"));
    }

    #[test]
    fn test_builder_style_insensitive_lookup() {
        let mut b = PegBuilder::new();
        let a = b.lookup_or_create("myRule", 1, 0);
        let again = b.lookup_or_create("my_rule", 2, 0);
        assert_eq!(a, again);
    }

    #[test]
    fn test_peg_json_roundtrip() {
        let mut b = PegBuilder::new();
        let s = b.lookup_or_create("s", 1, 0);
        let inner = b.lookup_or_create("inner", 1, 0);
        let r = b.non_terminal(inner);
        b.set_rule(s, sequence(vec![r, natural(), capture(ident())]))
            .expect("declare");
        b.set_rule(inner, sequence(vec![any(); 6])).expect("declare");
        let peg = b.build().expect("valid grammar");

        let json = peg.to_json().expect("serialize");
        let back = Peg::from_json(&json).expect("deserialize");
        assert_eq!(peg, back);
    }

    #[test]
    fn test_program_lists_reachable_rules() {
        let mut b = PegBuilder::new();
        let s = b.lookup_or_create("s", 1, 0);
        let tiny = b.lookup_or_create("tiny", 1, 0);
        b.set_rule(tiny, term("x")).expect("declare");
        // Inlined at the reference site: "tiny" disappears from the tree.
        let r = b.non_terminal(tiny);
        b.set_rule(s, sequence(vec![r, any()])).expect("declare");
        let peg = b.build().expect("valid grammar");

        match peg.program() {
            Expr::List(rules) => assert_eq!(rules.len(), 1),
            other => panic!("expected List, got {:?}", other),
        }
    }
}

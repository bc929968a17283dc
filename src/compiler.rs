//! Compiler from textual PEG notation to the IR
//!
//! Recursive descent over the token stream:
//!
//! ```text
//! grammar  ::= [globalModifier] (rule)+ | expr
//! rule     ::= Identifier '<-' expr
//! expr     ::= seq ('/' seq)*
//! seq      ::= primary+
//! primary  ::= ('&' | '!' | '@')? atom ('?' | '*' | '+')*
//! ```
//!
//! Rule linkage goes through a [`PegBuilder`]: non-terminals are created on
//! first reference, declared when their `<-` definition is parsed, and
//! checked for declared/used after the whole grammar is read. A leading
//! `\i` or `\y` sets a file-scoped modifier for every string terminal and
//! back-reference without an explicit per-token modifier.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::char_class::{DIGITS, IDENT_START_CHARS, WHITESPACE};
use crate::error::GrammarError;
use crate::grammar::{
    and_pred, any, any_rune, capture, char_set, greedy_plus, greedy_rep, ident, not_pred, option,
    ordered_choice, search, sequence, term, term_ignore_case, term_ignore_style, Expr, Peg,
    PegBuilder, MAX_SUBPATTERNS,
};
use crate::lexer::{Lexer, Modifier, TokKind, Token};

/// Lazily initialized built-in escape table
static BUILTINS: OnceLock<HashMap<&'static str, Expr>> = OnceLock::new();

fn builtin_table() -> &'static HashMap<&'static str, Expr> {
    BUILTINS.get_or_init(|| {
        HashMap::from([
            ("n", Expr::NewLine),
            ("d", Expr::CharChoice(DIGITS)),
            ("D", Expr::CharChoice(DIGITS.complement())),
            ("s", Expr::CharChoice(WHITESPACE)),
            ("S", Expr::CharChoice(WHITESPACE.complement())),
            ("w", Expr::CharChoice(IDENT_START_CHARS)),
            ("W", Expr::CharChoice(IDENT_START_CHARS.complement())),
            ("ident", ident()),
        ])
    })
}

/// Compile a textual PEG
///
/// The source is reported as "pattern" in diagnostics, positions starting
/// at line 1.
pub fn parse_peg(source: &str) -> Result<Peg, GrammarError> {
    parse_peg_at(source, "pattern", 1, 0)
}

/// Compile a textual PEG embedded in a larger file
///
/// `file`, `line` and `col` locate the pattern text for diagnostics.
pub fn parse_peg_at(
    source: &str,
    file: &str,
    line: usize,
    col: usize,
) -> Result<Peg, GrammarError> {
    PegParser::new(source, file, line, col)?.parse()
}

/// Compile a pattern literal, panicking on bad grammar text
///
/// For statically known patterns only; use [`parse_peg`] for anything
/// built at run time.
///
/// # Panics
/// Panics with the compile diagnostic when `source` is not a valid PEG.
pub fn peg(source: &str) -> Peg {
    match parse_peg(source) {
        Ok(p) => p,
        Err(e) => panic!("{}", e),
    }
}

impl Peg {
    /// Compile a textual PEG; see [`parse_peg`]
    pub fn compile(source: &str) -> Result<Self, GrammarError> {
        parse_peg(source)
    }
}

impl FromStr for Peg {
    type Err = GrammarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_peg(s)
    }
}

struct PegParser<'a> {
    lexer: Lexer<'a>,
    tok: Token,
    next: Token,
    builder: PegBuilder,
    captures: usize,
    file_modifier: Modifier,
    file: String,
}

impl<'a> PegParser<'a> {
    fn new(source: &'a str, file: &str, line: usize, col: usize) -> Result<Self, GrammarError> {
        let mut lexer = Lexer::new(source, line, col);
        let tok = lexer.next_token();
        let next = lexer.next_token();
        let p = Self {
            lexer,
            tok,
            next,
            builder: PegBuilder::with_file(file),
            captures: 0,
            file_modifier: Modifier::None,
            file: file.to_string(),
        };
        p.check_current()?;
        Ok(p)
    }

    fn err(&self, message: impl Into<String>) -> GrammarError {
        GrammarError::new(&self.file, self.tok.line, self.tok.col, message)
    }

    fn check_current(&self) -> Result<(), GrammarError> {
        if self.tok.kind == TokKind::Invalid {
            Err(self.err(format!("invalid token: {}", self.tok.literal)))
        } else {
            Ok(())
        }
    }

    fn advance(&mut self) -> Result<(), GrammarError> {
        self.tok = std::mem::replace(&mut self.next, self.lexer.next_token());
        self.check_current()
    }

    fn expect(&mut self, kind: TokKind, symbol: &str) -> Result<(), GrammarError> {
        if self.tok.kind == kind {
            self.advance()
        } else {
            Err(self.err(format!("'{}' expected", symbol)))
        }
    }

    fn parse(mut self) -> Result<Peg, GrammarError> {
        if self.tok.kind == TokKind::Builtin {
            match self.tok.literal.as_str() {
                "i" => {
                    self.file_modifier = Modifier::IgnoreCase;
                    self.advance()?;
                }
                "y" => {
                    self.file_modifier = Modifier::IgnoreStyle;
                    self.advance()?;
                }
                _ => {}
            }
        }
        if self.tok.kind == TokKind::Identifier && self.next.kind == TokKind::Arrow {
            while self.tok.kind == TokKind::Identifier && self.next.kind == TokKind::Arrow {
                self.parse_rule()?;
            }
            if self.tok.kind != TokKind::Eof {
                return Err(self.err(format!("unexpected token: {}", self.tok.literal)));
            }
            self.builder.build()
        } else {
            let root = self.parse_expr()?;
            if self.tok.kind != TokKind::Eof {
                return Err(self.err(format!("unexpected token: {}", self.tok.literal)));
            }
            self.builder.build_expr(root)
        }
    }

    fn parse_rule(&mut self) -> Result<(), GrammarError> {
        let name = self.tok.literal.clone();
        let (line, col) = (self.tok.line, self.tok.col);
        let id = self.builder.lookup_or_create(&name, line, col);
        self.advance()?; // identifier
        self.advance()?; // '<-'
        let body = self.parse_expr()?;
        self.builder
            .set_rule(id, body)
            .map_err(|e| GrammarError::new(&self.file, line, col, e.message))
    }

    fn parse_expr(&mut self) -> Result<Expr, GrammarError> {
        let mut alts = vec![self.parse_seq()?];
        while self.tok.kind == TokKind::Bar {
            self.advance()?;
            alts.push(self.parse_seq()?);
        }
        Ok(ordered_choice(alts))
    }

    fn parse_seq(&mut self) -> Result<Expr, GrammarError> {
        let mut items = vec![self.parse_primary()?];
        while self.starts_primary() {
            items.push(self.parse_primary()?);
        }
        Ok(sequence(items))
    }

    fn starts_primary(&self) -> bool {
        match self.tok.kind {
            // An identifier followed by '<-' begins the next rule.
            TokKind::Identifier => self.next.kind != TokKind::Arrow,
            TokKind::StringLit
            | TokKind::CharSet
            | TokKind::Builtin
            | TokKind::Escaped
            | TokKind::BackRef
            | TokKind::ParLe
            | TokKind::CurlyLe
            | TokKind::Any
            | TokKind::AnyRune
            | TokKind::Amp
            | TokKind::Not
            | TokKind::At => true,
            _ => false,
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, GrammarError> {
        match self.tok.kind {
            TokKind::Amp => {
                self.advance()?;
                Ok(and_pred(self.parse_primary()?))
            }
            TokKind::Not => {
                self.advance()?;
                Ok(not_pred(self.parse_primary()?))
            }
            TokKind::At => {
                self.advance()?;
                Ok(search(self.parse_primary()?))
            }
            _ => {
                let atom = self.parse_atom()?;
                self.parse_suffixes(atom)
            }
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, GrammarError> {
        match self.tok.kind {
            TokKind::Identifier => {
                if self.next.kind == TokKind::Arrow {
                    return Err(self.err("expression expected"));
                }
                let id =
                    self.builder
                        .lookup_or_create(&self.tok.literal, self.tok.line, self.tok.col);
                let e = self.builder.non_terminal(id);
                self.advance()?;
                Ok(e)
            }
            TokKind::StringLit => {
                let e = self.string_expr();
                self.advance()?;
                Ok(e)
            }
            TokKind::CharSet => {
                let e = char_set(self.tok.charset);
                self.advance()?;
                Ok(e)
            }
            TokKind::ParLe => {
                self.advance()?;
                let e = self.parse_expr()?;
                self.expect(TokKind::ParRi, ")")?;
                Ok(e)
            }
            TokKind::CurlyLe => {
                self.advance()?;
                let e = self.parse_expr()?;
                self.expect(TokKind::CurlyRi, "}")?;
                self.captures += 1;
                Ok(capture(e))
            }
            TokKind::Any => {
                self.advance()?;
                Ok(any())
            }
            TokKind::AnyRune => {
                self.advance()?;
                Ok(any_rune())
            }
            TokKind::Builtin => {
                let e = match builtin_table().get(self.tok.literal.as_str()) {
                    Some(e) => e.clone(),
                    None => {
                        return Err(
                            self.err(format!("unknown built-in: \\{}", self.tok.literal))
                        );
                    }
                };
                self.advance()?;
                Ok(e)
            }
            TokKind::Escaped => {
                let b = self.tok.bytes[0];
                self.advance()?;
                Ok(Expr::Char(b))
            }
            TokKind::BackRef => {
                let n = self.tok.index;
                if n < 1 || n > self.captures || n > MAX_SUBPATTERNS {
                    return Err(self.err("invalid back reference index"));
                }
                let e = match self.modifier() {
                    Modifier::IgnoreCase => Expr::BackRefIgnoreCase(n - 1),
                    Modifier::IgnoreStyle => Expr::BackRefIgnoreStyle(n - 1),
                    Modifier::None | Modifier::Verbatim => Expr::BackRef(n - 1),
                };
                self.advance()?;
                Ok(e)
            }
            TokKind::Eof => Err(self.err("expression expected")),
            _ => Err(self.err(format!("unexpected token: {}", self.tok.literal))),
        }
    }

    fn parse_suffixes(&mut self, atom: Expr) -> Result<Expr, GrammarError> {
        let mut e = atom;
        loop {
            match self.tok.kind {
                TokKind::Question => {
                    e = option(e);
                    self.advance()?;
                }
                TokKind::Star => {
                    e = greedy_rep(e).map_err(|c| self.err(c.to_string()))?;
                    self.advance()?;
                }
                TokKind::Plus => {
                    e = greedy_plus(e).map_err(|c| self.err(c.to_string()))?;
                    self.advance()?;
                }
                _ => return Ok(e),
            }
        }
    }

    /// The modifier in effect for the current string or back-reference:
    /// the per-token one when present, the file-scoped one otherwise
    fn modifier(&self) -> Modifier {
        match self.tok.modifier {
            Modifier::None => self.file_modifier,
            explicit => explicit,
        }
    }

    fn string_expr(&self) -> Expr {
        let bytes = self.tok.bytes.clone();
        match self.modifier() {
            Modifier::IgnoreCase => term_ignore_case(bytes),
            Modifier::IgnoreStyle => term_ignore_style(bytes),
            // `v` exists to override a file-scoped modifier; the result is
            // a plain terminal either way.
            Modifier::None | Modifier::Verbatim => term(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::char_class::CharSet;
    use crate::grammar::RuleId;

    #[test]
    fn test_bare_expression() {
        let p = parse_peg("'ab' / 'c'").expect("compiles");
        assert_eq!(p.start(), None);
        assert_eq!(
            *p.root(),
            Expr::OrderedChoice(vec![Expr::Terminal(b"ab".to_vec()), Expr::Char(b'c')])
        );
    }

    #[test]
    fn test_search_pattern() {
        let p = parse_peg("'(' @ ')'").expect("compiles");
        assert_eq!(
            *p.root(),
            Expr::Sequence(vec![
                Expr::Char(b'('),
                Expr::Search(Box::new(Expr::Char(b')'))),
            ])
        );
    }

    #[test]
    fn test_suffixes_and_prefixes() {
        let p = parse_peg("!\\d .").expect("compiles");
        match p.root() {
            Expr::Sequence(items) => {
                assert!(matches!(items[0], Expr::NotPredicate(_)));
                assert_eq!(items[1], Expr::Any);
            }
            other => panic!("expected Sequence, got {:?}", other),
        }

        let p = parse_peg("\\d+").expect("compiles");
        assert_eq!(
            *p.root(),
            Expr::Sequence(vec![
                Expr::CharChoice(DIGITS),
                Expr::GreedyRepSet(DIGITS),
            ])
        );
    }

    #[test]
    fn test_prefix_binds_suffixed_atom() {
        let p = parse_peg("&'ab'*").expect("compiles");
        match p.root() {
            Expr::AndPredicate(inner) => assert!(matches!(**inner, Expr::GreedyRep(_))),
            other => panic!("expected AndPredicate, got {:?}", other),
        }
    }

    #[test]
    fn test_rules_and_start_symbol() {
        let p = parse_peg("S <- A 'z' A  A <- 'ab' 'c' . \\n \\d").expect("compiles");
        assert_eq!(p.start(), Some(RuleId(0)));
        assert_eq!(p.rules().len(), 2);
        assert_eq!(p.rules()[0].name, "S");
        assert!(p.rules()[1].declared && p.rules()[1].used);
        // The body of the first rule is the engine root.
        assert_eq!(*p.root(), p.rules()[0].rule);
    }

    #[test]
    fn test_backward_reference_inlines_small_rule() {
        let p = parse_peg("S <- A B  A <- 'x'  B <- A 'y'").expect("compiles");
        // B references A after its declaration; cost 1 < threshold, inlined.
        assert_eq!(
            p.rules()[2].rule,
            Expr::Sequence(vec![Expr::Char(b'x'), Expr::Char(b'y')])
        );
        // S referenced A before it was declared: stays a reference.
        match p.root() {
            Expr::Sequence(items) => assert_eq!(items[0], Expr::NonTerminal(RuleId(1))),
            other => panic!("expected Sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_file_modifier_and_verbatim_override() {
        let p = parse_peg("\\y 'while'").expect("compiles");
        assert_eq!(*p.root(), Expr::TerminalIgnoreStyle(b"while".to_vec()));

        let p = parse_peg("\\y v'while'").expect("compiles");
        assert_eq!(*p.root(), Expr::Terminal(b"while".to_vec()));

        let p = parse_peg("\\i 'a' i'b' 'cd'").expect("compiles");
        assert_eq!(
            *p.root(),
            Expr::Sequence(vec![
                Expr::TerminalIgnoreCase(b"a".to_vec()),
                Expr::TerminalIgnoreCase(b"b".to_vec()),
                Expr::TerminalIgnoreCase(b"cd".to_vec()),
            ])
        );
    }

    #[test]
    fn test_captures_and_back_refs() {
        let p = parse_peg("{\\ident} '=' $1").expect("compiles");
        match p.root() {
            Expr::Sequence(items) => {
                assert!(matches!(items[0], Expr::Capture(_)));
                assert_eq!(items[2], Expr::BackRef(0));
            }
            other => panic!("expected Sequence, got {:?}", other),
        }

        let p = parse_peg("{'a'} y$1").expect("compiles");
        match p.root() {
            Expr::Sequence(items) => assert_eq!(items[1], Expr::BackRefIgnoreStyle(0)),
            other => panic!("expected Sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_back_ref_index_out_of_range() {
        let err = parse_peg("{'a'} $2").expect_err("only one capture");
        assert!(err.message.contains("invalid back reference index"));
        let err = parse_peg("$1").expect_err("no captures");
        assert!(err.message.contains("invalid back reference index"));
    }

    #[test]
    fn test_undeclared_rule() {
        let err = parse_peg("S <- foo").expect_err("foo missing");
        assert!(err.message.contains("undeclared identifier: foo"));
    }

    #[test]
    fn test_unused_rule() {
        let err = parse_peg("S <- 'a'  B <- 'b'").expect_err("B unused");
        assert!(err.message.contains("unused rule: B"));
    }

    #[test]
    fn test_redefined_rule() {
        let err = parse_peg("S <- 'a'  S <- 'b'").expect_err("S redefined");
        assert!(err.message.contains("attempt to redefine: S"));
    }

    #[test]
    fn test_unknown_builtin() {
        let err = parse_peg("\\frobnicate").expect_err("unknown");
        assert!(err.message.contains("unknown built-in: \\frobnicate"));
    }

    #[test]
    fn test_invalid_token_reports_position() {
        let err = parse_peg("'a'\n'b\\x00'").expect_err("bad escape");
        assert!(err.message.contains("invalid token"));
        assert_eq!(err.line, 2);
        assert_eq!(err.to_string(), format!("pattern(2, 0) Error: {}", err.message));
    }

    #[test]
    fn test_repetition_of_empty_matching_operand() {
        let err = parse_peg("('a'?)*").expect_err("would loop");
        assert!(err.message.contains("empty string"));
    }

    #[test]
    fn test_builtin_charsets() {
        let p = parse_peg("\\s \\S \\w \\W \\D").expect("compiles");
        match p.root() {
            Expr::Sequence(items) => {
                assert_eq!(items[0], Expr::CharChoice(WHITESPACE));
                assert_eq!(items[1], Expr::CharChoice(WHITESPACE.complement()));
                assert_eq!(items[2], Expr::CharChoice(IDENT_START_CHARS));
                assert_eq!(items[3], Expr::CharChoice(IDENT_START_CHARS.complement()));
                assert_eq!(items[4], Expr::CharChoice(DIGITS.complement()));
            }
            other => panic!("expected Sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_char_class_fuses_in_choice() {
        let p = parse_peg("'a' / 'b' / [c-d]").expect("compiles");
        match p.root() {
            Expr::CharChoice(set) => {
                assert_eq!(*set, CharSet::from_range(b'a', b'd'));
            }
            other => panic!("expected CharChoice, got {:?}", other),
        }
    }

    #[test]
    fn test_from_str() {
        let p: Peg = "\\d+".parse().expect("compiles");
        assert!(matches!(p.root(), Expr::Sequence(_)));
    }

    #[test]
    #[should_panic(expected = "Error:")]
    fn test_peg_literal_panics_on_bad_source() {
        let _ = peg("S <- ");
    }
}

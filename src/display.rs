//! Canonical PEG text rendering
//!
//! `Display` for [`Peg`] re-renders a compiled grammar as PEG source that
//! compiles back to the same structure: grammars built from rules print as
//! `name <- body` lines (start rule first, rules emptied out by inlining
//! omitted), bare patterns print as a single expression. Every byte that
//! is not printable ASCII is escaped with a three-digit decimal escape so
//! the text survives a round trip through the lexer.

use std::fmt::{self, Write};

use crate::char_class::CharSet;
use crate::grammar::{Expr, Peg};

impl fmt::Display for Peg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start().is_none() {
            return self.write_expr(f, self.root());
        }
        for id in self.reachable_rules() {
            if let Some(nt) = self.rule(id) {
                f.write_str(&nt.name)?;
                f.write_str(" <- ")?;
                self.write_expr(f, &nt.rule)?;
                f.write_char('\n')?;
            }
        }
        Ok(())
    }
}

impl Peg {
    fn write_expr(&self, f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
        match e {
            // An empty terminal and the empty pattern read the same.
            Expr::Empty => f.write_str("''"),
            Expr::Any => f.write_char('.'),
            Expr::AnyRune => f.write_char('_'),
            Expr::NewLine => f.write_str("\\n"),
            Expr::Terminal(t) => write_quoted(f, t),
            Expr::TerminalIgnoreCase(t) => {
                f.write_char('i')?;
                write_quoted(f, t)
            }
            Expr::TerminalIgnoreStyle(t) => {
                f.write_char('y')?;
                write_quoted(f, t)
            }
            Expr::Char(c) => write_quoted(f, &[*c]),
            Expr::CharChoice(set) => write_char_set(f, set),
            Expr::NonTerminal(id) => match self.rule(*id) {
                Some(nt) => f.write_str(&nt.name),
                None => f.write_char('?'),
            },
            Expr::Sequence(items) => {
                f.write_char('(')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_char(' ')?;
                    }
                    self.write_expr(f, item)?;
                }
                f.write_char(')')
            }
            Expr::OrderedChoice(alts) => {
                f.write_char('(')?;
                for (i, alt) in alts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" / ")?;
                    }
                    self.write_expr(f, alt)?;
                }
                f.write_char(')')
            }
            Expr::GreedyRep(a) => {
                self.write_expr(f, a)?;
                f.write_char('*')
            }
            Expr::GreedyRepChar(c) => {
                write_quoted(f, &[*c])?;
                f.write_char('*')
            }
            Expr::GreedyRepSet(set) => {
                write_char_set(f, set)?;
                f.write_char('*')
            }
            Expr::GreedyAny => f.write_str(".*"),
            Expr::Option(a) => {
                self.write_expr(f, a)?;
                f.write_char('?')
            }
            Expr::AndPredicate(a) => {
                f.write_char('&')?;
                self.write_expr(f, a)
            }
            Expr::NotPredicate(a) => {
                f.write_char('!')?;
                self.write_expr(f, a)
            }
            Expr::Capture(a) => {
                f.write_char('{')?;
                self.write_expr(f, a)?;
                f.write_char('}')
            }
            Expr::BackRef(i) => write!(f, "${}", i + 1),
            Expr::BackRefIgnoreCase(i) => write!(f, "i${}", i + 1),
            Expr::BackRefIgnoreStyle(i) => write!(f, "y${}", i + 1),
            Expr::Search(a) => {
                f.write_char('@')?;
                self.write_expr(f, a)
            }
            Expr::Rule(head, body) => {
                self.write_expr(f, head)?;
                f.write_str(" <- ")?;
                self.write_expr(f, body)?;
                f.write_char('\n')
            }
            Expr::List(rules) => {
                for rule in rules {
                    self.write_expr(f, rule)?;
                }
                Ok(())
            }
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_char('\'')?;
    for &b in bytes {
        match b {
            b'\\' => f.write_str("\\\\")?,
            b'\'' => f.write_str("\\'")?,
            b'\t' => f.write_str("\\t")?,
            b'\r' => f.write_str("\\r")?,
            b'\n' => f.write_str("\\l")?,
            0x0C => f.write_str("\\f")?,
            0x1B => f.write_str("\\e")?,
            0x07 => f.write_str("\\a")?,
            0x08 => f.write_str("\\b")?,
            0x0B => f.write_str("\\v")?,
            0x20..=0x7E => f.write_char(b as char)?,
            // Three digits always, so a following digit byte cannot be
            // absorbed into the escape when reparsed.
            _ => write!(f, "\\{:03}", b)?,
        }
    }
    f.write_char('\'')
}

fn write_class_byte(f: &mut fmt::Formatter<'_>, b: u8) -> fmt::Result {
    match b {
        b'\\' | b']' | b'^' | b'-' => {
            f.write_char('\\')?;
            f.write_char(b as char)
        }
        0x20..=0x7E => f.write_char(b as char),
        _ => write!(f, "\\{:03}", b),
    }
}

fn write_char_set(f: &mut fmt::Formatter<'_>, set: &CharSet) -> fmt::Result {
    // Large sets read better negated.
    let negate = set.len() >= 128;
    let shown = if negate { set.complement() } else { *set };
    f.write_char('[')?;
    if negate {
        f.write_char('^')?;
    }
    let mut b = 1u16;
    while b <= 255 {
        if shown.contains(b as u8) {
            let lo = b as u8;
            let mut hi = lo;
            while hi < 255 && shown.contains(hi + 1) {
                hi += 1;
            }
            if hi - lo >= 2 {
                write_class_byte(f, lo)?;
                f.write_char('-')?;
                write_class_byte(f, hi)?;
            } else {
                for one in lo..=hi {
                    write_class_byte(f, one)?;
                }
            }
            b = hi as u16 + 1;
        } else {
            b += 1;
        }
    }
    f.write_char(']')
}

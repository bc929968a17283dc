//! String operations built on the matching engine
//!
//! Everything here is a scan-and-dispatch loop over [`raw_match`]: finding
//! the first match position, testing prefixes and suffixes, replacing
//! matches through a `$n` template, and splitting on separator matches.
//!
//! Operations that fill a caller's [`Captures`] only write it when the
//! overall match succeeds; on failure the caller's previous capture
//! contents stay untouched.

use crate::grammar::Peg;
use crate::matcher::{raw_match, Captures};

impl Peg {
    /// Length of the match at `start`, or `None` if the pattern does not
    /// match there
    pub fn match_len(&self, s: &str, start: usize) -> Option<usize> {
        let mut c = Captures::new();
        raw_match(self, s, start, &mut c)
    }

    /// Like [`match_len`](Self::match_len), filling `caps` on success
    pub fn match_len_with(&self, s: &str, start: usize, caps: &mut Captures) -> Option<usize> {
        let mut scratch = Captures::new();
        let r = raw_match(self, s, start, &mut scratch);
        if r.is_some() {
            *caps = scratch;
        }
        r
    }

    /// Whether the pattern matches the whole remainder of `s` from `start`
    pub fn matches(&self, s: &str, start: usize) -> bool {
        self.match_len(s, start) == Some(s.len() - start)
    }

    /// Like [`matches`](Self::matches), filling `caps` on success
    pub fn matches_with(&self, s: &str, start: usize, caps: &mut Captures) -> bool {
        let mut scratch = Captures::new();
        let ok = raw_match(self, s, start, &mut scratch) == Some(s.len() - start);
        if ok {
            *caps = scratch;
        }
        ok
    }

    /// First index at or after `start` where the pattern matches
    pub fn find(&self, s: &str, start: usize) -> Option<usize> {
        let mut c = Captures::new();
        for i in start..=s.len() {
            c.clear();
            if raw_match(self, s, i, &mut c).is_some() {
                return Some(i);
            }
        }
        None
    }

    /// Like [`find`](Self::find), filling `caps` on success
    pub fn find_with(&self, s: &str, start: usize, caps: &mut Captures) -> Option<usize> {
        let mut scratch = Captures::new();
        for i in start..=s.len() {
            scratch.clear();
            if raw_match(self, s, i, &mut scratch).is_some() {
                *caps = scratch;
                return Some(i);
            }
        }
        None
    }

    /// Half-open byte bounds of the first match at or after `start`
    pub fn find_bounds(&self, s: &str, start: usize) -> Option<(usize, usize)> {
        let mut c = Captures::new();
        for i in start..=s.len() {
            c.clear();
            if let Some(k) = raw_match(self, s, i, &mut c) {
                return Some((i, i + k));
            }
        }
        None
    }

    /// Whether the pattern matches anywhere at or after `start`
    pub fn contains(&self, s: &str, start: usize) -> bool {
        self.find(s, start).is_some()
    }

    /// Whether the pattern matches at the beginning of `s`
    pub fn starts_with(&self, s: &str) -> bool {
        self.match_len(s, 0).is_some()
    }

    /// Whether some match of the pattern ends exactly at the end of `s`
    pub fn ends_with(&self, s: &str) -> bool {
        let mut c = Captures::new();
        for i in 0..=s.len() {
            c.clear();
            if raw_match(self, s, i, &mut c) == Some(s.len() - i) {
                return true;
            }
        }
        false
    }

    /// Replace every non-empty match with the expansion of `by`
    ///
    /// `$1`..`$9` expand to the numbered captures of the current match,
    /// `$#` to the next capture in sequence, and `$$` to a literal dollar.
    /// Positions without a match (or with a zero-length match) are copied
    /// through unchanged, one byte at a time.
    pub fn replace(&self, s: &str, by: &str) -> String {
        let bytes = s.as_bytes();
        let mut out = Vec::with_capacity(s.len());
        let mut c = Captures::new();
        let mut i = 0;
        while i < s.len() {
            c.clear();
            match raw_match(self, s, i, &mut c) {
                Some(k) if k > 0 => {
                    expand_template(by, bytes, &c, &mut out);
                    i += k;
                }
                _ => {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Substrings between non-empty matches of the pattern
    ///
    /// Zero-length separator matches are ignored, and no empty fields are
    /// produced for leading, trailing or adjacent separators.
    pub fn split<'p, 's>(&'p self, s: &'s str) -> Split<'p, 's> {
        Split {
            peg: self,
            s,
            pos: 0,
        }
    }

    /// Non-overlapping matched substrings at or after `start`
    ///
    /// The scan advances by the match length, or by one byte after a
    /// zero-length match or a failure.
    pub fn find_all<'p, 's>(&'p self, s: &'s str, start: usize) -> FindAll<'p, 's> {
        FindAll {
            peg: self,
            s,
            pos: start,
        }
    }
}

/// Replace with the first matching pattern of several
///
/// At every position the `(pattern, template)` pairs are tried in order
/// and the first non-empty match wins; see [`Peg::replace`] for the
/// template syntax.
pub fn parallel_replace(s: &str, subs: &[(Peg, &str)]) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(s.len());
    let mut c = Captures::new();
    let mut i = 0;
    'scan: while i < s.len() {
        for (pat, by) in subs {
            c.clear();
            if let Some(k) = raw_match(pat, s, i, &mut c) {
                if k > 0 {
                    expand_template(by, bytes, &c, &mut out);
                    i += k;
                    continue 'scan;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn push_group(idx: usize, input: &[u8], caps: &Captures, out: &mut Vec<u8>) {
    if let Some((first, end)) = caps.get(idx) {
        if let Some(text) = input.get(first..end) {
            out.extend_from_slice(text);
        }
    }
}

fn expand_template(template: &str, input: &[u8], caps: &Captures, out: &mut Vec<u8>) {
    let t = template.as_bytes();
    let mut i = 0;
    let mut next_seq = 0;
    while i < t.len() {
        if t[i] == b'$' && i + 1 < t.len() {
            match t[i + 1] {
                b'$' => {
                    out.push(b'$');
                    i += 2;
                }
                b'#' => {
                    push_group(next_seq, input, caps, out);
                    next_seq += 1;
                    i += 2;
                }
                b'0'..=b'9' => {
                    let mut n: usize = 0;
                    i += 1;
                    while i < t.len() && t[i].is_ascii_digit() {
                        n = n * 10 + usize::from(t[i] - b'0');
                        i += 1;
                    }
                    if n >= 1 {
                        push_group(n - 1, input, caps, out);
                    }
                }
                _ => {
                    out.push(b'$');
                    i += 1;
                }
            }
        } else {
            out.push(t[i]);
            i += 1;
        }
    }
}

/// Iterator returned by [`Peg::split`]
#[derive(Debug)]
pub struct Split<'p, 's> {
    peg: &'p Peg,
    s: &'s str,
    pos: usize,
}

impl<'p, 's> Iterator for Split<'p, 's> {
    type Item = &'s str;

    fn next(&mut self) -> Option<&'s str> {
        let len = self.s.len();
        let mut c = Captures::new();
        while self.pos < len {
            // Skip separator matches.
            while self.pos < len {
                c.clear();
                match raw_match(self.peg, self.s, self.pos, &mut c) {
                    Some(k) if k > 0 => self.pos += k,
                    _ => break,
                }
            }
            let first = self.pos;
            // Collect up to the next separator.
            while self.pos < len {
                c.clear();
                match raw_match(self.peg, self.s, self.pos, &mut c) {
                    Some(k) if k > 0 => break,
                    _ => self.pos += 1,
                }
            }
            if first < self.pos {
                if let Some(field) = self.s.get(first..self.pos) {
                    return Some(field);
                }
            }
        }
        None
    }
}

/// Iterator returned by [`Peg::find_all`]
#[derive(Debug)]
pub struct FindAll<'p, 's> {
    peg: &'p Peg,
    s: &'s str,
    pos: usize,
}

impl<'p, 's> Iterator for FindAll<'p, 's> {
    type Item = &'s str;

    fn next(&mut self) -> Option<&'s str> {
        let mut c = Captures::new();
        while self.pos <= self.s.len() {
            c.clear();
            match raw_match(self.peg, self.s, self.pos, &mut c) {
                Some(k) => {
                    let start = self.pos;
                    self.pos += k.max(1);
                    if let Some(m) = self.s.get(start..start + k) {
                        return Some(m);
                    }
                }
                None => self.pos += 1,
            }
        }
        None
    }
}

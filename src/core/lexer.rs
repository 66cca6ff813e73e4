//! Purpose: Turn Tyco source text into logical lines and split value lists.
//! Exports: `Line`, `logical_lines`, `split_top_level`, `split_keyword`, `is_identifier`.
//! Role: Quote- and bracket-aware scanning shared by the parser and value decoder.
//! Invariants: `#` starts a comment only outside quotes.
//! Invariants: A logical line keeps absorbing physical lines while `[`/`(` are open.
use crate::core::error::{Error, ErrorKind, Result};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Line {
    /// 1-based number of the first physical line.
    pub number: usize,
    pub indent: usize,
    pub text: String,
}

#[derive(Clone, Copy, Debug, Default)]
struct QuoteState {
    double: bool,
    single: bool,
    escape: bool,
}

impl QuoteState {
    fn in_quotes(&self) -> bool {
        self.double || self.single
    }

    /// Advance over `ch`; returns true when `ch` is structural (outside any quote).
    fn step(&mut self, ch: char) -> bool {
        if self.double {
            if self.escape {
                self.escape = false;
            } else if ch == '\\' {
                self.escape = true;
            } else if ch == '"' {
                self.double = false;
            }
            return false;
        }
        if self.single {
            if ch == '\'' {
                self.single = false;
            }
            return false;
        }
        match ch {
            '"' => {
                self.double = true;
                false
            }
            '\'' => {
                self.single = true;
                false
            }
            _ => true,
        }
    }
}

/// Strip the comment from one physical line and report the bracket depth change.
fn scan_physical(raw: &str, number: usize) -> Result<(String, i64)> {
    let mut state = QuoteState::default();
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0i64;
    for ch in raw.chars() {
        let structural = state.step(ch);
        if structural {
            match ch {
                '#' => break,
                '[' | '(' => depth += 1,
                ']' | ')' => depth -= 1,
                _ => {}
            }
        }
        out.push(ch);
    }
    if state.in_quotes() {
        return Err(Error::new(ErrorKind::Syntax)
            .with_message("unterminated string literal")
            .with_line(number));
    }
    Ok((out.trim_end().to_string(), depth))
}

pub fn logical_lines(source: &str) -> Result<Vec<Line>> {
    let mut lines = Vec::new();
    let mut pending: Option<(Line, i64)> = None;

    for (idx, raw) in source.lines().enumerate() {
        let number = idx + 1;
        let (text, delta) = scan_physical(raw, number)?;

        if let Some((mut line, depth)) = pending.take() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                line.text.push(' ');
                line.text.push_str(trimmed);
            }
            let depth = depth + delta;
            if depth < 0 {
                return Err(unbalanced(number));
            }
            if depth == 0 {
                lines.push(line);
            } else {
                pending = Some((line, depth));
            }
            continue;
        }

        if text.trim().is_empty() {
            continue;
        }
        let indent = text.len() - text.trim_start().len();
        let line = Line {
            number,
            indent,
            text: text.trim().to_string(),
        };
        if delta < 0 {
            return Err(unbalanced(number));
        }
        if delta == 0 {
            lines.push(line);
        } else {
            pending = Some((line, delta));
        }
    }

    if let Some((line, _)) = pending {
        return Err(Error::new(ErrorKind::Syntax)
            .with_message("unclosed bracket")
            .with_line(line.number));
    }
    Ok(lines)
}

fn unbalanced(number: usize) -> Error {
    Error::new(ErrorKind::Syntax)
        .with_message("unexpected closing bracket")
        .with_line(number)
}

/// Split on `delim` at bracket depth zero outside quotes. Pieces are trimmed;
/// one trailing empty piece (trailing delimiter) is dropped.
pub fn split_top_level(text: &str, delim: char) -> Result<Vec<String>> {
    let mut state = QuoteState::default();
    let mut depth = 0usize;
    let mut pieces = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        let structural = state.step(ch);
        if structural {
            match ch {
                '[' | '(' => depth += 1,
                ']' | ')' => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        Error::new(ErrorKind::Syntax).with_message("unexpected closing bracket")
                    })?;
                }
                c if c == delim && depth == 0 => {
                    pieces.push(current.trim().to_string());
                    current.clear();
                    continue;
                }
                _ => {}
            }
        }
        current.push(ch);
    }

    let last = current.trim().to_string();
    if !last.is_empty() {
        pieces.push(last);
    } else if pieces.is_empty() {
        return Ok(pieces);
    }
    if pieces.iter().any(String::is_empty) {
        return Err(Error::new(ErrorKind::Syntax).with_message("empty list element"));
    }
    Ok(pieces)
}

/// Split `name: value` when `name` is an identifier and the colon is structural.
pub fn split_keyword(text: &str) -> Option<(&str, &str)> {
    let mut state = QuoteState::default();
    for (idx, ch) in text.char_indices() {
        if !state.step(ch) {
            continue;
        }
        match ch {
            ':' => {
                let name = text[..idx].trim();
                if is_identifier(name) {
                    return Some((name, text[idx + 1..].trim()));
                }
                return None;
            }
            '[' | '(' => return None,
            _ => {}
        }
    }
    None
}

pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

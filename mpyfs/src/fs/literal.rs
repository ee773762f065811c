//! Python literal rendering and restricted parsing.
//!
//! Every value that crosses the wire inside a command goes through these
//! builders instead of naive string interpolation, so quotes and
//! backslashes in filenames or payload bytes cannot break out of the
//! statement they are embedded in. The parsers are the exact inverses,
//! restricted to the literal shapes the device actually produces.

use crate::error::{Error, Result};

/// Render a Python single-quoted string literal.
pub fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            },
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render a Python bytes literal (`b'...'`).
pub fn py_bytes(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() + 3);
    out.push_str("b'");
    for &b in data {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push('\'');
    out
}

/// Parse a Python bytes literal produced by [`py_bytes`] (or by the
/// device's own `repr`). Anything outside the closed escape set fails.
pub fn parse_py_bytes(literal: &str) -> Result<Vec<u8>> {
    let inner = literal
        .strip_prefix("b'")
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| {
            literal
                .strip_prefix("b\"")
                .and_then(|s| s.strip_suffix('"'))
        })
        .ok_or_else(|| Error::Parse(format!("not a bytes literal: {literal}")))?;

    let mut out = Vec::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            if !c.is_ascii() {
                return Err(Error::Parse(format!("non-ASCII byte in literal: {c}")));
            }
            out.push(c as u8);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push(b'\\'),
            Some('\'') => out.push(b'\''),
            Some('"') => out.push(b'"'),
            Some('t') => out.push(b'\t'),
            Some('n') => out.push(b'\n'),
            Some('r') => out.push(b'\r'),
            Some('x') => {
                let hi = chars.next();
                let lo = chars.next();
                let (Some(hi), Some(lo)) = (hi, lo) else {
                    return Err(Error::Parse("truncated \\x escape".to_string()));
                };
                let value = u8::from_str_radix(&format!("{hi}{lo}"), 16)
                    .map_err(|_| Error::Parse(format!("bad \\x escape: \\x{hi}{lo}")))?;
                out.push(value);
            },
            Some(other) => {
                return Err(Error::Parse(format!("unsupported escape: \\{other}")));
            },
            None => return Err(Error::Parse("trailing backslash".to_string())),
        }
    }
    Ok(out)
}

/// Render one chunk-write statement for an upload batch.
pub fn write_statement(chunk: &[u8]) -> String {
    format!("f({})", py_bytes(chunk))
}

/// Decode a chunk-write statement back to its payload bytes.
pub fn parse_write_statement(statement: &str) -> Result<Vec<u8>> {
    let literal = statement
        .strip_prefix("f(")
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| Error::Parse(format!("not a write statement: {statement}")))?;
    parse_py_bytes(literal)
}

/// Parse a list or tuple of plain string literals, the shape
/// `os.listdir()` prints. Anything else is rejected.
///
/// Walks characters, not bytes, so multi-byte filenames survive intact.
pub fn parse_str_list(text: &str) -> Result<Vec<String>> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .or_else(|| trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')))
        .ok_or_else(|| Error::Parse(format!("not a list literal: {trimmed}")))?;

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&quote) = chars.peek() else { break };
        if quote != '\'' && quote != '"' {
            return Err(Error::Parse(format!("expected string literal in: {inner}")));
        }
        chars.next();

        let mut item = String::new();
        loop {
            let Some(c) = chars.next() else {
                return Err(Error::Parse("unterminated string literal".to_string()));
            };
            if c == quote {
                break;
            }
            if c != '\\' {
                item.push(c);
                continue;
            }
            match chars.next() {
                Some('\\') => item.push('\\'),
                Some('\'') => item.push('\''),
                Some('"') => item.push('"'),
                Some('t') => item.push('\t'),
                Some('n') => item.push('\n'),
                Some('r') => item.push('\r'),
                Some('x') => {
                    let (Some(hi), Some(lo)) = (chars.next(), chars.next()) else {
                        return Err(Error::Parse("truncated \\x escape".to_string()));
                    };
                    let value = u8::from_str_radix(&format!("{hi}{lo}"), 16)
                        .map_err(|_| Error::Parse(format!("bad \\x escape: \\x{hi}{lo}")))?;
                    item.push(value as char);
                },
                Some(other) => {
                    return Err(Error::Parse(format!("unsupported escape: \\{other}")));
                },
                None => return Err(Error::Parse("trailing backslash".to_string())),
            }
        }
        items.push(item);

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            Some(',') => {},
            None => break,
            Some(other) => {
                return Err(Error::Parse(format!("expected ',' before: {other}")));
            },
        }
    }
    Ok(items)
}

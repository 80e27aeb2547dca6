//! Canonical JSON encoding.
//!
//! The bytes produced here are exactly what signatures cover. Signing and
//! verification both call [`canonicalize`], so two logically equal payloads
//! (same members, any insertion order) always produce the same bytes, and no
//! whitespace or ordering choice can give one signature two meanings.
//!
//! Format:
//! - object members sorted by key (code point order), at every level
//! - two-space indentation, `,` + newline between items, `": "` after keys
//! - empty containers are `{}` / `[]`
//! - ASCII-only output: everything outside `0x20..=0x7e` is `\uXXXX`-escaped
//!   (lowercase hex, surrogate pairs above the BMP)
//! - integers in decimal; floats in shortest round-trip form, fixed notation
//!   for decimal exponents in `-4..16` and `d.ddde±XX` otherwise
//! - no trailing newline

use std::fmt::Write as _;

use crate::config::LimitsConfig;
use crate::errors::{MetatrustError, MetatrustResult};
use crate::model::Payload;

const INDENT: &str = "  ";

/// Canonicalize a payload using default limits.
pub fn canonicalize(value: &Payload) -> MetatrustResult<Vec<u8>> {
    canonicalize_with_limits(value, &LimitsConfig::default())
}

/// Canonicalize a payload, enforcing the nesting depth limit.
///
/// The whole value is validated before anything is written, so a failure
/// never yields partial output.
pub fn canonicalize_with_limits(value: &Payload, limits: &LimitsConfig) -> MetatrustResult<Vec<u8>> {
    check_depth(value, 0, limits.max_depth)?;
    value.check()?;

    let mut out = String::new();
    write_value(&mut out, value, 0);
    Ok(out.into_bytes())
}

/// Canonicalize a payload into a `String` (the encoding is pure ASCII).
pub fn canonical_string(value: &Payload) -> MetatrustResult<String> {
    let bytes = canonicalize(value)?;
    String::from_utf8(bytes).map_err(|e| MetatrustError::format(e.to_string()))
}

/// Canonicalize a JSON value.
pub fn canonicalize_json(value: &serde_json::Value) -> MetatrustResult<Vec<u8>> {
    canonicalize(&Payload::try_from(value)?)
}

/// Check the nesting depth limit without encoding anything.
pub fn check_depth_limit(value: &Payload, limits: &LimitsConfig) -> MetatrustResult<()> {
    check_depth(value, 0, limits.max_depth)
}

fn check_depth(value: &Payload, depth: usize, max_depth: usize) -> MetatrustResult<()> {
    if depth > max_depth {
        return Err(MetatrustError::format(format!(
            "payload nesting exceeds maximum depth {max_depth}"
        )));
    }
    match value {
        Payload::List(items) => items
            .iter()
            .try_for_each(|v| check_depth(v, depth + 1, max_depth)),
        Payload::Object(members) => members
            .values()
            .try_for_each(|v| check_depth(v, depth + 1, max_depth)),
        _ => Ok(()),
    }
}

fn newline_indent(out: &mut String, depth: usize) {
    out.push('\n');
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn write_value(out: &mut String, value: &Payload, depth: usize) {
    match value {
        Payload::Null => out.push_str("null"),
        Payload::Bool(true) => out.push_str("true"),
        Payload::Bool(false) => out.push_str("false"),
        Payload::Integer(i) => {
            let _ = write!(out, "{i}");
        }
        Payload::Float(f) => out.push_str(&format_float(*f)),
        Payload::String(s) => write_string(out, s),
        Payload::List(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                newline_indent(out, depth + 1);
                write_value(out, item, depth + 1);
            }
            newline_indent(out, depth);
            out.push(']');
        }
        Payload::Object(members) => {
            if members.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push('{');
            // BTreeMap<String, _> iterates in UTF-8 byte order, which is code point order.
            for (i, (k, v)) in members.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                newline_indent(out, depth + 1);
                write_string(out, k);
                out.push_str(": ");
                write_value(out, v, depth + 1);
            }
            newline_indent(out, depth);
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04x}");
                }
            }
        }
    }
    out.push('"');
}

/// Format a finite float in shortest round-trip form.
///
/// `{:e}` already yields the shortest digits that round-trip; this only
/// re-lays them out.
pub(crate) fn format_float(f: f64) -> String {
    let sci = format!("{f:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let (negative, mantissa) = match mantissa.strip_prefix('-') {
        Some(m) => (true, m),
        None => (false, mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    let mut out = String::new();
    if negative {
        out.push('-');
    }

    if (-4..16).contains(&exp) {
        if exp >= 0 {
            let int_len = exp as usize + 1;
            if digits.len() <= int_len {
                out.push_str(&digits);
                out.extend(std::iter::repeat('0').take(int_len - digits.len()));
                out.push_str(".0");
            } else {
                out.push_str(&digits[..int_len]);
                out.push('.');
                out.push_str(&digits[int_len..]);
            }
        } else {
            out.push_str("0.");
            out.extend(std::iter::repeat('0').take((-exp - 1) as usize));
            out.push_str(&digits);
        }
    } else {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        let sign = if exp < 0 { '-' } else { '+' };
        let _ = write!(out, "e{sign}{:02}", exp.abs());
    }
    out
}

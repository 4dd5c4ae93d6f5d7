//! `key=value,key=value` map strings with backslash escaping.
//!
//! Used on the command line and in the API for constraints, attributes
//! and site options. A `\` escapes the next character, so separators can
//! appear inside keys and values.

use std::collections::BTreeMap;

use crate::error::CoreError;

const ENTRY_SEP: char = ',';
const VALUE_SEP: char = '=';
const ESCAPE: char = '\\';

/// Parse `k1=v1,k2=v2` into a map. Keys and values are trimmed.
///
/// Every entry must carry a value; an empty entry or a dangling escape
/// is an error.
pub fn parse_map(s: &str) -> Result<BTreeMap<String, String>, CoreError> {
    let mut map = BTreeMap::new();
    let invalid = || CoreError::InvalidMap(s.to_string());

    for entry in split_escaped(s, ENTRY_SEP, false).ok_or_else(invalid)? {
        if entry.trim().is_empty() {
            return Err(invalid());
        }

        let (key, value) = split_pair(&entry).ok_or_else(invalid)?;
        map.insert(key.trim().to_string(), value.trim().to_string());
    }

    Ok(map)
}

/// Inverse of [`parse_map`]: separators and escapes are escaped.
pub fn format_map<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    entries
        .into_iter()
        .map(|(k, v)| format!("{}{VALUE_SEP}{}", escape(k), escape(v)))
        .collect::<Vec<_>>()
        .join(&ENTRY_SEP.to_string())
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == ENTRY_SEP || c == VALUE_SEP || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Split on unescaped `sep`. With `unescape` the escape characters are
/// dropped, otherwise they are kept for a later pass. A trailing empty
/// part is not emitted. Returns `None` on a dangling escape.
fn split_escaped(s: &str, sep: char, unescape: bool) -> Option<Vec<String>> {
    let mut parts = Vec::new();
    let mut part = String::new();
    let mut escaped = false;

    for c in s.chars() {
        if c == ESCAPE && !escaped {
            escaped = true;
        } else if c == sep && !escaped {
            parts.push(std::mem::take(&mut part));
        } else {
            if escaped && !unescape {
                part.push(ESCAPE);
            }
            part.push(c);
            escaped = false;
        }
    }

    if escaped {
        return None;
    }
    if !part.is_empty() {
        parts.push(part);
    }
    Some(parts)
}

/// Split an entry at its first unescaped `=`, unescaping both halves.
fn split_pair(entry: &str) -> Option<(String, String)> {
    let mut key = String::new();
    let mut value = String::new();
    let mut escaped = false;
    let mut in_value = false;

    for c in entry.chars() {
        if c == ESCAPE && !escaped {
            escaped = true;
            continue;
        }
        if c == VALUE_SEP && !escaped && !in_value {
            in_value = true;
            continue;
        }
        if in_value {
            value.push(c);
        } else {
            key.push(c);
        }
        escaped = false;
    }

    if escaped || !in_value {
        return None;
    }
    Some((key, value))
}

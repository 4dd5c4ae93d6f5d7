//! Node id expressions.
//!
//! An expression is a comma-separated list of parts:
//! - `*`: every known node
//! - `dn*`: every known node whose id starts with `dn`
//! - `dn1..3`: `dn1`, `dn2`, `dn3` (known or not)
//! - `nn`: a literal id

use std::collections::HashSet;

use crate::error::CoreError;

/// Upper bound on the ids a single expression may name.
pub const MAX_IDS: u64 = 10_000;

/// Expand `expr` against the ids currently known. Duplicates are dropped,
/// first occurrence wins. Expressions naming more than [`MAX_IDS`] ids are
/// rejected.
pub fn expand(expr: &str, known: &[String]) -> Result<Vec<String>, CoreError> {
    let invalid = || CoreError::InvalidExpr(expr.to_string());
    let mut ids: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for part in expr.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(invalid());
        }

        let expanded: Vec<String> = if let Some(prefix) = part.strip_suffix('*') {
            known
                .iter()
                .filter(|id| id.starts_with(prefix))
                .cloned()
                .collect()
        } else if let Some((from, to)) = part.split_once("..") {
            expand_range(from, to).ok_or_else(invalid)?
        } else {
            vec![part.to_string()]
        };

        for id in expanded {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        if ids.len() as u64 > MAX_IDS {
            return Err(invalid());
        }
    }

    Ok(ids)
}

fn expand_range(from: &str, to: &str) -> Option<Vec<String>> {
    let digits_at = from.find(|c: char| c.is_ascii_digit())?;
    let (prefix, start) = from.split_at(digits_at);
    let end = to.strip_prefix(prefix).unwrap_or(to);

    if !start.bytes().all(|b| b.is_ascii_digit()) || !end.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let start: u64 = start.parse().ok()?;
    let end: u64 = end.parse().ok()?;
    if start > end || end - start >= MAX_IDS {
        return None;
    }

    Some((start..=end).map(|n| format!("{prefix}{n}")).collect())
}

//! Placement constraints on offer attributes.
//!
//! - `like:<regex>` / `unlike:<regex>`: the attribute must (not) fully match
//! - `unique`: no sibling node may share the value
//! - `cluster` / `cluster:<value>`: all nodes share one value (the first
//!   sibling's, or the given one)
//! - `groupBy` / `groupBy:<n>`: spread nodes evenly across `n` values

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

#[derive(Debug, Clone)]
pub enum Constraint {
    Like(Pattern),
    Unlike(Pattern),
    Unique,
    Cluster(Option<String>),
    GroupBy(usize),
}

/// A regex anchored at both ends, keeping its source for display.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, CoreError> {
        let regex = Regex::new(&format!("^(?:{source})$"))
            .map_err(|e| CoreError::InvalidConstraint(format!("{source}: {e}")))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl Constraint {
    /// Whether `value` (the offer's attribute) is acceptable given the
    /// `values` already observed on sibling nodes.
    pub fn matches(&self, value: &str, values: &[String]) -> bool {
        match self {
            Constraint::Like(p) => p.is_match(value),
            Constraint::Unlike(p) => !p.is_match(value),
            Constraint::Unique => !values.iter().any(|v| v == value),
            Constraint::Cluster(Some(expected)) => value == expected,
            Constraint::Cluster(None) => values.first().is_none_or(|first| first == value),
            Constraint::GroupBy(groups) => {
                let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                for v in values {
                    *counts.entry(v.as_str()).or_default() += 1;
                }

                if counts.len() < *groups {
                    return !counts.contains_key(value);
                }

                let min = counts.values().copied().min().unwrap_or(0);
                counts.get(value).copied().unwrap_or(0) == min
            }
        }
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Like(p) => write!(f, "like:{}", p.source),
            Constraint::Unlike(p) => write!(f, "unlike:{}", p.source),
            Constraint::Unique => write!(f, "unique"),
            Constraint::Cluster(None) => write!(f, "cluster"),
            Constraint::Cluster(Some(v)) => write!(f, "cluster:{v}"),
            Constraint::GroupBy(1) => write!(f, "groupBy"),
            Constraint::GroupBy(n) => write!(f, "groupBy:{n}"),
        }
    }
}

impl FromStr for Constraint {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, arg) = match s.split_once(':') {
            Some((kind, arg)) => (kind, Some(arg)),
            None => (s, None),
        };

        match (kind, arg) {
            ("like", Some(p)) => Ok(Constraint::Like(Pattern::new(p)?)),
            ("unlike", Some(p)) => Ok(Constraint::Unlike(Pattern::new(p)?)),
            ("unique", None) => Ok(Constraint::Unique),
            ("cluster", v) => Ok(Constraint::Cluster(v.map(str::to_string))),
            ("groupBy", None) => Ok(Constraint::GroupBy(1)),
            ("groupBy", Some(n)) => match n.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Constraint::GroupBy(n)),
                _ => Err(CoreError::InvalidConstraint(s.to_string())),
            },
            _ => Err(CoreError::InvalidConstraint(s.to_string())),
        }
    }
}

impl Serialize for Constraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Constraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a constraint map such as `rack=like:1-.*,hostname=unique`.
pub fn parse_constraints(s: &str) -> Result<BTreeMap<String, Constraint>, CoreError> {
    crate::strings::parse_map(s)?
        .into_iter()
        .map(|(name, expr)| Ok((name, expr.parse()?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> Constraint {
        s.parse().unwrap()
    }

    fn vals(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn parse_and_display() {
        for s in [
            "like:1-.*",
            "unlike:slave\\d",
            "unique",
            "cluster",
            "cluster:us-east",
            "groupBy",
            "groupBy:3",
        ] {
            assert_eq!(c(s).to_string(), s);
        }

        for s in ["", "like", "unique:1", "groupBy:0", "groupBy:x", "near:1", "like:("] {
            assert!(s.parse::<Constraint>().is_err(), "{s:?}");
        }
    }

    #[test]
    fn like_is_anchored() {
        let like = c("like:1-.*");
        assert!(like.matches("1-a", &[]));
        assert!(!like.matches("01-a", &[]));

        let unlike = c("unlike:1");
        assert!(unlike.matches("11", &[]));
        assert!(!unlike.matches("1", &[]));
    }

    #[test]
    fn unique() {
        let unique = c("unique");
        assert!(unique.matches("a", &[]));
        assert!(unique.matches("a", &vals(&["b"])));
        assert!(!unique.matches("a", &vals(&["b", "a"])));
    }

    #[test]
    fn cluster() {
        let any = c("cluster");
        assert!(any.matches("a", &[]));
        assert!(any.matches("a", &vals(&["a", "a"])));
        assert!(!any.matches("b", &vals(&["a"])));

        let fixed = c("cluster:a");
        assert!(fixed.matches("a", &[]));
        assert!(!fixed.matches("b", &[]));
    }

    #[test]
    fn group_by() {
        let one = c("groupBy");
        assert!(one.matches("1", &[]));
        assert!(one.matches("1", &vals(&["1"])));
        assert!(!one.matches("2", &vals(&["1"])));

        let two = c("groupBy:2");
        assert!(two.matches("1", &[]));
        assert!(!two.matches("1", &vals(&["1"])));
        assert!(two.matches("2", &vals(&["1"])));
        assert!(two.matches("1", &vals(&["1", "2"])));
        assert!(!two.matches("1", &vals(&["1", "2", "1"])));
        assert!(two.matches("2", &vals(&["1", "2", "1"])));
    }

    #[test]
    fn constraint_map() {
        let map = parse_constraints("rack=like:1-.*,hostname=unique").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["rack"], c("like:1-.*"));
        assert_eq!(map["hostname"], Constraint::Unique);
        assert!(parse_constraints("rack=near").is_err());
    }
}

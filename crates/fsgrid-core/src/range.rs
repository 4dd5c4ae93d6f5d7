//! Closed integer ranges, used for port allocation.
//!
//! A `Range` is written `start..end` (inclusive on both ends) or as a
//! single point `p`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Inclusive integer interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    start: u32,
    end: u32,
}

impl Range {
    /// Create a range. Fails if `start > end`.
    pub fn new(start: u32, end: u32) -> Result<Self, CoreError> {
        if start > end {
            return Err(CoreError::InvalidRange(format!("{start}..{end}: start > end")));
        }
        Ok(Self { start, end })
    }

    /// Single-point range `[p, p]`.
    pub fn point(p: u32) -> Self {
        Self { start: p, end: p }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    /// Number of points covered.
    pub fn len(&self) -> u64 {
        u64::from(self.end - self.start) + 1
    }

    /// A well-formed range always covers at least one point.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Intersection of two ranges, if any. Symmetric.
    pub fn overlap(&self, other: &Range) -> Option<Range> {
        let (x, y) = if self.start <= other.start {
            (self, other)
        } else {
            (other, self)
        };

        if y.start > x.end {
            return None;
        }

        Some(Range {
            start: y.start,
            end: x.end.min(y.end),
        })
    }

    pub fn contains(&self, p: u32) -> bool {
        self.start <= p && p <= self.end
    }

    /// Remove `p` from the range.
    ///
    /// Returns the remaining sub-ranges: none when the range is exactly
    /// `{p}`, one when `p` is an endpoint, two when `p` is interior.
    pub fn split(&self, p: u32) -> Result<Vec<Range>, CoreError> {
        if !self.contains(p) {
            return Err(CoreError::InvalidRange(format!("{p} not in {self}")));
        }

        let mut parts = Vec::with_capacity(2);
        if self.start < p {
            parts.push(Range {
                start: self.start,
                end: p - 1,
            });
        }
        if p < self.end {
            parts.push(Range {
                start: p + 1,
                end: self.end,
            });
        }
        Ok(parts)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

impl FromStr for Range {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| CoreError::InvalidRange(s.to_string()))
        };

        match s.split_once("..") {
            Some((start, end)) => Range::new(parse(start)?, parse(end)?),
            None => Ok(Range::point(parse(s)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(s: &str) -> Range {
        s.parse().unwrap()
    }

    #[test]
    fn parse_and_display() {
        assert_eq!(r("0..10"), Range::new(0, 10).unwrap());
        assert_eq!(r("5"), Range::point(5));
        assert_eq!(r(" 31000..31005 ").to_string(), "31000..31005");
        assert_eq!(r("7").to_string(), "7");
        assert!("10..0".parse::<Range>().is_err());
        assert!("a..b".parse::<Range>().is_err());
        assert!("".parse::<Range>().is_err());
    }

    #[test]
    fn overlap_is_symmetric() {
        let cases = [
            ("0..10", "5..15", Some("5..10")),
            ("0..10", "10..20", Some("10")),
            ("0..10", "11..20", None),
            ("0..100", "10..20", Some("10..20")),
            ("3", "3", Some("3")),
        ];

        for (a, b, expected) in cases {
            let expected = expected.map(r);
            assert_eq!(r(a).overlap(&r(b)), expected, "{a} & {b}");
            assert_eq!(r(b).overlap(&r(a)), expected, "{b} & {a}");
        }
    }

    #[test]
    fn contains_is_inclusive() {
        let range = r("10..20");
        assert!(range.contains(10));
        assert!(range.contains(20));
        assert!(!range.contains(9));
        assert!(!range.contains(21));
    }

    #[test]
    fn split_point_range() {
        assert!(r("5").split(5).unwrap().is_empty());
    }

    #[test]
    fn split_at_endpoints() {
        assert_eq!(r("0..10").split(0).unwrap(), vec![r("1..10")]);
        assert_eq!(r("0..10").split(10).unwrap(), vec![r("0..9")]);
    }

    #[test]
    fn split_interior() {
        assert_eq!(r("0..100").split(10).unwrap(), vec![r("0..9"), r("11..100")]);
    }

    #[test]
    fn split_outside_is_error() {
        assert!(r("0..10").split(11).is_err());
    }

    #[test]
    fn split_partitions_the_range() {
        let range = r("3..9");
        for p in 3..=9 {
            let parts = range.split(p).unwrap();
            let mut points: Vec<u32> = parts
                .iter()
                .flat_map(|part| part.start()..=part.end())
                .collect();
            points.push(p);
            points.sort_unstable();
            assert_eq!(points, (3..=9).collect::<Vec<_>>());
            assert!(parts.iter().all(|part| part.start() <= part.end()));
        }
    }
}

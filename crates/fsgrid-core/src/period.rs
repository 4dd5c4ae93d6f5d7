//! Human-readable durations: `100ms`, `30s`, `2m`, `1h`, `30d`, `0`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Ms,
    S,
    M,
    H,
    D,
}

impl TimeUnit {
    fn ms(self) -> u64 {
        match self {
            TimeUnit::Ms => 1,
            TimeUnit::S => 1_000,
            TimeUnit::M => 60 * 1_000,
            TimeUnit::H => 60 * 60 * 1_000,
            TimeUnit::D => 24 * 60 * 60 * 1_000,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Ms => "ms",
            TimeUnit::S => "s",
            TimeUnit::M => "m",
            TimeUnit::H => "h",
            TimeUnit::D => "d",
        }
    }
}

/// A duration that remembers the unit it was written in, so it can be
/// printed back the way the operator typed it.
#[derive(Debug, Clone, Copy)]
pub struct Period {
    value: u64,
    unit: TimeUnit,
}

impl Period {
    pub const fn new(value: u64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    pub const fn zero() -> Self {
        Self::new(0, TimeUnit::Ms)
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn ms(&self) -> u64 {
        self.value.saturating_mul(self.unit.ms())
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.ms())
    }
}

impl PartialEq for Period {
    fn eq(&self, other: &Self) -> bool {
        self.ms() == other.ms()
    }
}

impl Eq for Period {}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

impl FromStr for Period {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "0" {
            return Ok(Period::zero());
        }

        let invalid = || CoreError::InvalidPeriod(s.to_string());
        let split = s.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        let (digits, suffix) = s.split_at(split);

        let value: u64 = digits.parse().map_err(|_| invalid())?;
        let unit = match suffix {
            "ms" => TimeUnit::Ms,
            "s" => TimeUnit::S,
            "m" => TimeUnit::M,
            "h" => TimeUnit::H,
            "d" => TimeUnit::D,
            _ => return Err(invalid()),
        };

        Ok(Period::new(value, unit))
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

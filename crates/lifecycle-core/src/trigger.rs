//! Elapsed-duration triggers for time-driven rules.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use serde_json::Value;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Longest accepted trigger: 100 years of days.
pub const MAX_TRIGGER_SECS: u64 = 36_500 * SECONDS_PER_DAY;

/// Error returned when a trigger value cannot be normalized to seconds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("trigger must be a positive number of days (at most 36500) or a string like \"90d\", \"10m\", \"45s\"")]
pub struct InvalidTrigger;

/// Elapsed time, in seconds, after which a time-triggered rule fires.
///
/// Always strictly positive and at most [`MAX_TRIGGER_SECS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Trigger(u64);

impl Trigger {
    /// Build a trigger from seconds. Zero and anything above [`MAX_TRIGGER_SECS`] is rejected.
    pub fn from_secs(secs: u64) -> Result<Self, InvalidTrigger> {
        if secs == 0 || secs > MAX_TRIGGER_SECS {
            return Err(InvalidTrigger);
        }
        Ok(Self(secs))
    }

    /// Build a trigger from a whole number of days.
    pub fn from_days(days: u64) -> Result<Self, InvalidTrigger> {
        days.checked_mul(SECONDS_PER_DAY)
            .ok_or(InvalidTrigger)
            .and_then(Self::from_secs)
    }

    /// Duration in seconds.
    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Duration as a chrono span, saturating on overflow.
    pub fn as_duration(&self) -> chrono::Duration {
        i64::try_from(self.0)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Normalize a document value: bare positive integers are days, strings carry a unit suffix.
    pub fn parse_value(value: &Value) -> Result<Self, InvalidTrigger> {
        match value {
            Value::Number(n) => n.as_u64().ok_or(InvalidTrigger).and_then(Self::from_days),
            Value::String(s) => s.parse(),
            _ => Err(InvalidTrigger),
        }
    }
}

impl FromStr for Trigger {
    type Err = InvalidTrigger;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let unit = s.chars().last().ok_or(InvalidTrigger)?;
        let multiplier = match unit {
            'd' => SECONDS_PER_DAY,
            'm' => SECONDS_PER_MINUTE,
            's' => 1,
            _ => return Err(InvalidTrigger),
        };
        let digits = &s[..s.len() - unit.len_utf8()];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidTrigger);
        }
        let n: u64 = digits.parse().map_err(|_| InvalidTrigger)?;
        n.checked_mul(multiplier)
            .ok_or(InvalidTrigger)
            .and_then(Self::from_secs)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % SECONDS_PER_DAY == 0 {
            write!(f, "{}d", self.0 / SECONDS_PER_DAY)
        } else if self.0 % SECONDS_PER_MINUTE == 0 {
            write!(f, "{}m", self.0 / SECONDS_PER_MINUTE)
        } else {
            write!(f, "{}s", self.0)
        }
    }
}

impl Serialize for Trigger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

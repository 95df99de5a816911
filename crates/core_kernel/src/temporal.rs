//! Date handling for billing
//!
//! Services, authorizations and claims are all dated by calendar day, so the
//! kernel works in `NaiveDate` and only resolves "today" through the billing
//! timezone configured for the practice.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::CoreError;

/// Timezone wrapper for the billing jurisdiction
///
/// Wraps chrono_tz::Tz with custom serialization support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for Timezone {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tz::from_str(s.trim())
            .map(Timezone)
            .map_err(|_| CoreError::configuration(format!("unknown timezone '{}'", s)))
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Returns the calendar date of `instant` in this timezone
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.0).date_naive()
    }

    /// Returns today's calendar date in this timezone
    pub fn today(&self) -> NaiveDate {
        self.date_of(Utc::now())
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::UTC)
    }
}

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange {
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Date range cannot be built from an empty set of dates")]
    Empty,
}

/// An inclusive range of calendar days
///
/// Used for authorization validity windows and claim service periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// First day of the range (inclusive)
    pub start: NaiveDate,
    /// Last day of the range (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a new range, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TemporalError> {
        if start > end {
            return Err(TemporalError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// A range covering a single day
    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    /// Smallest range covering every date yielded by `dates`
    pub fn spanning<I>(dates: I) -> Result<Self, TemporalError>
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let mut iter = dates.into_iter();
        let first = iter.next().ok_or(TemporalError::Empty)?;
        Ok(iter.fold(Self::single(first), |range, d| Self {
            start: range.start.min(d),
            end: range.end.max(d),
        }))
    }

    /// Returns true if `day` falls inside the range, ends included
    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    /// Number of calendar days covered, ends included
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Whole days elapsed from `from` to `to` (negative if `to` is earlier)
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_range_is_inclusive() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 31)).unwrap();
        assert!(range.contains(d(2024, 1, 1)));
        assert!(range.contains(d(2024, 1, 31)));
        assert!(!range.contains(d(2024, 2, 1)));
        assert_eq!(range.days(), 31);
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(matches!(
            DateRange::new(d(2024, 2, 1), d(2024, 1, 1)),
            Err(TemporalError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_spanning() {
        let range = DateRange::spanning([d(2024, 3, 5), d(2024, 3, 1), d(2024, 3, 9)]).unwrap();
        assert_eq!(range, DateRange::new(d(2024, 3, 1), d(2024, 3, 9)).unwrap());
        assert_eq!(DateRange::spanning(Vec::new()), Err(TemporalError::Empty));
    }

    #[test]
    fn test_timezone_serde() {
        let tz = Timezone::new(chrono_tz::America::Chicago);
        let json = serde_json::to_string(&tz).unwrap();
        assert_eq!(json, "\"America/Chicago\"");
        let back: Timezone = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tz);
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between(d(2024, 1, 1), d(2024, 12, 31)), 365);
        assert_eq!(days_between(d(2024, 1, 2), d(2024, 1, 1)), -1);
    }
}

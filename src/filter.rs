//! Value-range and time-window filtering over the record buffer

use crate::record::Record;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Relative time window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRange {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "24h")]
    LastDay,
    #[serde(rename = "7d")]
    LastWeek,
}

impl TimeRange {
    pub fn window(self) -> Option<Duration> {
        match self {
            TimeRange::All => None,
            TimeRange::LastHour => Some(Duration::hours(1)),
            TimeRange::LastDay => Some(Duration::hours(24)),
            TimeRange::LastWeek => Some(Duration::days(7)),
        }
    }

    /// Next option in the selector
    pub fn cycle(self) -> Self {
        match self {
            TimeRange::All => TimeRange::LastHour,
            TimeRange::LastHour => TimeRange::LastDay,
            TimeRange::LastDay => TimeRange::LastWeek,
            TimeRange::LastWeek => TimeRange::All,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::All => "all",
            TimeRange::LastHour => "1h",
            TimeRange::LastDay => "24h",
            TimeRange::LastWeek => "7d",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" | "" => Ok(TimeRange::All),
            "1h" => Ok(TimeRange::LastHour),
            "24h" => Ok(TimeRange::LastDay),
            "7d" => Ok(TimeRange::LastWeek),
            other => Err(format!("unknown time range '{}' (all, 1h, 24h, 7d)", other)),
        }
    }
}

/// Raw filter inputs as the user typed them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterInputs {
    pub min_value: String,
    pub max_value: String,
    pub time_range: TimeRange,
}

impl FilterInputs {
    /// Any input away from its default means the view must be filtered
    pub fn is_active(&self) -> bool {
        !self.min_value.trim().is_empty()
            || !self.max_value.trim().is_empty()
            || self.time_range != TimeRange::All
    }

    pub fn parse(&self) -> Filter {
        Filter {
            min_value: parse_bound(&self.min_value).unwrap_or(0.0),
            max_value: parse_bound(&self.max_value).unwrap_or(f64::INFINITY),
            time_range: self.time_range,
        }
    }
}

fn parse_bound(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Parsed predicate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Filter {
    pub min_value: f64,
    pub max_value: f64,
    pub time_range: TimeRange,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            min_value: 0.0,
            max_value: f64::INFINITY,
            time_range: TimeRange::All,
        }
    }
}

impl Filter {
    pub fn new(min_value: f64, max_value: f64, time_range: TimeRange) -> Self {
        Self {
            min_value,
            max_value,
            time_range,
        }
    }

    pub fn matches(&self, record: &Record, now: DateTime<Utc>) -> bool {
        let in_range =
            record.numeric_value >= self.min_value && record.numeric_value <= self.max_value;
        if !in_range {
            return false;
        }
        match self.time_range.window() {
            None => true,
            Some(window) => record.created_at > now - window,
        }
    }

    /// Keep buffer order; `min > max` simply yields nothing.
    pub fn apply(&self, records: &[Record], now: DateTime<Utc>) -> Vec<Record> {
        records
            .iter()
            .filter(|r| self.matches(r, now))
            .cloned()
            .collect()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.max_value.is_infinite() {
            write!(f, "≥ {:.2} │ {}", self.min_value, self.time_range)
        } else {
            write!(
                f,
                "{:.2} – {:.2} │ {}",
                self.min_value, self.max_value, self.time_range
            )
        }
    }
}

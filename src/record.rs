//! Crash outcome records as delivered by the record store

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Store-assigned identifier. Supabase hands out integers, Firebase push keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{}", n),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Text(s.to_string())
    }
}

/// One crash game outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredRecord")]
pub struct Record {
    /// Missing on Firebase children; filled from the child key
    pub id: Option<RecordId>,
    /// Display time, kept exactly as stored
    pub timestamp: String,
    /// Ordering and time-window key
    pub created_at: DateTime<Utc>,
    pub crash_value: String,
    pub numeric_value: f64,
    pub url: String,
    /// `created_at` exactly as the store sent it
    #[serde(skip_serializing)]
    pub created_at_text: String,
    /// `numeric_value` exactly as the store sent it
    #[serde(skip_serializing)]
    pub numeric_value_text: String,
}

/// Row shape on the wire, before timestamps and values are parsed
#[derive(Debug, Deserialize)]
struct StoredRecord {
    #[serde(default)]
    id: Option<RecordId>,
    #[serde(default, deserialize_with = "string_or_number")]
    timestamp: String,
    #[serde(deserialize_with = "string_or_number")]
    created_at: String,
    #[serde(default, deserialize_with = "string_or_number")]
    crash_value: String,
    #[serde(deserialize_with = "string_or_number")]
    numeric_value: String,
    #[serde(default, deserialize_with = "string_or_number")]
    url: String,
}

impl TryFrom<StoredRecord> for Record {
    type Error = String;

    fn try_from(row: StoredRecord) -> Result<Self, Self::Error> {
        let created_at = parse_timestamp(&row.created_at)
            .ok_or_else(|| format!("created_at not a timestamp: {:?}", row.created_at))?;
        let numeric_value = parse_numeric(&row.numeric_value)
            .ok_or_else(|| format!("numeric_value not a number: {:?}", row.numeric_value))?;

        Ok(Record {
            id: row.id,
            timestamp: row.timestamp,
            created_at,
            crash_value: row.crash_value,
            numeric_value,
            url: row.url,
            created_at_text: row.created_at,
            numeric_value_text: row.numeric_value,
        })
    }
}

/// Severity tier used for row styling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Low,
    High,
    VeryHigh,
}

impl Severity {
    pub fn classify(value: f64) -> Self {
        if value >= 5.0 {
            Severity::VeryHigh
        } else if value >= 2.0 {
            Severity::High
        } else {
            Severity::Low
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::High => "High",
            Severity::VeryHigh => "Very High",
        }
    }
}

impl Record {
    /// Identity used for duplicate suppression
    pub fn key(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    pub fn severity(&self) -> Severity {
        Severity::classify(self.numeric_value)
    }

    /// Attach the store key when the payload carried no id of its own
    pub fn with_fallback_id(mut self, id: impl Into<String>) -> Self {
        if self.id.is_none() {
            self.id = Some(RecordId::Text(id.into()));
        }
        self
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// `3.47`, `"3.47"` or `"3.47x"`
fn parse_numeric(raw: &str) -> Option<f64> {
    raw.trim()
        .trim_end_matches(['x', 'X'])
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// A date string, or epoch milliseconds as Firebase writes them.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    parse_datetime(raw).or_else(|| {
        raw.trim()
            .parse::<i64>()
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    })
}

/// Parse the timestamp shapes the stores emit: RFC 3339, or Postgres
/// `timestamp` without zone (taken as UTC).
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Backend primary key; integer in some deployments, text in others.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{id}"),
            RecordId::Text(id) => f.write_str(id),
        }
    }
}

impl From<&str> for RecordId {
    /// Numeric text becomes `Int`, anything else stays `Text`.
    fn from(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(id) => RecordId::Int(id),
            Err(_) => RecordId::Text(raw.to_string()),
        }
    }
}

/// One saved detection session as returned by `GET /history`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub id: RecordId,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub captured_at: DateTime<Utc>,
    pub blink_count: u32,
    pub stare_duration_sec: f64,
    #[serde(default)]
    pub blink_per_minute: Option<f64>,
    #[serde(default)]
    pub warning_triggered: bool,
    #[serde(default)]
    pub note: Option<String>,
}

impl HistoryRecord {
    /// Blinks per minute: the stored value when present, otherwise derived
    /// from the count and duration.
    pub fn rate(&self) -> f64 {
        self.blink_per_minute
            .unwrap_or_else(|| blinks_per_minute(self.blink_count as f64, self.stare_duration_sec))
    }
}

/// Filter for `GET /history`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    pub limit: u32,
}

/// `count / seconds * 60`, and 0 for a zero (or negative) duration.
pub fn blinks_per_minute(count: f64, duration_secs: f64) -> f64 {
    if duration_secs <= 0.0 {
        return 0.0;
    }
    count / duration_secs * 60.0
}

/// Accepts RFC 3339 with an offset, or a naive ISO timestamp taken as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|err| format!("invalid timestamp '{raw}': {err}"))
}

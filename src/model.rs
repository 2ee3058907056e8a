/// Store monitoring data model
///
/// Status observations, weekly business rules and per-store timezones as the
/// ingestion side hands them over, plus the per-store metrics record the
/// engine produces.

use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Observed store state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Inactive,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Inactive => "inactive",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Status::Active),
            "inactive" => Ok(Status::Inactive),
            _ => Err(ValidationError::UnknownStatus(s.to_string())),
        }
    }
}

/// A single (timestamp, status) sample for one store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPoint {
    pub timestamp: DateTime<Utc>,
    pub status: Status,
}

impl StatusPoint {
    pub fn new(timestamp: DateTime<Utc>, status: Status) -> Self {
        Self { timestamp, status }
    }
}

/// A status sample tagged with its store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub store_id: String,
    pub point: StatusPoint,
}

/// One weekly business-hours rule in store-local time.
///
/// `end <= start` means the shift crosses midnight into the next day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusinessRule {
    weekday: u32,
    start: NaiveTime,
    end: NaiveTime,
}

impl BusinessRule {
    /// Build a rule for `weekday` (0=Monday .. 6=Sunday)
    pub fn new(weekday: u32, start: NaiveTime, end: NaiveTime) -> Result<Self, ValidationError> {
        if weekday > 6 {
            return Err(ValidationError::WeekdayOutOfRange(weekday));
        }
        Ok(Self { weekday, start, end })
    }

    /// The implicit rule for a store with no configured hours: open all day
    pub fn all_day(weekday: u32) -> Self {
        Self {
            weekday: weekday % 7,
            start: NaiveTime::MIN,
            end: NaiveTime::MIN,
        }
    }

    pub fn weekday(&self) -> u32 {
        self.weekday
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn crosses_midnight(&self) -> bool {
        self.end <= self.start
    }
}

/// Per-store IANA timezone name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneAssignment {
    pub store_id: String,
    pub timezone: String,
}

/// Uptime/downtime for one store over the three trailing windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub store_id: String,
    pub uptime_last_hour_minutes: f64,
    pub uptime_last_day_hours: f64,
    pub uptime_last_week_hours: f64,
    pub downtime_last_hour_minutes: f64,
    pub downtime_last_day_hours: f64,
    pub downtime_last_week_hours: f64,
}

impl MetricsRecord {
    pub fn zeroed(store_id: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            uptime_last_hour_minutes: 0.0,
            uptime_last_day_hours: 0.0,
            uptime_last_week_hours: 0.0,
            downtime_last_hour_minutes: 0.0,
            downtime_last_day_hours: 0.0,
            downtime_last_week_hours: 0.0,
        }
    }
}

/// Parse an absolute timestamp.
///
/// Accepts RFC 3339, or `YYYY-MM-DD HH:MM:SS[.f]` with an optional trailing
/// ` UTC`, which is taken as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ValidationError> {
    let trimmed = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return check_timestamp_range(dt.with_timezone(&Utc))
            .map_err(|_| ValidationError::InvalidTimestamp(s.to_string()));
    }

    let naive = trimmed.strip_suffix("UTC").unwrap_or(trimmed).trim_end();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|dt| dt.and_utc())
        .filter(|dt| check_timestamp_range(*dt).is_ok())
        .ok_or_else(|| ValidationError::InvalidTimestamp(s.to_string()))
}

/// Reject instants outside years 1..=9999, where window and calendar
/// arithmetic could run off the end of chrono's range
pub fn check_timestamp_range(t: DateTime<Utc>) -> Result<DateTime<Utc>, ValidationError> {
    if (1..=9999).contains(&t.year()) {
        Ok(t)
    } else {
        Err(ValidationError::TimestampOutOfRange(t))
    }
}

/// Parse a local time-of-day as `HH:MM:SS` or `HH:MM`
pub fn parse_local_time(s: &str) -> Result<NaiveTime, ValidationError> {
    let trimmed = s.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| ValidationError::InvalidLocalTime(s.to_string()))
}

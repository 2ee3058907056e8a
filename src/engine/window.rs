/// Trailing analysis windows
///
/// All windows end at a reference instant taken from the data, not the wall
/// clock, so replaying a static dataset always gives the same report.

use chrono::{DateTime, Duration, Utc};

use super::interval::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    LastHour,
    LastDay,
    LastWeek,
}

impl WindowKind {
    pub const ALL: [WindowKind; 3] = [WindowKind::LastHour, WindowKind::LastDay, WindowKind::LastWeek];

    pub fn span(&self) -> Duration {
        match self {
            WindowKind::LastHour => Duration::hours(1),
            WindowKind::LastDay => Duration::days(1),
            WindowKind::LastWeek => Duration::days(7),
        }
    }

    /// Seconds per reporting unit: minutes for the hour window, hours otherwise
    pub fn unit_seconds(&self) -> f64 {
        match self {
            WindowKind::LastHour => 60.0,
            WindowKind::LastDay | WindowKind::LastWeek => 3600.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WindowKind::LastHour => "last_hour",
            WindowKind::LastDay => "last_day",
            WindowKind::LastWeek => "last_week",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub kind: WindowKind,
    pub interval: Interval,
}

/// The three trailing windows ending at `now`
pub fn plan_windows(now: DateTime<Utc>) -> [Window; 3] {
    WindowKind::ALL.map(|kind| Window {
        kind,
        interval: Interval::ending_at(now, kind.span()),
    })
}

/// Pick the reference instant: an explicit override, else the latest
/// observation, else the current wall-clock time.
pub fn reference_time(
    override_now: Option<DateTime<Utc>>,
    latest_observation: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    override_now.or(latest_observation).unwrap_or_else(Utc::now)
}

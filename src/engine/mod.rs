//! Uptime/downtime estimation engine
//!
//! Pure, synchronous computation over data already in memory: rebuild a
//! store's status timeline, resolve its business calendar, intersect the two
//! and sum per trailing window.

pub mod aggregate;
pub mod calendar;
pub mod interval;
pub mod timeline;
pub mod window;

pub use aggregate::{sum_overlap, Tally};
pub use calendar::{local_to_utc, resolve_timezone, Calendar, DEFAULT_TIMEZONE};
pub use interval::Interval;
pub use timeline::{Segment, Timeline, DEFAULT_STATUS};
pub use window::{plan_windows, reference_time, Window, WindowKind};

use chrono::{DateTime, Utc};

use crate::model::MetricsRecord;

/// Business-hours active/inactive time for one store in one window
pub fn window_tally(timeline: &Timeline, calendar: &Calendar, window: &Interval) -> Tally {
    let segments = timeline.segments(window);
    let business = calendar.business_intervals(window);
    sum_overlap(&segments, &business)
}

/// Metrics for one store over all three windows ending at `now`
pub fn store_metrics(
    store_id: &str,
    timeline: &Timeline,
    calendar: &Calendar,
    now: DateTime<Utc>,
) -> MetricsRecord {
    plan_windows(now)
        .iter()
        .fold(MetricsRecord::zeroed(store_id), |mut record, window| {
            let tally = window_tally(timeline, calendar, &window.interval);
            let unit = window.kind.unit_seconds();
            let up = round2(tally.active_seconds() / unit);
            let down = round2(tally.inactive_seconds() / unit);
            match window.kind {
                WindowKind::LastHour => {
                    record.uptime_last_hour_minutes = up;
                    record.downtime_last_hour_minutes = down;
                }
                WindowKind::LastDay => {
                    record.uptime_last_day_hours = up;
                    record.downtime_last_day_hours = down;
                }
                WindowKind::LastWeek => {
                    record.uptime_last_week_hours = up;
                    record.downtime_last_week_hours = down;
                }
            }
            record
        })
}

/// Round to two decimal places
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

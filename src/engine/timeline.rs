/// Status timeline reconstruction
///
/// Turns sparse, ascending status samples into contiguous status segments
/// covering a query window. Between samples the last observed status is
/// carried forward. Before the first sample, when nothing precedes the
/// window, the first later sample's status is assumed to have always held.
/// With no samples at all the store is taken as inactive.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::interval::Interval;
use crate::error::ValidationError;
use crate::model::{Status, StatusPoint};

/// Status assumed when a store has never reported
pub const DEFAULT_STATUS: Status = Status::Inactive;

/// A contiguous span with one inferred status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub interval: Interval,
    pub status: Status,
}

/// Ascending status samples for one store
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    points: Vec<StatusPoint>,
}

impl Timeline {
    /// Wrap samples, rejecting any that go backwards in time.
    ///
    /// Equal timestamps are allowed and keep their given order.
    pub fn new(points: Vec<StatusPoint>) -> Result<Self, ValidationError> {
        if let Some(pair) = points.windows(2).find(|p| p[1].timestamp < p[0].timestamp) {
            return Err(ValidationError::OutOfOrder {
                prev: pair[0].timestamp,
                next: pair[1].timestamp,
            });
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[StatusPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.points.last().map(|p| p.timestamp)
    }

    /// Status in effect at `at`, before any sample strictly after it is applied
    pub fn status_at(&self, at: DateTime<Utc>) -> Status {
        // Index of the first sample strictly after `at`
        let split = self.points.partition_point(|p| p.timestamp <= at);
        if split > 0 {
            return self.points[split - 1].status;
        }
        match self.points.first() {
            Some(future) => future.status,
            None => {
                debug!("No status samples, assuming {}", DEFAULT_STATUS);
                DEFAULT_STATUS
            }
        }
    }

    /// Segments covering exactly `window`, with no gaps and no overlaps
    pub fn segments(&self, window: &Interval) -> Vec<Segment> {
        if window.is_empty() {
            return Vec::new();
        }

        let mut segments = Vec::new();
        let mut cursor = window.start();
        let mut current = self.status_at(window.start());

        let inside = self
            .points
            .iter()
            .skip_while(|p| p.timestamp <= window.start())
            .take_while(|p| p.timestamp < window.end());

        for point in inside {
            if let Some(interval) = Interval::non_empty(cursor, point.timestamp) {
                segments.push(Segment { interval, status: current });
                cursor = point.timestamp;
            }
            // A tie at the cursor only replaces the open segment's status
            current = point.status;
        }

        if let Some(interval) = Interval::non_empty(cursor, window.end()) {
            segments.push(Segment { interval, status: current });
        }

        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use Status::{Active, Inactive};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap()
    }

    fn at_min(m: i64) -> DateTime<Utc> {
        base() + Duration::minutes(m)
    }

    fn point(m: i64, status: Status) -> StatusPoint {
        StatusPoint::new(at_min(m), status)
    }

    fn window(a: i64, b: i64) -> Interval {
        Interval::new(at_min(a), at_min(b)).unwrap()
    }

    fn seg(a: i64, b: i64, status: Status) -> Segment {
        Segment { interval: window(a, b), status }
    }

    #[test]
    fn test_rejects_out_of_order() {
        let err = Timeline::new(vec![point(10, Active), point(5, Inactive)]).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfOrder { .. }));
    }

    #[test]
    fn test_accepts_equal_timestamps() {
        assert!(Timeline::new(vec![point(5, Active), point(5, Inactive)]).is_ok());
    }

    #[test]
    fn test_no_points_is_inactive() {
        let tl = Timeline::default();
        assert_eq!(tl.segments(&window(0, 60)), vec![seg(0, 60, Inactive)]);
    }

    #[test]
    fn test_prior_point_carried_forward() {
        let tl = Timeline::new(vec![point(-30, Active)]).unwrap();
        assert_eq!(tl.segments(&window(0, 60)), vec![seg(0, 60, Active)]);
    }

    #[test]
    fn test_future_point_backfills_when_no_prior() {
        let tl = Timeline::new(vec![point(30, Active)]).unwrap();
        assert_eq!(
            tl.segments(&window(0, 60)),
            vec![seg(0, 30, Active), seg(30, 60, Active)]
        );
    }

    #[test]
    fn test_future_point_past_window_still_backfills() {
        let tl = Timeline::new(vec![point(90, Active)]).unwrap();
        assert_eq!(tl.segments(&window(0, 60)), vec![seg(0, 60, Active)]);
    }

    #[test]
    fn test_transition_inside_window() {
        let tl = Timeline::new(vec![point(-10, Inactive), point(30, Active)]).unwrap();
        assert_eq!(
            tl.segments(&window(0, 60)),
            vec![seg(0, 30, Inactive), seg(30, 60, Active)]
        );
    }

    #[test]
    fn test_point_at_window_start_is_prior() {
        let tl = Timeline::new(vec![point(-10, Inactive), point(0, Active)]).unwrap();
        assert_eq!(tl.segments(&window(0, 60)), vec![seg(0, 60, Active)]);
    }

    #[test]
    fn test_point_at_window_end_is_ignored() {
        let tl = Timeline::new(vec![point(-10, Active), point(60, Inactive)]).unwrap();
        assert_eq!(tl.segments(&window(0, 60)), vec![seg(0, 60, Active)]);
    }

    #[test]
    fn test_tied_points_do_not_emit_zero_length_segments() {
        let tl = Timeline::new(vec![
            point(-10, Active),
            point(20, Inactive),
            point(20, Active),
            point(40, Inactive),
        ])
        .unwrap();
        assert_eq!(
            tl.segments(&window(0, 60)),
            vec![seg(0, 20, Active), seg(20, 40, Active), seg(40, 60, Inactive)]
        );
    }

    #[test]
    fn test_last_tie_at_prior_wins() {
        let tl = Timeline::new(vec![point(-5, Active), point(-5, Inactive)]).unwrap();
        assert_eq!(tl.status_at(at_min(0)), Inactive);
    }

    #[test]
    fn test_empty_window() {
        let tl = Timeline::new(vec![point(0, Active)]).unwrap();
        assert!(tl.segments(&window(10, 10)).is_empty());
    }

    #[test]
    fn test_latest() {
        assert_eq!(Timeline::default().latest(), None);
        let tl = Timeline::new(vec![point(1, Active), point(7, Inactive)]).unwrap();
        assert_eq!(tl.latest(), Some(at_min(7)));
    }
}

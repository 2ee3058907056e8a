/// Overlap aggregation
///
/// Sums how much of each status segment falls inside business hours.

use chrono::Duration;

use super::interval::{duration_seconds, Interval};
use super::timeline::Segment;
use crate::model::Status;

/// Active and inactive business time within one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub active: Duration,
    pub inactive: Duration,
}

impl Default for Tally {
    fn default() -> Self {
        Self {
            active: Duration::zero(),
            inactive: Duration::zero(),
        }
    }
}

impl Tally {
    fn add(self, status: Status, d: Duration) -> Self {
        match status {
            Status::Active => Self { active: self.active + d, ..self },
            Status::Inactive => Self { inactive: self.inactive + d, ..self },
        }
    }

    pub fn active_seconds(&self) -> f64 {
        duration_seconds(self.active)
    }

    pub fn inactive_seconds(&self) -> f64 {
        duration_seconds(self.inactive)
    }

    pub fn total(&self) -> Duration {
        self.active + self.inactive
    }
}

/// Fold every (business interval, segment) overlap into a tally.
///
/// Business intervals must not overlap each other, nor segments each other,
/// so no instant is counted twice.
pub fn sum_overlap(segments: &[Segment], business: &[Interval]) -> Tally {
    business
        .iter()
        .flat_map(|b| {
            segments
                .iter()
                .filter_map(move |s| s.interval.intersect(b).map(|i| (s.status, i.duration())))
        })
        .fold(Tally::default(), |tally, (status, d)| tally.add(status, d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, h, m, 0).unwrap()
    }

    fn iv(a: (u32, u32), b: (u32, u32)) -> Interval {
        Interval::new(at(a.0, a.1), at(b.0, b.1)).unwrap()
    }

    fn seg(a: (u32, u32), b: (u32, u32), status: Status) -> Segment {
        Segment { interval: iv(a, b), status }
    }

    #[test]
    fn test_no_business_hours_is_zero() {
        let segs = vec![seg((9, 0), (10, 0), Status::Active)];
        assert_eq!(sum_overlap(&segs, &[]), Tally::default());
    }

    #[test]
    fn test_full_overlap() {
        let segs = vec![
            seg((9, 0), (9, 30), Status::Active),
            seg((9, 30), (10, 0), Status::Inactive),
        ];
        let tally = sum_overlap(&segs, &[iv((9, 0), (10, 0))]);
        assert_eq!(tally.active_seconds(), 1800.0);
        assert_eq!(tally.inactive_seconds(), 1800.0);
    }

    #[test]
    fn test_partial_business_coverage() {
        let segs = vec![seg((8, 0), (12, 0), Status::Active)];
        let biz = vec![iv((9, 0), (9, 15)), iv((11, 0), (13, 0))];
        let tally = sum_overlap(&segs, &biz);
        assert_eq!(tally.active, Duration::minutes(75));
        assert_eq!(tally.inactive, Duration::zero());
    }

    #[test]
    fn test_touching_intervals_add_nothing() {
        let segs = vec![seg((8, 0), (9, 0), Status::Inactive)];
        let tally = sum_overlap(&segs, &[iv((9, 0), (10, 0))]);
        assert_eq!(tally.total(), Duration::zero());
    }
}

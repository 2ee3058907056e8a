/// Half-open UTC time ranges
///
/// `[start, end)` with `start <= end` enforced at construction. Intersection
/// returns `None` for no overlap so an empty result can never be summed by
/// accident; touching intervals do not overlap.

use chrono::{DateTime, Duration, Utc};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Interval {
    /// Build `[start, end)`, rejecting `start > end`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Build `[start, end)` only if it covers at least one instant
    pub fn non_empty(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// The interval of length `span` ending at `end`, clamped to the
    /// earliest representable instant
    pub fn ending_at(end: DateTime<Utc>, span: Duration) -> Self {
        let start = end
            .checked_sub_signed(span.abs())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Length in seconds, with microsecond resolution
    pub fn duration_seconds(&self) -> f64 {
        duration_seconds(self.duration())
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// Overlap of two intervals, `None` when they share no instant
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        Self::non_empty(start, end)
    }
}

/// Convert a chrono duration to fractional seconds
pub fn duration_seconds(d: Duration) -> f64 {
    match d.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => d.num_milliseconds() as f64 / 1_000.0,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn interval_strategy() -> impl Strategy<Value = Interval> {
        (0i64..1_000_000, 0i64..100_000).prop_map(|(start, len)| {
            let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let s = base + Duration::seconds(start);
            Interval::new(s, s + Duration::seconds(len)).unwrap()
        })
    }

    proptest! {
        /// Intersection is commutative
        #[test]
        fn intersect_commutative(a in interval_strategy(), b in interval_strategy()) {
            prop_assert_eq!(a.intersect(&b), b.intersect(&a));
        }

        /// An intersection is never empty and lies inside both operands
        #[test]
        fn intersect_within_both(a in interval_strategy(), b in interval_strategy()) {
            if let Some(i) = a.intersect(&b) {
                prop_assert!(!i.is_empty());
                prop_assert!(i.start() >= a.start() && i.end() <= a.end());
                prop_assert!(i.start() >= b.start() && i.end() <= b.end());
                prop_assert!(i.duration_seconds() <= a.duration_seconds().min(b.duration_seconds()));
            }
        }

        /// Durations are never negative
        #[test]
        fn duration_non_negative(a in interval_strategy()) {
            prop_assert!(a.duration_seconds() >= 0.0);
        }
    }
}

/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    fn any_interval() -> Interval {
        let (start, len): (u32, u16) = (kani::any(), kani::any());
        let start = DateTime::from_timestamp(i64::from(start), 0).unwrap();
        Interval::new(start, start + Duration::seconds(i64::from(len))).unwrap()
    }

    /// Proves: intersect is commutative and stays inside both operands
    #[kani::proof]
    fn intersect_commutative_and_bounded() {
        let a = any_interval();
        let b = any_interval();
        let ab = a.intersect(&b);
        kani::assert(ab == b.intersect(&a), "intersection must be commutative");
        if let Some(i) = ab {
            kani::assert(!i.is_empty(), "intersection is never empty");
            kani::assert(i.start() >= a.start() && i.end() <= a.end(), "inside first operand");
            kani::assert(i.start() >= b.start() && i.end() <= b.end(), "inside second operand");
        }
    }

    /// Proves: ending_at never panics and never yields an inverted interval
    #[kani::proof]
    fn ending_at_never_inverted() {
        let end = any_interval().end();
        let span = Duration::seconds(i64::from(kani::any::<i32>()));
        let w = Interval::ending_at(end, span);
        kani::assert(w.start() <= w.end(), "start must not pass end");
        kani::assert(w.end() == end, "end is preserved");
    }
}

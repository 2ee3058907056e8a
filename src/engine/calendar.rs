/// Business calendar resolution
///
/// Expands a store's weekly local-time rules into absolute UTC intervals for
/// a query window. Local wall-clock instants are converted through the IANA
/// zone database, so DST transitions shift and stretch intervals correctly.

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use tracing::{debug, warn};

use super::interval::Interval;
use crate::model::BusinessRule;

/// Zone used when a store has no assignment
pub const DEFAULT_TIMEZONE: &str = "America/Chicago";

/// A store's weekly business calendar in its local zone
#[derive(Debug, Clone)]
pub struct Calendar {
    tz: Tz,
    rules: Vec<BusinessRule>,
}

impl Calendar {
    /// Build a calendar; no rules means open around the clock
    pub fn new(tz: Tz, rules: Vec<BusinessRule>) -> Self {
        if rules.is_empty() {
            debug!("No business hours for calendar in {}, treating as always open", tz);
            return Self::always_open(tz);
        }
        Self { tz, rules }
    }

    pub fn always_open(tz: Tz) -> Self {
        Self {
            tz,
            rules: (0..7).map(BusinessRule::all_day).collect(),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn rules(&self) -> &[BusinessRule] {
        &self.rules
    }

    /// UTC intervals during which the store is open, clipped to `window`.
    ///
    /// Output is sorted and never contains two overlapping intervals.
    /// Intervals may touch, e.g. the two halves of a shift split at midnight.
    pub fn business_intervals(&self, window: &Interval) -> Vec<Interval> {
        if window.is_empty() {
            return Vec::new();
        }

        // Start a day early: yesterday's midnight-crossing shift spills into today
        let first = local_date(&self.tz, window.start());
        let first = first.pred_opt().unwrap_or(first);
        let last = local_date(&self.tz, window.end());

        let mut out = Vec::new();
        for day in first.iter_days().take_while(|d| *d <= last) {
            let weekday = day.weekday().num_days_from_monday();
            for rule in self.rules.iter().filter(|r| r.weekday() == weekday) {
                out.extend(
                    self.rule_intervals(day, rule)
                        .into_iter()
                        .filter_map(|iv| iv.intersect(window)),
                );
            }
        }

        coalesce(out)
    }

    /// Absolute intervals produced by one rule on one local date
    fn rule_intervals(&self, day: NaiveDate, rule: &BusinessRule) -> Vec<Interval> {
        let Some(next) = day.succ_opt() else {
            return Vec::new();
        };

        let parts = if rule.crosses_midnight() {
            let midnight = next.and_time(NaiveTime::MIN);
            vec![
                (day.and_time(rule.start()), midnight),
                (midnight, next.and_time(rule.end())),
            ]
        } else {
            vec![(day.and_time(rule.start()), day.and_time(rule.end()))]
        };

        parts
            .into_iter()
            .filter_map(|(start, end)| {
                let start = local_to_utc(&self.tz, start)?;
                let end = local_to_utc(&self.tz, end)?;
                Interval::non_empty(start, end)
            })
            .collect()
    }
}

/// Convert a local wall-clock time in `tz` to UTC.
///
/// Ambiguous times (clocks going back) take the earlier instant. Times that
/// do not exist (clocks going forward) resolve to the moment the clocks jump,
/// whatever the size of the jump, which keeps the conversion monotonic.
pub fn local_to_utc(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return Some(dt.with_timezone(&Utc));
    }

    let resolved = gap_end(tz, naive);
    if resolved.is_none() {
        warn!("Local time {} cannot be resolved in {}", naive, tz);
    }
    resolved
}

/// The transition instant that skips over `naive`.
///
/// Read with the offset after the jump, `naive` lands before the transition;
/// read with the offset before it, at or after. Between those two readings
/// the wall clock only moves forward, so a bisection over whole seconds finds
/// the first instant whose local reading is at or past `naive`.
fn gap_end(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    let around = naive.and_utc();
    let offset_at = |t: DateTime<Utc>| {
        i64::from(tz.offset_from_utc_datetime(&t.naive_utc()).fix().local_minus_utc())
    };
    let before = offset_at(around.checked_sub_signed(Duration::days(2))?);
    let after = offset_at(around.checked_add_signed(Duration::days(2))?);
    if after <= before {
        return None;
    }

    let reaches = |secs: i64| {
        DateTime::from_timestamp(secs, 0)
            .is_some_and(|t| t.with_timezone(tz).naive_local() >= naive)
    };
    let mut lo = around.timestamp() - after;
    let mut hi = around.timestamp() - before;
    if reaches(lo) || !reaches(hi) {
        return None;
    }
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if reaches(mid) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    DateTime::from_timestamp(hi, 0)
}

/// Resolve a store's zone name, falling back to `default` when absent or unknown
pub fn resolve_timezone(name: Option<&str>, default: Tz) -> Tz {
    match name.map(str::trim).filter(|s| !s.is_empty()) {
        None => default,
        Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            warn!("Unknown timezone {:?}, using {}", name, default);
            default
        }),
    }
}

fn local_date(tz: &Tz, t: DateTime<Utc>) -> NaiveDate {
    t.with_timezone(tz).date_naive()
}

/// Sort and merge strictly overlapping intervals; touching ones stay separate
fn coalesce(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort();
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for iv in intervals {
        match merged.last_mut() {
            Some(last) if iv.start() < last.end() => {
                if iv.end() > last.end() {
                    if let Ok(joined) = Interval::new(last.start(), iv.end()) {
                        *last = joined;
                    }
                }
            }
            _ => merged.push(iv),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Chicago;
    use chrono_tz::UTC;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> Interval {
        Interval::new(start, end).unwrap()
    }

    fn total_seconds(intervals: &[Interval]) -> f64 {
        intervals.iter().map(Interval::duration_seconds).sum()
    }

    // === fallback behavior ===

    #[test]
    fn test_no_rules_is_always_open() {
        let cal = Calendar::new(UTC, Vec::new());
        assert_eq!(cal.rules().len(), 7);

        let w = window(utc(2024, 5, 6, 12, 0), utc(2024, 5, 7, 12, 0));
        let biz = cal.business_intervals(&w);
        assert_eq!(total_seconds(&biz), 24.0 * 3600.0);
        assert_eq!(biz.first().unwrap().start(), w.start());
        assert_eq!(biz.last().unwrap().end(), w.end());
    }

    #[test]
    fn test_always_open_on_spring_forward_day_is_23_hours() {
        let cal = Calendar::always_open(Chicago);
        // 2024-03-10 00:00 CST .. 2024-03-11 00:00 CDT
        let w = window(utc(2024, 3, 10, 6, 0), utc(2024, 3, 11, 5, 0));
        let biz = cal.business_intervals(&w);
        assert_eq!(total_seconds(&biz), 23.0 * 3600.0);
    }

    #[test]
    fn test_empty_window_yields_nothing() {
        let cal = Calendar::always_open(UTC);
        let at = utc(2024, 5, 6, 12, 0);
        assert!(cal.business_intervals(&window(at, at)).is_empty());
    }

    // === daily rules ===

    #[test]
    fn test_daytime_rule_in_local_zone() {
        // Monday 2024-05-06, Chicago on CDT (UTC-5)
        let rule = BusinessRule::new(0, t(9, 0), t(17, 0)).unwrap();
        let cal = Calendar::new(Chicago, vec![rule]);

        let w = window(utc(2024, 5, 6, 0, 0), utc(2024, 5, 8, 0, 0));
        let biz = cal.business_intervals(&w);
        assert_eq!(biz, vec![window(utc(2024, 5, 6, 14, 0), utc(2024, 5, 6, 22, 0))]);
    }

    #[test]
    fn test_rule_for_other_weekday_is_ignored() {
        let rule = BusinessRule::new(0, t(9, 0), t(17, 0)).unwrap();
        let cal = Calendar::new(UTC, vec![rule]);
        // Tuesday only
        let w = window(utc(2024, 5, 7, 0, 0), utc(2024, 5, 8, 0, 0));
        assert!(cal.business_intervals(&w).is_empty());
    }

    #[test]
    fn test_intervals_are_clipped_to_window() {
        let rule = BusinessRule::new(0, t(9, 0), t(17, 0)).unwrap();
        let cal = Calendar::new(UTC, vec![rule]);
        let w = window(utc(2024, 5, 6, 16, 0), utc(2024, 5, 6, 18, 0));
        assert_eq!(
            cal.business_intervals(&w),
            vec![window(utc(2024, 5, 6, 16, 0), utc(2024, 5, 6, 17, 0))]
        );
    }

    #[test]
    fn test_overlapping_rules_are_merged() {
        let rules = vec![
            BusinessRule::new(0, t(9, 0), t(12, 0)).unwrap(),
            BusinessRule::new(0, t(11, 0), t(14, 0)).unwrap(),
        ];
        let cal = Calendar::new(UTC, rules);
        let w = window(utc(2024, 5, 6, 0, 0), utc(2024, 5, 7, 0, 0));
        assert_eq!(
            cal.business_intervals(&w),
            vec![window(utc(2024, 5, 6, 9, 0), utc(2024, 5, 6, 14, 0))]
        );
    }

    // === midnight crossing ===

    #[test]
    fn test_midnight_crossing_splits_at_clean_midnight() {
        // Friday 2024-05-10 22:00 .. Saturday 02:00 Chicago (CDT, UTC-5)
        let rule = BusinessRule::new(4, t(22, 0), t(2, 0)).unwrap();
        let cal = Calendar::new(Chicago, vec![rule]);

        // Friday noon to Saturday noon local
        let w = window(utc(2024, 5, 10, 17, 0), utc(2024, 5, 11, 17, 0));
        let biz = cal.business_intervals(&w);

        assert_eq!(biz.len(), 2);
        assert_eq!(biz[0], window(utc(2024, 5, 11, 3, 0), utc(2024, 5, 11, 5, 0)));
        assert_eq!(biz[1], window(utc(2024, 5, 11, 5, 0), utc(2024, 5, 11, 7, 0)));
        // The halves meet exactly at local midnight, no microsecond gap
        assert_eq!(biz[0].end(), biz[1].start());
        assert_eq!(total_seconds(&biz), 4.0 * 3600.0);
    }

    #[test]
    fn test_previous_days_shift_spills_into_window() {
        let rule = BusinessRule::new(4, t(22, 0), t(2, 0)).unwrap();
        let cal = Calendar::new(Chicago, vec![rule]);

        // Saturday 00:30 .. 01:30 local
        let w = window(utc(2024, 5, 11, 5, 30), utc(2024, 5, 11, 6, 30));
        assert_eq!(cal.business_intervals(&w), vec![w]);
    }

    // === DST transitions ===

    #[test]
    fn test_spring_forward_shortens_interval_spanning_transition() {
        // Sunday rule 01:00-05:00 spans the 02:00 jump
        let rule = BusinessRule::new(6, t(1, 0), t(5, 0)).unwrap();
        let cal = Calendar::new(Chicago, vec![rule]);

        let normal = cal.business_intervals(&window(utc(2024, 3, 3, 0, 0), utc(2024, 3, 4, 0, 0)));
        let dst = cal.business_intervals(&window(utc(2024, 3, 10, 0, 0), utc(2024, 3, 11, 0, 0)));

        assert_eq!(total_seconds(&normal), 4.0 * 3600.0);
        assert_eq!(total_seconds(&dst), 3.0 * 3600.0);
        assert_eq!(dst, vec![window(utc(2024, 3, 10, 7, 0), utc(2024, 3, 10, 10, 0))]);
    }

    #[test]
    fn test_fall_back_lengthens_interval_spanning_transition() {
        let rule = BusinessRule::new(6, t(0, 0), t(12, 0)).unwrap();
        let cal = Calendar::new(Chicago, vec![rule]);

        let dst = cal.business_intervals(&window(utc(2024, 11, 3, 0, 0), utc(2024, 11, 4, 0, 0)));
        assert_eq!(dst, vec![window(utc(2024, 11, 3, 5, 0), utc(2024, 11, 3, 18, 0))]);
        assert_eq!(total_seconds(&dst), 13.0 * 3600.0);
    }

    #[test]
    fn test_daytime_rule_shifts_by_dst_delta() {
        let rule = BusinessRule::new(6, t(9, 0), t(17, 0)).unwrap();
        let cal = Calendar::new(Chicago, vec![rule]);

        let before = cal.business_intervals(&window(utc(2024, 3, 3, 0, 0), utc(2024, 3, 4, 0, 0)));
        let after = cal.business_intervals(&window(utc(2024, 3, 10, 0, 0), utc(2024, 3, 11, 0, 0)));

        assert_eq!(before, vec![window(utc(2024, 3, 3, 15, 0), utc(2024, 3, 3, 23, 0))]);
        assert_eq!(after, vec![window(utc(2024, 3, 10, 14, 0), utc(2024, 3, 10, 22, 0))]);
        assert_eq!(
            before[0].start() + Duration::days(7) - after[0].start(),
            Duration::hours(1)
        );
    }

    #[test]
    fn test_local_to_utc_gap_and_ambiguity() {
        let gap = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap().and_time(t(2, 30));
        assert_eq!(local_to_utc(&Chicago, gap), Some(utc(2024, 3, 10, 8, 0)));

        let ambiguous = NaiveDate::from_ymd_opt(2024, 11, 3).unwrap().and_time(t(1, 30));
        assert_eq!(local_to_utc(&Chicago, ambiguous), Some(utc(2024, 11, 3, 6, 30)));
    }

    #[test]
    fn test_local_to_utc_resolves_half_hour_gap() {
        // Lord Howe springs forward 02:00 -> 02:30 (UTC+10:30 -> +11)
        let gap = NaiveDate::from_ymd_opt(2024, 10, 6).unwrap().and_time(t(2, 15));
        assert_eq!(
            local_to_utc(&chrono_tz::Australia::Lord_Howe, gap),
            Some(utc(2024, 10, 5, 15, 30))
        );
    }

    #[test]
    fn test_local_to_utc_resolves_skipped_day() {
        // Apia skipped 2011-12-30 entirely, jumping from UTC-10 to UTC+14
        let skipped = NaiveDate::from_ymd_opt(2011, 12, 30).unwrap().and_time(t(12, 0));
        assert_eq!(
            local_to_utc(&chrono_tz::Pacific::Apia, skipped),
            Some(utc(2011, 12, 30, 10, 0))
        );
    }

    #[test]
    fn test_always_open_across_skipped_day_covers_window() {
        let cal = Calendar::always_open(chrono_tz::Pacific::Apia);
        let w = window(utc(2011, 12, 28, 0, 0), utc(2011, 12, 31, 0, 0));
        let biz = cal.business_intervals(&w);
        assert_eq!(total_seconds(&biz), w.duration_seconds());
        for pair in biz.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start());
        }
    }

    // === timezone resolution ===

    #[test]
    fn test_resolve_timezone() {
        assert_eq!(resolve_timezone(Some("Asia/Kolkata"), Chicago), chrono_tz::Asia::Kolkata);
        assert_eq!(resolve_timezone(None, Chicago), Chicago);
        assert_eq!(resolve_timezone(Some(""), Chicago), Chicago);
        assert_eq!(resolve_timezone(Some("Mars/Olympus_Mons"), Chicago), Chicago);
    }

    #[test]
    fn test_default_timezone_constant_parses() {
        assert_eq!(DEFAULT_TIMEZONE.parse::<Tz>().unwrap(), Chicago);
    }
}

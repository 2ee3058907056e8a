/// Input sources for the metrics engine
///
/// The engine reads status samples, business rules and timezone names through
/// these traits. [`Dataset`] is the in-memory implementation filled by
/// [`crate::ingest`].

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

use crate::engine::Interval;
use crate::error::ValidationError;
use crate::model::{BusinessRule, Observation, StatusPoint, TimezoneAssignment};

pub trait ObservationSource {
    /// Ascending samples for `store_id` up to `range.end()` inclusive,
    /// starting with the nearest sample at or before `range.start()`.
    fn status_points(&self, store_id: &str, range: &Interval) -> Vec<StatusPoint>;

    /// Latest sample timestamp across every store
    fn latest_timestamp(&self) -> Option<DateTime<Utc>>;
}

pub trait BusinessHoursSource {
    fn business_rules(&self, store_id: &str) -> Vec<BusinessRule>;
}

pub trait TimezoneSource {
    fn timezone(&self, store_id: &str) -> Option<String>;
}

/// Everything the engine needs for a full report
pub trait MetricsSource: ObservationSource + BusinessHoursSource + TimezoneSource {
    /// Every store known to any table, sorted
    fn store_ids(&self) -> Vec<String>;
}

/// In-memory store of the three input tables
#[derive(Debug, Default, Clone)]
pub struct Dataset {
    status: HashMap<String, Vec<StatusPoint>>,
    hours: HashMap<String, Vec<BusinessRule>>,
    zones: HashMap<String, String>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample, keeping the store's samples sorted.
    ///
    /// Samples sharing a timestamp keep their insertion order.
    pub fn add_observation(&mut self, obs: Observation) {
        let points = self.status.entry(obs.store_id).or_default();
        let at = points.partition_point(|p| p.timestamp <= obs.point.timestamp);
        points.insert(at, obs.point);
    }

    pub fn add_business_rule(&mut self, store_id: impl Into<String>, rule: BusinessRule) {
        self.hours.entry(store_id.into()).or_default().push(rule);
    }

    /// Assign a store's zone; a store may only ever have one
    pub fn set_timezone(&mut self, assignment: TimezoneAssignment) -> Result<(), ValidationError> {
        match self.zones.get(&assignment.store_id) {
            Some(existing) if *existing != assignment.timezone => {
                Err(ValidationError::ConflictingTimezone {
                    store_id: assignment.store_id,
                    existing: existing.clone(),
                    rejected: assignment.timezone,
                })
            }
            Some(_) => Ok(()),
            None => {
                self.zones.insert(assignment.store_id, assignment.timezone);
                Ok(())
            }
        }
    }

    pub fn observation_count(&self) -> usize {
        self.status.values().map(Vec::len).sum()
    }

    pub fn rule_count(&self) -> usize {
        self.hours.values().map(Vec::len).sum()
    }

    pub fn timezone_count(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_empty() && self.hours.is_empty() && self.zones.is_empty()
    }
}

impl ObservationSource for Dataset {
    fn status_points(&self, store_id: &str, range: &Interval) -> Vec<StatusPoint> {
        let Some(points) = self.status.get(store_id) else {
            return Vec::new();
        };
        let after_start = points.partition_point(|p| p.timestamp <= range.start());
        let from = after_start.saturating_sub(1);
        // Keep every sample tied with the nearest prior one
        let prior_ts = points.get(from).map(|p| p.timestamp);
        let from = match prior_ts {
            Some(ts) if ts <= range.start() => points.partition_point(|p| p.timestamp < ts),
            _ => from,
        };
        let to = points.partition_point(|p| p.timestamp <= range.end());
        points[from..to.max(from)].to_vec()
    }

    fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.status
            .values()
            .filter_map(|points| points.last().map(|p| p.timestamp))
            .max()
    }
}

impl BusinessHoursSource for Dataset {
    fn business_rules(&self, store_id: &str) -> Vec<BusinessRule> {
        self.hours.get(store_id).cloned().unwrap_or_default()
    }
}

impl TimezoneSource for Dataset {
    fn timezone(&self, store_id: &str) -> Option<String> {
        self.zones.get(store_id).cloned()
    }
}

impl MetricsSource for Dataset {
    fn store_ids(&self) -> Vec<String> {
        self.status
            .keys()
            .chain(self.hours.keys())
            .chain(self.zones.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

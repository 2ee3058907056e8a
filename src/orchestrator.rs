//! Report orchestration
//!
//! Drives the engine for every store, isolating per-store failures so one
//! malformed store never sinks the whole report.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::{self, resolve_timezone, Calendar, Interval, Timeline, WindowKind};
use crate::error::{StoreError, ValidationError};
use crate::model::{check_timestamp_range, MetricsRecord};
use crate::source::MetricsSource;

/// A store whose metrics could not be computed
#[derive(Debug, Clone, PartialEq)]
pub struct StoreFailure {
    pub store_id: String,
    pub error: StoreError,
}

/// Result of a report run: successful records plus per-store diagnostics,
/// both sorted by store id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportOutcome {
    pub now: Option<DateTime<Utc>>,
    pub records: Vec<MetricsRecord>,
    pub failures: Vec<StoreFailure>,
}

impl ReportOutcome {
    fn merge(&mut self, other: ReportOutcome) {
        self.records.extend(other.records);
        self.failures.extend(other.failures);
    }

    fn sort(&mut self) {
        self.records.sort_by(|a, b| a.store_id.cmp(&b.store_id));
        self.failures.sort_by(|a, b| a.store_id.cmp(&b.store_id));
    }
}

/// Compute one store's metrics from the sources
pub fn compute_store_metrics<S: MetricsSource + ?Sized>(
    source: &S,
    store_id: &str,
    now: DateTime<Utc>,
    default_tz: Tz,
) -> Result<MetricsRecord, ValidationError> {
    let now = check_timestamp_range(now)?;
    let widest = Interval::ending_at(now, WindowKind::LastWeek.span());

    let points = source.status_points(store_id, &widest);
    if points.is_empty() {
        debug!("Store {} has no status samples", store_id);
    }
    let timeline = Timeline::new(points)?;

    let tz = resolve_timezone(source.timezone(store_id).as_deref(), default_tz);
    let calendar = Calendar::new(tz, source.business_rules(store_id));

    Ok(engine::store_metrics(store_id, &timeline, &calendar, now))
}

/// Compute metrics for `store_ids` in order, collecting failures
pub fn compute_report<S: MetricsSource + ?Sized>(
    source: &S,
    store_ids: &[String],
    now: DateTime<Utc>,
    default_tz: Tz,
) -> ReportOutcome {
    let mut outcome = ReportOutcome {
        now: Some(now),
        ..Default::default()
    };

    for store_id in store_ids {
        match compute_store_metrics(source, store_id, now, default_tz) {
            Ok(record) => outcome.records.push(record),
            Err(error) => {
                warn!("Store {} skipped: {}", store_id, error);
                outcome.failures.push(StoreFailure {
                    store_id: store_id.clone(),
                    error: error.into(),
                });
            }
        }
    }

    outcome
}

/// Compute a full report across `workers` blocking tasks.
///
/// Stores are independent, so the id list is split into chunks and the
/// partial outcomes merged and re-sorted by store id. A chunk whose worker
/// dies reports every one of its stores as a failure.
pub async fn run_report<S>(
    source: Arc<S>,
    now: DateTime<Utc>,
    default_tz: Tz,
    workers: usize,
) -> ReportOutcome
where
    S: MetricsSource + Send + Sync + 'static,
{
    let started = Instant::now();
    let store_ids = source.store_ids();
    let chunk_size = store_ids.len().div_ceil(workers.max(1)).max(1);

    let mut handles = Vec::new();
    for chunk in store_ids.chunks(chunk_size) {
        let source = Arc::clone(&source);
        let ids = chunk.to_vec();
        let handle = tokio::task::spawn_blocking(move || {
            compute_report(source.as_ref(), &ids, now, default_tz)
        });
        handles.push((chunk.to_vec(), handle));
    }

    let mut outcome = ReportOutcome {
        now: Some(now),
        ..Default::default()
    };
    for (chunk, handle) in handles {
        match handle.await {
            Ok(partial) => outcome.merge(partial),
            Err(e) => {
                warn!("Report worker failed, dropping {} stores: {}", chunk.len(), e);
                let reason = e.to_string();
                outcome.failures.extend(chunk.into_iter().map(|store_id| StoreFailure {
                    store_id,
                    error: StoreError::Aborted(reason.clone()),
                }));
            }
        }
    }
    outcome.sort();

    info!(
        "Report computed: {} stores, {} failures, reference time {}, took {:?}",
        outcome.records.len(),
        outcome.failures.len(),
        now,
        started.elapsed()
    );
    outcome
}

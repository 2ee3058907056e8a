/// Report rendering
///
/// Turns a [`ReportOutcome`] into the CSV handed back to callers.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::model::MetricsRecord;
use crate::orchestrator::ReportOutcome;

pub const REPORT_COLUMNS: [&str; 7] = [
    "store_id",
    "uptime_last_hour_minutes",
    "uptime_last_day_hours",
    "uptime_last_week_hours",
    "downtime_last_hour_minutes",
    "downtime_last_day_hours",
    "downtime_last_week_hours",
];

/// Render records as CSV, header first, one line per store
pub fn report_csv(records: &[MetricsRecord]) -> String {
    let mut out = REPORT_COLUMNS.join(",");
    out.push('\n');
    for r in records {
        // Debug keeps the decimal point on whole values: 20.0, not 20
        let _ = writeln!(
            out,
            "{},{:?},{:?},{:?},{:?},{:?},{:?}",
            quote_field(&r.store_id),
            r.uptime_last_hour_minutes,
            r.uptime_last_day_hours,
            r.uptime_last_week_hours,
            r.downtime_last_hour_minutes,
            r.downtime_last_day_hours,
            r.downtime_last_week_hours,
        );
    }
    out
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// File name a report is stored and downloaded under
pub fn report_file_name(report_id: &str) -> String {
    format!("{}.csv", report_id)
}

/// Write `<report_id>.csv` into `dir`, creating it if needed
pub fn write_report(dir: &Path, report_id: &str, outcome: &ReportOutcome) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report directory {}", dir.display()))?;

    let path = dir.join(report_file_name(report_id));
    std::fs::write(&path, report_csv(&outcome.records))
        .with_context(|| format!("Failed to write report {}", path.display()))?;

    for failure in &outcome.failures {
        warn!("Report {} omits store {}: {}", report_id, failure.store_id, failure.error);
    }
    info!(
        "Report {} written to {} ({} stores)",
        report_id,
        path.display(),
        outcome.records.len()
    );
    Ok(path)
}

/// CSV ingestion into the in-memory dataset
///
/// Each table is header-driven. A bad row is recorded and skipped; the rest
/// of the file still loads. Only a missing required column rejects a file.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{
    parse_local_time, parse_timestamp, BusinessRule, Observation, Status, StatusPoint,
    TimezoneAssignment,
};
use crate::source::Dataset;

/// Rejected rows logged individually before switching to a summary
const MAX_LOGGED_ROW_ERRORS: usize = 10;

/// The three input tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Status,
    BusinessHours,
    Timezones,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Status, Table::BusinessHours, Table::Timezones];

    pub fn file_name(&self) -> &'static str {
        match self {
            Table::Status => "store_status.csv",
            Table::BusinessHours => "business_hours.csv",
            Table::Timezones => "store_timezones.csv",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Status => &["store_id", "status", "timestamp_utc"],
            Table::BusinessHours => &["store_id", "dayOfWeek", "start_time_local", "end_time_local"],
            Table::Timezones => &["store_id", "timezone_str"],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("{table}: empty file, expected a header row")]
    MissingHeader { table: Table },

    #[error("{table}: missing required column {column:?}")]
    MissingColumn { table: Table, column: &'static str },
}

/// One rejected row
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    /// 1-based line number, the header being line 1
    pub line: usize,
    pub message: String,
}

/// Outcome of loading one table
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub table: Table,
    pub loaded: usize,
    pub rejected: Vec<RowError>,
}

impl IngestSummary {
    fn new(table: Table) -> Self {
        Self {
            table,
            loaded: 0,
            rejected: Vec::new(),
        }
    }
}

/// Load one table's CSV text into `dataset`
pub fn ingest_table(
    table: Table,
    text: &str,
    dataset: &mut Dataset,
) -> Result<IngestSummary, IngestError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end_matches('\r')));

    let header = lines
        .by_ref()
        .find(|(_, line)| !line.trim().is_empty())
        .map(|(_, line)| split_record(line))
        .ok_or(IngestError::MissingHeader { table })?;
    let index = column_index(table, &header)?;

    let mut summary = IngestSummary::new(table);
    for (line_no, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_record(line);
        let row = Row {
            index: &index,
            fields: &fields,
        };

        match load_row(table, &row, dataset) {
            Ok(()) => summary.loaded += 1,
            Err(message) => summary.rejected.push(RowError {
                line: line_no,
                message,
            }),
        }
    }

    Ok(summary)
}

/// Header-indexed view of one record
struct Row<'a> {
    index: &'a HashMap<&'static str, usize>,
    fields: &'a [String],
}

impl<'a> Row<'a> {
    fn get(&self, name: &str) -> Result<&'a str, String> {
        self.index
            .get(name)
            .and_then(|&i| self.fields.get(i))
            .map(|s| s.trim())
            .ok_or_else(|| format!("missing field {:?}", name))
    }
}

fn load_row(table: Table, row: &Row<'_>, dataset: &mut Dataset) -> Result<(), String> {
    let store_id = row.get("store_id")?;
    if store_id.is_empty() {
        return Err("empty store_id".to_string());
    }

    match table {
        Table::Status => {
            let status = row.get("status")?.parse::<Status>().map_err(|e| e.to_string())?;
            let timestamp = parse_timestamp(row.get("timestamp_utc")?).map_err(|e| e.to_string())?;
            dataset.add_observation(Observation {
                store_id: store_id.to_string(),
                point: StatusPoint::new(timestamp, status),
            });
        }
        Table::BusinessHours => {
            let raw_day = row.get("dayOfWeek")?;
            let weekday = raw_day
                .parse::<u32>()
                .map_err(|_| format!("invalid dayOfWeek {:?}", raw_day))?;
            let start = parse_local_time(row.get("start_time_local")?).map_err(|e| e.to_string())?;
            let end = parse_local_time(row.get("end_time_local")?).map_err(|e| e.to_string())?;
            let rule = BusinessRule::new(weekday, start, end).map_err(|e| e.to_string())?;
            dataset.add_business_rule(store_id, rule);
        }
        Table::Timezones => {
            let timezone = row.get("timezone_str")?;
            dataset
                .set_timezone(TimezoneAssignment {
                    store_id: store_id.to_string(),
                    timezone: timezone.to_string(),
                })
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

fn column_index(table: Table, header: &[String]) -> Result<HashMap<&'static str, usize>, IngestError> {
    table
        .columns()
        .iter()
        .map(|&column| {
            header
                .iter()
                .position(|h| h.trim() == column)
                .map(|i| (column, i))
                .ok_or(IngestError::MissingColumn { table, column })
        })
        .collect()
}

/// Split one CSV record, honouring double-quoted fields and `""` escapes
pub fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', _) => in_quotes = !in_quotes,
            (',', false) => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Load every table present in `dir`; missing files leave the table empty
pub fn load_dir(dir: &Path) -> Result<(Dataset, Vec<IngestSummary>)> {
    let mut dataset = Dataset::new();
    let mut summaries = Vec::new();

    for table in Table::ALL {
        let path = dir.join(table.file_name());
        if !path.exists() {
            warn!("{} not found, table left empty", path.display());
            continue;
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let summary = ingest_table(table, &text, &mut dataset)
            .with_context(|| format!("Failed to ingest {}", path.display()))?;
        log_summary(&summary);
        summaries.push(summary);
    }

    info!(
        "Dataset loaded: {} observations, {} business rules, {} timezones",
        dataset.observation_count(),
        dataset.rule_count(),
        dataset.timezone_count()
    );
    Ok((dataset, summaries))
}

fn log_summary(summary: &IngestSummary) {
    info!(
        "{}: {} rows loaded, {} rejected",
        summary.table,
        summary.loaded,
        summary.rejected.len()
    );
    for err in summary.rejected.iter().take(MAX_LOGGED_ROW_ERRORS) {
        warn!("{} line {}: {}", summary.table, err.line, err.message);
    }
    if summary.rejected.len() > MAX_LOGGED_ROW_ERRORS {
        warn!(
            "{}: {} more rejected rows not shown",
            summary.table,
            summary.rejected.len() - MAX_LOGGED_ROW_ERRORS
        );
    }
}

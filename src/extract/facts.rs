use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use tracing::debug;

use crate::classify::{AggregationKey, FileRecord};
use crate::constants::extract::{DEVICE_COLUMN_MARKER, TIME_COLUMN};
use crate::errors::AggregateError;
use crate::extract::{day_string, parse_epoch_seconds};
use crate::transport::table::Table;
use crate::types::DayString;

/// Coverage facts for one file, or one device group within a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedFacts {
    /// Key of the file, device-suffixed for device groups.
    pub key: AggregationKey,
    /// Raw rows, including rows whose time value is invalid.
    pub row_count: u64,
    /// Earliest valid time value.
    pub start_time: Option<NaiveDateTime>,
    /// Latest valid time value.
    pub end_time: Option<NaiveDateTime>,
    /// Distinct days of the valid time values.
    pub day_set: BTreeSet<DayString>,
}

/// Time coverage over the valid values of a time column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct TimeCoverage {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub days: BTreeSet<DayString>,
}

impl TimeCoverage {
    pub(crate) fn observe(&mut self, at: NaiveDateTime) {
        self.start = Some(self.start.map_or(at, |start| start.min(at)));
        self.end = Some(self.end.map_or(at, |end| end.max(at)));
        self.days.insert(day_string(&at));
    }

    pub(crate) fn of_column(table: &Table, column: Option<usize>) -> Self {
        let mut coverage = Self::default();
        if let Some(idx) = column {
            for at in table.column(idx).filter_map(parse_epoch_seconds) {
                coverage.observe(at);
            }
        }
        coverage
    }
}

/// First column whose lowercase name contains `device`.
fn device_column(table: &Table) -> Option<usize> {
    table
        .headers()
        .iter()
        .position(|header| header.to_lowercase().contains(DEVICE_COLUMN_MARKER))
}

/// Derive facts from an already-decoded table.
///
/// With a device column, one fact per distinct non-empty device value is
/// emitted (sorted by value); each shares the whole-file time coverage.
/// Rows with an empty device cell belong to no group.
pub fn facts_from_table(key: &AggregationKey, table: &Table) -> Vec<ExtractedFacts> {
    let coverage = TimeCoverage::of_column(table, table.column_index(TIME_COLUMN));
    let build = |key: AggregationKey, row_count: u64| ExtractedFacts {
        key,
        row_count,
        start_time: coverage.start,
        end_time: coverage.end,
        day_set: coverage.days.clone(),
    };

    let Some(device_idx) = device_column(table) else {
        return vec![build(key.clone(), table.row_count() as u64)];
    };

    let mut groups: BTreeMap<&str, u64> = BTreeMap::new();
    for device in table.column(device_idx).filter(|cell| !cell.is_empty()) {
        *groups.entry(device).or_insert(0) += 1;
    }
    groups
        .into_iter()
        .map(|(device, row_count)| build(key.with_device(device), row_count))
        .collect()
}

/// Open a classified file and derive its facts.
///
/// Decode or parse failures return an error and contribute nothing.
pub fn extract_facts(record: &FileRecord) -> Result<Vec<ExtractedFacts>, AggregateError> {
    debug!(path = %record.path.display(), key = %record.key, "reading file");
    let table = Table::read_gz(&record.path)?;
    Ok(facts_from_table(&record.key, &table))
}

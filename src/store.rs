use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::classify::AggregationKey;
use crate::extract::{ExtractedFacts, format_instant};
use crate::types::{DayString, MetricName, ParticipantId, SiteId};

/// Running summary for one `AggregationKey`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregateRecord {
    /// Rows seen across every merged file.
    pub row_count: u64,
    /// Earliest valid instant.
    pub start_date: Option<NaiveDateTime>,
    /// Latest valid instant.
    pub end_date: Option<NaiveDateTime>,
    /// Distinct days with a valid instant.
    pub day_set: BTreeSet<DayString>,
}

impl AggregateRecord {
    /// Fold one file's facts into this record.
    pub fn absorb(&mut self, facts: &ExtractedFacts) {
        self.row_count += facts.row_count;
        self.start_date = merge_bound(self.start_date, facts.start_time, std::cmp::min);
        self.end_date = merge_bound(self.end_date, facts.end_time, std::cmp::max);
        self.day_set.extend(facts.day_set.iter().cloned());
    }

    /// Number of distinct days.
    pub fn day_count(&self) -> u64 {
        self.day_set.len() as u64
    }
}

/// Combine two optional bounds; a present value always beats `None`.
fn merge_bound<T: Copy>(current: Option<T>, incoming: Option<T>, pick: fn(T, T) -> T) -> Option<T> {
    match (current, incoming) {
        (Some(current), Some(incoming)) => Some(pick(current, incoming)),
        (current, None) => current,
        (None, incoming) => incoming,
    }
}

/// `existing ⊕ facts` as a new record; a missing record starts from zero.
pub fn merge_facts(existing: Option<&AggregateRecord>, facts: &ExtractedFacts) -> AggregateRecord {
    let mut record = existing.cloned().unwrap_or_default();
    record.absorb(facts);
    record
}

/// One output line of a stats artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsRow {
    /// Site segment.
    pub site: SiteId,
    /// Participant segment.
    pub participant: ParticipantId,
    /// Metric, device-suffixed for device groups.
    pub metric: MetricName,
    /// Total rows.
    pub row_count: u64,
    /// Earliest instant; empty when no time value was valid.
    pub start_date: Option<String>,
    /// Latest instant; empty when no time value was valid.
    pub end_date: Option<String>,
    /// Distinct days with data.
    pub day_count: u64,
}

impl StatsRow {
    /// Key this row was written for.
    pub fn key(&self) -> AggregationKey {
        AggregationKey::new(&self.site, &self.participant, &self.metric)
    }

    fn from_record(key: &AggregationKey, record: &AggregateRecord) -> Self {
        Self {
            site: key.site.clone(),
            participant: key.participant.clone(),
            metric: key.metric.clone(),
            row_count: record.row_count,
            start_date: record.start_date.as_ref().map(format_instant),
            end_date: record.end_date.as_ref().map(format_instant),
            day_count: record.day_count(),
        }
    }
}

/// Mapping from aggregation key to running summary.
///
/// Keys restored from a previous snapshot are frozen: their rows are
/// re-emitted verbatim and files feeding them are not reprocessed.
#[derive(Debug, Default)]
pub struct AggregateStore {
    records: BTreeMap<AggregationKey, AggregateRecord>,
    restored: BTreeMap<AggregationKey, StatsRow>,
}

impl AggregateStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-create the record for `facts.key` and fold the facts in.
    pub fn merge(&mut self, facts: &ExtractedFacts) {
        self.records
            .entry(facts.key.clone())
            .or_default()
            .absorb(facts);
    }

    /// Seed the store with rows read back from a previous snapshot.
    pub fn restore(&mut self, rows: impl IntoIterator<Item = StatsRow>) {
        for row in rows {
            self.restored.insert(row.key(), row);
        }
    }

    /// True if a restored key is `file_key` or one of its device groups.
    pub fn is_restored(&self, file_key: &AggregationKey) -> bool {
        let lower = AggregationKey::new(&file_key.site, &file_key.participant, &file_key.metric);
        self.restored
            .range(lower..)
            .take_while(|(key, _)| {
                key.site == file_key.site
                    && key.participant == file_key.participant
                    && key.metric.starts_with(file_key.metric.as_str())
            })
            .any(|(key, _)| key.derives_from(file_key))
    }

    /// Live record merged during this run.
    pub fn get(&self, key: &AggregationKey) -> Option<&AggregateRecord> {
        self.records.get(key)
    }

    /// Live plus restored keys.
    pub fn len(&self) -> usize {
        self.records.len() + self.restored.len()
    }

    /// True with neither live nor restored keys.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.restored.is_empty()
    }

    /// Keys restored from the snapshot.
    pub fn restored_len(&self) -> usize {
        self.restored.len()
    }

    /// Every row, live and restored, sorted by `(site, participant, metric)`.
    pub fn rows(&self) -> Vec<StatsRow> {
        let mut rows: BTreeMap<&AggregationKey, StatsRow> = self
            .restored
            .iter()
            .map(|(key, row)| (key, row.clone()))
            .collect();
        for (key, record) in &self.records {
            rows.insert(key, StatsRow::from_record(key, record));
        }
        rows.into_values().collect()
    }
}

/// Streaming accumulator behind one numeric statistic.
///
/// `total_entries` counts every matched row; `values` and `days` only the
/// rows whose value parsed as a number.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NumericAccumulator {
    /// Matched rows.
    pub total_entries: u64,
    /// Parsed values, in arrival order.
    pub values: Vec<f64>,
    /// Days with at least one parsed value.
    pub days: BTreeSet<NaiveDate>,
}

impl NumericAccumulator {
    /// Count one matched row, numeric or not.
    pub fn record_entry(&mut self) {
        self.total_entries += 1;
    }

    /// Keep a parsed value and mark its day as having data.
    pub fn record_value(&mut self, at: &NaiveDateTime, value: f64) {
        self.values.push(value);
        self.days.insert(at.date());
    }

    /// `record_entry` plus `record_value` when the value parsed.
    pub fn record(&mut self, at: &NaiveDateTime, value: Option<f64>) {
        self.record_entry();
        if let Some(value) = value {
            self.record_value(at, value);
        }
    }

    /// Number of days with a parsed value.
    pub fn days_with_data(&self) -> u64 {
        self.days.len() as u64
    }

    /// Statistics over the parsed values.
    pub fn summary(&self) -> NumericSummary {
        compute_summary(&self.values)
    }
}

/// Descriptive statistics; every field is `None` for an empty input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct NumericSummary {
    /// Arithmetic mean.
    pub mean: Option<f64>,
    /// Median; mean of the middle pair for even counts.
    pub median: Option<f64>,
    /// Population standard deviation.
    pub std_dev: Option<f64>,
    /// Smallest value.
    pub min: Option<f64>,
    /// Largest value.
    pub max: Option<f64>,
}

/// Mean, median, population standard deviation, min, and max.
pub fn compute_summary(values: &[f64]) -> NumericSummary {
    if values.is_empty() {
        return NumericSummary::default();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    NumericSummary {
        mean: Some(mean),
        median: Some(median),
        std_dev: Some(variance.sqrt()),
        min: sorted.first().copied(),
        max: sorted.last().copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::parse_epoch_seconds;

    fn facts(key: &AggregationKey, rows: u64, times: &[&str]) -> ExtractedFacts {
        let instants: Vec<NaiveDateTime> =
            times.iter().filter_map(|t| parse_epoch_seconds(t)).collect();
        ExtractedFacts {
            key: key.clone(),
            row_count: rows,
            start_time: instants.iter().min().copied(),
            end_time: instants.iter().max().copied(),
            day_set: instants.iter().map(crate::extract::day_string).collect(),
        }
    }

    #[test]
    fn merge_is_order_independent() {
        let key = AggregationKey::new("S", "P", "steps");
        let a = facts(&key, 3, &["1700000000", "1700090000"]);
        let b = facts(&key, 5, &["1690000000"]);
        let c = facts(&key, 1, &[]);

        let abc = merge_facts(Some(&merge_facts(Some(&merge_facts(None, &a)), &b)), &c);
        let cba = merge_facts(Some(&merge_facts(Some(&merge_facts(None, &c)), &b)), &a);
        assert_eq!(abc, cba);
        assert_eq!(abc.row_count, 9);
        assert_eq!(abc.day_count(), 3);
    }

    #[test]
    fn bounds_only_widen_and_none_never_wins() {
        let key = AggregationKey::new("S", "P", "steps");
        let mut record = AggregateRecord::default();
        record.absorb(&facts(&key, 1, &["1700000000"]));
        let (start, end) = (record.start_date, record.end_date);

        record.absorb(&facts(&key, 1, &[]));
        assert_eq!((record.start_date, record.end_date), (start, end));

        record.absorb(&facts(&key, 1, &["1700000100"]));
        assert_eq!(record.start_date, start);
        assert!(record.end_date > end);
        assert_eq!(record.day_count(), 1);
    }

    #[test]
    fn store_rows_are_sorted_and_never_empty_placeholders() {
        let mut store = AggregateStore::new();
        assert!(store.rows().is_empty());
        store.merge(&facts(&AggregationKey::new("S2", "P1", "hr"), 1, &[]));
        store.merge(&facts(&AggregationKey::new("S1", "P2", "steps"), 2, &[]));
        store.merge(&facts(&AggregationKey::new("S1", "P1", "steps"), 3, &[]));
        let keys: Vec<String> = store.rows().iter().map(|r| r.key().to_string()).collect();
        assert_eq!(keys, vec!["S1/P1/steps", "S1/P2/steps", "S2/P1/hr"]);
    }

    #[test]
    fn restored_keys_cover_their_device_groups() {
        let mut store = AggregateStore::new();
        store.restore([StatsRow {
            site: "S".into(),
            participant: "P".into(),
            metric: "acc/watch".into(),
            row_count: 4,
            start_date: None,
            end_date: None,
            day_count: 2,
        }]);
        assert!(store.is_restored(&AggregationKey::new("S", "P", "acc")));
        assert!(!store.is_restored(&AggregationKey::new("S", "P", "ac")));
        assert!(!store.is_restored(&AggregationKey::new("S", "P", "steps")));
        assert_eq!(store.rows()[0].day_count, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn summary_of_empty_values_is_all_none() {
        assert_eq!(compute_summary(&[]), NumericSummary::default());
    }

    #[test]
    fn summary_uses_population_std_dev() {
        let summary = compute_summary(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(summary.mean, Some(5.0));
        assert_eq!(summary.median, Some(4.5));
        assert_eq!(summary.std_dev, Some(2.0));
        assert_eq!(summary.min, Some(2.0));
        assert_eq!(summary.max, Some(9.0));
    }

    #[test]
    fn accumulator_separates_entries_from_numeric_values() {
        let at = parse_epoch_seconds("1700000000").unwrap();
        let mut acc = NumericAccumulator::default();
        for value in [Some(1.0), None, Some(3.0), None, Some(2.0)] {
            acc.record(&at, value);
        }
        assert_eq!(acc.total_entries, 5);
        assert_eq!(acc.values.len(), 3);
        assert_eq!(acc.days_with_data(), 1);
        assert_eq!(acc.summary().median, Some(2.0));
    }
}

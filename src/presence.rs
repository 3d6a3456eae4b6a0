//! Per-day data presence facts for the `presence` command.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::classify::{AggregationKey, FileRecord};
use crate::constants::extract::PRESENCE_TIME_COLUMNS;
use crate::extract::{day_string, format_day, parse_epoch_seconds};
use crate::transport::table::Table;
use crate::types::{DayString, MetricName, ParticipantId, SiteId};

/// One `(site, participant, metric, day)` presence fact.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PresenceRow {
    /// Site segment.
    pub site: SiteId,
    /// Participant segment.
    pub participant_id: ParticipantId,
    /// Metric directory name.
    pub metric: MetricName,
    /// `YYYY-MM-DD` day with data.
    pub date: DayString,
}

/// Day encoded in the filename timestamp, if any.
pub fn days_from_filename(record: &FileRecord) -> BTreeSet<DayString> {
    record
        .timestamp
        .iter()
        .map(|timestamp| format_day(&timestamp.at.date()))
        .collect()
}

/// Days of the first present column among the known time columns.
pub fn days_from_contents(table: &Table) -> BTreeSet<DayString> {
    PRESENCE_TIME_COLUMNS
        .iter()
        .find_map(|name| table.column_index(name))
        .map(|idx| {
            table
                .column(idx)
                .filter_map(parse_epoch_seconds)
                .map(|at| day_string(&at))
                .collect()
        })
        .unwrap_or_default()
}

/// Deduplicating, ordered collection of presence rows.
#[derive(Clone, Debug, Default)]
pub struct PresenceSet {
    rows: BTreeSet<PresenceRow>,
}

impl PresenceSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one row per day for `key`.
    pub fn extend(&mut self, key: &AggregationKey, days: BTreeSet<DayString>) {
        self.rows.extend(days.into_iter().map(|date| PresenceRow {
            site: key.site.clone(),
            participant_id: key.participant.clone(),
            metric: key.metric.clone(),
            date,
        }));
    }

    /// Distinct rows collected.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows were collected.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in `(site, participant, metric, date)` order.
    pub fn into_rows(self) -> Vec<PresenceRow> {
        self.rows.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contents_use_first_known_time_column() {
        let table = Table::from_reader(
            "time,value.time\n1700090000,1700000000\n1700000000,bad\n".as_bytes(),
        )
        .unwrap();
        // `value.time` comes before `time` in lookup order.
        let days: Vec<DayString> = days_from_contents(&table).into_iter().collect();
        assert_eq!(days, vec!["2023-11-14"]);

        let none = Table::from_reader("value.steps\n3\n".as_bytes()).unwrap();
        assert!(days_from_contents(&none).is_empty());
    }

    #[test]
    fn presence_rows_are_deduplicated_and_sorted() {
        let mut set = PresenceSet::new();
        let key = AggregationKey::new("S1", "P2", "sensorkit_steps");
        set.extend(&key, ["2023-11-15".to_string(), "2023-11-14".to_string()].into());
        set.extend(&key, ["2023-11-14".to_string()].into());
        set.extend(
            &AggregationKey::new("S1", "P1", "sensorkit_steps"),
            ["2023-11-20".to_string()].into(),
        );
        let rows = set.into_rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].participant_id, "P1");
        assert_eq!(rows[1].date, "2023-11-14");
    }
}

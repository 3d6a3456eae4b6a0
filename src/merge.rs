//! Column-union concatenation of a key's exports for the `merge` command.

use std::collections::HashMap;

use crate::classify::{AggregationKey, FileTimestamp};
use crate::constants::writer::MERGE_EXTRA_COLUMNS;
use crate::extract::format_instant;
use crate::transport::table::Table;
use crate::types::ColumnName;
use crate::writer::WideTable;

/// One input file's contribution to a merged table.
#[derive(Clone, Debug)]
struct MergedPart {
    table: Table,
    /// Values for `file_timestamp`, `site`, `participant_id`.
    extras: [String; 3],
}

/// Collects tables of a single `(site, participant, metric)` key.
///
/// The output column set is the union of every header in first-seen order,
/// followed by whichever provenance columns the inputs did not already carry.
/// A provenance column that already exists is overwritten.
#[derive(Clone, Debug)]
pub struct TableMerger {
    key: AggregationKey,
    parts: Vec<MergedPart>,
}

impl TableMerger {
    /// Empty merger for `key`.
    pub fn new(key: AggregationKey) -> Self {
        Self {
            key,
            parts: Vec::new(),
        }
    }

    /// Key whose files are being merged.
    pub fn key(&self) -> &AggregationKey {
        &self.key
    }

    /// True until a table is appended.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Add one file's table; callers append in timestamp order.
    pub fn append(&mut self, timestamp: &FileTimestamp, table: Table) {
        self.parts.push(MergedPart {
            table,
            extras: [
                format_instant(&timestamp.at),
                self.key.site.clone(),
                self.key.participant.clone(),
            ],
        });
    }

    /// Concatenate the appended tables under the union header.
    pub fn finish(self) -> WideTable {
        let mut headers: Vec<ColumnName> = Vec::new();
        let mut positions: HashMap<ColumnName, usize> = HashMap::new();
        let mut position_of = |name: &str, headers: &mut Vec<ColumnName>| -> usize {
            *positions.entry(name.to_string()).or_insert_with(|| {
                headers.push(name.to_string());
                headers.len() - 1
            })
        };

        let mut layouts = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            let columns: Vec<usize> = part
                .table
                .headers()
                .iter()
                .map(|name| position_of(name, &mut headers))
                .collect();
            layouts.push(columns);
        }
        let extra_columns: Vec<usize> = MERGE_EXTRA_COLUMNS
            .iter()
            .map(|name| position_of(name, &mut headers))
            .collect();

        let mut rows = Vec::new();
        for (part, columns) in self.parts.iter().zip(&layouts) {
            for record in part.table.rows() {
                let mut row = vec![String::new(); headers.len()];
                for (source, &target) in columns.iter().enumerate() {
                    row[target] = Table::cell(record, source).to_string();
                }
                for (value, &target) in part.extras.iter().zip(&extra_columns) {
                    row[target] = value.clone();
                }
                rows.push(row);
            }
        }
        WideTable { headers, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn table(csv: &str) -> Table {
        Table::from_reader(csv.as_bytes()).unwrap()
    }

    fn stamp(hour: u32) -> FileTimestamp {
        FileTimestamp {
            at: NaiveDate::from_ymd_opt(2023, 8, 14)
                .unwrap()
                .and_hms_opt(hour, 30, 0)
                .unwrap(),
            index: None,
        }
    }

    #[test]
    fn union_of_headers_with_provenance_at_the_end() {
        let mut merger = TableMerger::new(AggregationKey::new("S1", "P1", "steps"));
        merger.append(&stamp(9), table("value.time,value.steps\n1700000000,12\n"));
        merger.append(&stamp(10), table("value.time,value.device\n1700000060,watch\n"));

        let merged = merger.finish();
        assert_eq!(
            merged.headers,
            vec![
                "value.time",
                "value.steps",
                "value.device",
                "file_timestamp",
                "site",
                "participant_id"
            ]
        );
        assert_eq!(
            merged.rows[0],
            vec!["1700000000", "12", "", "2023-08-14T09:30:00", "S1", "P1"]
        );
        assert_eq!(
            merged.rows[1],
            vec!["1700000060", "", "watch", "2023-08-14T10:30:00", "S1", "P1"]
        );
    }

    #[test]
    fn existing_provenance_columns_are_overwritten() {
        let mut merger = TableMerger::new(AggregationKey::new("S1", "P1", "steps"));
        merger.append(&stamp(9), table("site,value.time\nother,1700000000\n"));
        let merged = merger.finish();
        assert_eq!(
            merged.headers,
            vec!["site", "value.time", "file_timestamp", "participant_id"]
        );
        assert_eq!(merged.rows[0][0], "S1");
    }
}

use chrono::NaiveDateTime;
use tracing::warn;

use crate::errors::AggregateError;
use crate::extract::{parse_epoch_seconds, parse_numeric};
use crate::flags::{FeatureExtraction, FeatureSpec};
use crate::transport::table::Table;

/// One matched row of a feature: the row's instant and its value, if numeric.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureObservation {
    /// Instant from the feature's time column.
    pub at: NaiveDateTime,
    /// `None` when the extraction cell is not a finite number.
    pub value: Option<f64>,
}

/// First feature (in declaration order) whose source occurs in `path`.
pub fn feature_for_path<'a>(features: &'a [FeatureSpec], path: &str) -> Option<&'a FeatureSpec> {
    features
        .iter()
        .find(|feature| path.contains(feature.source.as_str()))
}

fn required_column(table: &Table, name: &str) -> Result<usize, AggregateError> {
    table
        .column_index(name)
        .ok_or_else(|| AggregateError::MissingColumn(name.to_string()))
}

/// Extract a feature's observations from a table.
///
/// Rows are kept when they pass the categorical filter (if any) and carry a
/// valid Unix-seconds time. Non-numeric values are kept as `None` so they
/// still count as entries.
pub fn extract_feature(
    spec: &FeatureSpec,
    table: &Table,
) -> Result<Vec<FeatureObservation>, AggregateError> {
    let filter = match &spec.extraction {
        FeatureExtraction::Filtered {
            filter_field,
            filter_value,
            ..
        } => Some((required_column(table, filter_field)?, filter_value.as_str())),
        FeatureExtraction::Direct { .. } => None,
    };
    let time_idx = required_column(table, &spec.time_field)?;
    let value_idx = required_column(table, spec.extraction_field())?;

    let mut observations = Vec::new();
    for row in table.rows() {
        if let Some((filter_idx, expected)) = filter {
            if Table::cell(row, filter_idx) != expected {
                continue;
            }
        }
        let Some(at) = parse_epoch_seconds(Table::cell(row, time_idx)) else {
            continue;
        };
        let raw = Table::cell(row, value_idx);
        let value = parse_numeric(raw);
        if value.is_none() {
            warn!(feature = %spec.name, value = raw, "non-numeric value encountered");
        }
        observations.push(FeatureObservation { at, value });
    }
    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::parse_feature;
    use csv::StringRecord;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter().map(|row| StringRecord::from(row.to_vec())).collect(),
        )
    }

    #[test]
    fn filtered_feature_keeps_matching_rows_only() {
        let spec = parse_feature("steps:typed_data:value.time:value.key:Steps:value.intVal").unwrap();
        let table = table(
            &["value.time", "value.key", "value.intVal"],
            &[
                &["1700000000", "Steps", "120"],
                &["1700000060", "HeartRate", "71"],
                &["1700000120", "Steps", "n/a"],
                &["garbage", "Steps", "50"],
            ],
        );
        let observations = extract_feature(&spec, &table).unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].value, Some(120.0));
        assert_eq!(observations[1].value, None);
    }

    #[test]
    fn direct_feature_reads_every_row() {
        let spec = parse_feature("sleep:sleep_tracker:value.time:value.duration:hours").unwrap();
        let table = table(
            &["value.time", "value.duration"],
            &[&["1700000000", "7.5"], &["1700086400", "6"]],
        );
        let values: Vec<Option<f64>> = extract_feature(&spec, &table)
            .unwrap()
            .into_iter()
            .map(|o| o.value)
            .collect();
        assert_eq!(values, vec![Some(7.5), Some(6.0)]);
    }

    #[test]
    fn missing_columns_are_reported() {
        let spec = parse_feature("steps:typed_data:value.time:value.key:Steps:value.intVal").unwrap();
        let table = table(&["value.time", "value.intVal"], &[&["1700000000", "1"]]);
        assert!(matches!(
            extract_feature(&spec, &table),
            Err(AggregateError::MissingColumn(column)) if column == "value.key"
        ));
    }

    #[test]
    fn first_declared_feature_wins_for_a_path() {
        let features = vec![
            parse_feature("steps:typed_data:value.time:value.key:Steps:value.intVal").unwrap(),
            parse_feature("hr:typed_data:value.time:value.key:HeartRate:value.intVal").unwrap(),
        ];
        let matched = feature_for_path(&features, "/m/S/P/typed_data/typed_data.csv.gz").unwrap();
        assert_eq!(matched.name, "steps");
        assert!(feature_for_path(&features, "/m/S/P/other/other.csv.gz").is_none());
    }
}

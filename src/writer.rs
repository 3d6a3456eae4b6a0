//! Artifact persistence: stats snapshots, summary documents, merged metric
//! tables, and presence listings.
//!
//! Every artifact is staged in a temporary file beside its destination and
//! renamed into place, so readers only ever observe complete files.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use parquet::basic::{Compression, ConvertedType, Repetition, Type as PhysicalType};
use parquet::data_type::{ByteArray, ByteArrayType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::{Field, Row};
use parquet::schema::parser::parse_message_type;
use parquet::schema::types::{Type, TypePtr};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::OutputFormat;
use crate::constants::writer::{
    ALL_SITES_STEM, PRESENCE_COLUMNS, SITE_STATS_SUFFIX, STATS_PARQUET_SCHEMA,
};
use crate::errors::AggregateError;
use crate::presence::PresenceRow;
use crate::store::StatsRow;
use crate::types::ColumnName;

/// Stage `path` in a sibling temp file, then rename it into place.
fn write_atomically<F>(path: &Path, write: F) -> Result<(), AggregateError>
where
    F: FnOnce(&mut File) -> Result<(), AggregateError>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    write(temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| AggregateError::Io(err.error))?;
    debug!(path = %path.display(), "artifact persisted");
    Ok(())
}

fn writer_properties() -> Arc<WriterProperties> {
    Arc::new(
        WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build(),
    )
}

fn write_gz_csv<T: Serialize>(file: &mut File, rows: &[T]) -> Result<(), AggregateError> {
    let encoder = GzEncoder::new(BufWriter::new(file), flate2::Compression::default());
    let mut writer = csv::Writer::from_writer(encoder);
    for row in rows {
        writer.serialize(row)?;
    }
    let encoder = writer.into_inner().map_err(|err| AggregateError::Io(err.into_error()))?;
    encoder.finish()?.flush()?;
    Ok(())
}

/// Split optional strings into parquet values plus definition levels.
fn optional_byte_arrays<'a>(
    values: impl Iterator<Item = Option<&'a str>>,
) -> (Vec<ByteArray>, Vec<i16>) {
    let mut present = Vec::new();
    let mut levels = Vec::new();
    for value in values {
        match value {
            Some(value) => {
                present.push(ByteArray::from(value));
                levels.push(1);
            }
            None => levels.push(0),
        }
    }
    (present, levels)
}

/// Values of one parquet column, in schema order.
enum ColumnValues {
    Text(Vec<ByteArray>),
    OptionalText(Vec<ByteArray>, Vec<i16>),
    Count(Vec<i64>),
}

fn count_value(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn stats_columns(rows: &[StatsRow]) -> Vec<ColumnValues> {
    let text = |pick: fn(&StatsRow) -> &str| {
        ColumnValues::Text(rows.iter().map(|row| ByteArray::from(pick(row))).collect())
    };
    let optional = |pick: fn(&StatsRow) -> Option<&str>| {
        let (values, levels) = optional_byte_arrays(rows.iter().map(pick));
        ColumnValues::OptionalText(values, levels)
    };
    let count = |pick: fn(&StatsRow) -> u64| {
        ColumnValues::Count(rows.iter().map(|row| count_value(pick(row))).collect())
    };
    vec![
        text(|row| row.site.as_str()),
        text(|row| row.participant.as_str()),
        text(|row| row.metric.as_str()),
        count(|row| row.row_count),
        optional(|row| row.start_date.as_deref()),
        optional(|row| row.end_date.as_deref()),
        count(|row| row.day_count),
    ]
}

fn write_stats_parquet(file: &mut File, rows: &[StatsRow]) -> Result<(), AggregateError> {
    let schema = Arc::new(parse_message_type(STATS_PARQUET_SCHEMA)?);
    let mut writer = SerializedFileWriter::new(file, schema, writer_properties())?;
    let mut row_group = writer.next_row_group()?;
    let mut columns = stats_columns(rows).into_iter();
    while let Some(mut column) = row_group.next_column()? {
        let values = columns.next().ok_or_else(|| {
            AggregateError::Configuration("stats schema has more columns than values".into())
        })?;
        match values {
            ColumnValues::Text(values) => {
                column.typed::<ByteArrayType>().write_batch(&values, None, None)?;
            }
            ColumnValues::OptionalText(values, levels) => {
                column
                    .typed::<ByteArrayType>()
                    .write_batch(&values, Some(levels.as_slice()), None)?;
            }
            ColumnValues::Count(values) => {
                column.typed::<Int64Type>().write_batch(&values, None, None)?;
            }
        }
        column.close()?;
    }
    row_group.close()?;
    writer.close()?;
    Ok(())
}

fn stats_row_from_parquet(row: &Row) -> Result<StatsRow, String> {
    let mut texts: BTreeMap<&str, Option<String>> = BTreeMap::new();
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for (name, field) in row.get_column_iter() {
        match field {
            Field::Str(value) => {
                texts.insert(name.as_str(), Some(value.clone()));
            }
            Field::Null => {
                texts.insert(name.as_str(), None);
            }
            Field::Long(value) => {
                let count = u64::try_from(*value).map_err(|_| format!("negative {name}"))?;
                counts.insert(name.as_str(), count);
            }
            other => return Err(format!("unexpected value {other} in column {name}")),
        }
    }
    let mut required = |name: &str| {
        texts
            .remove(name)
            .flatten()
            .ok_or_else(|| format!("column {name} is missing"))
    };
    let site = required("site")?;
    let participant = required("participant")?;
    let metric = required("metric")?;
    let count = |name: &str| {
        counts
            .get(name)
            .copied()
            .ok_or_else(|| format!("column {name} is missing"))
    };
    Ok(StatsRow {
        site,
        participant,
        metric,
        row_count: count("row_count")?,
        start_date: texts.get("start_date").cloned().flatten(),
        end_date: texts.get("end_date").cloned().flatten(),
        day_count: count("day_count")?,
    })
}

/// Writes per-site and combined stats artifacts after each directory unit.
#[derive(Clone, Debug)]
pub struct IncrementalWriter {
    output_dir: PathBuf,
    format: OutputFormat,
}

impl IncrementalWriter {
    /// Writer targeting `output_dir` in `format`.
    pub fn new(output_dir: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            output_dir: output_dir.into(),
            format,
        }
    }

    /// Directory artifacts are written to.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<output_dir>/<SITE>_stats.<ext>`
    pub fn site_path(&self, site: &str) -> PathBuf {
        self.output_dir
            .join(format!("{site}{SITE_STATS_SUFFIX}.{}", self.format.extension()))
    }

    /// `<output_dir>/all_sites.<ext>`
    pub fn all_sites_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{ALL_SITES_STEM}.{}", self.format.extension()))
    }

    /// Rewrite every site artifact plus the combined artifact from `rows`.
    ///
    /// `rows` must already be sorted by `(site, participant, metric)`.
    /// Returns the number of artifacts written; an empty slice writes nothing.
    pub fn flush(&self, rows: &[StatsRow]) -> Result<usize, AggregateError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut by_site: BTreeMap<&str, Vec<StatsRow>> = BTreeMap::new();
        for row in rows {
            by_site.entry(row.site.as_str()).or_default().push(row.clone());
        }
        for (site, site_rows) in &by_site {
            self.write_rows(&self.site_path(site), site_rows)?;
        }
        self.write_rows(&self.all_sites_path(), rows)?;
        info!(
            sites = by_site.len(),
            rows = rows.len(),
            format = %self.format,
            "[mhm:stats] snapshot flushed"
        );
        Ok(by_site.len() + 1)
    }

    fn write_rows(&self, path: &Path, rows: &[StatsRow]) -> Result<(), AggregateError> {
        write_atomically(path, |file| match self.format {
            OutputFormat::Csv => write_gz_csv(file, rows),
            OutputFormat::Parquet => write_stats_parquet(file, rows),
        })
    }

    /// Read back the combined artifact of a previous run, if one exists.
    pub fn load_snapshot(&self) -> Result<Vec<StatsRow>, AggregateError> {
        let path = self.all_sites_path();
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let snapshot_error = |reason: String| AggregateError::Snapshot {
            path: path.clone(),
            reason,
        };
        let file = File::open(&path)?;
        match self.format {
            OutputFormat::Csv => {
                let decoder = MultiGzDecoder::new(BufReader::new(file));
                let mut reader = csv::Reader::from_reader(decoder);
                reader
                    .deserialize::<StatsRow>()
                    .map(|row| row.map_err(|err| snapshot_error(err.to_string())))
                    .collect()
            }
            OutputFormat::Parquet => {
                let reader =
                    SerializedFileReader::new(file).map_err(|err| snapshot_error(err.to_string()))?;
                let rows = reader
                    .get_row_iter(None)
                    .map_err(|err| snapshot_error(err.to_string()))?;
                rows.map(|row| {
                    let row = row.map_err(|err| snapshot_error(err.to_string()))?;
                    stats_row_from_parquet(&row).map_err(snapshot_error)
                })
                .collect()
            }
        }
    }
}

/// Write one summary document as pretty-printed JSON.
pub fn write_summary_document<T: Serialize>(path: &Path, document: &T) -> Result<(), AggregateError> {
    write_atomically(path, |file| {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, document)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    })
}

/// Column-union table built by the merge command; empty cells are nulls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WideTable {
    /// Column names.
    pub headers: Vec<ColumnName>,
    /// Rows aligned to `headers`; empty strings are missing cells.
    pub rows: Vec<Vec<String>>,
}

fn merged_schema(headers: &[ColumnName]) -> Result<TypePtr, AggregateError> {
    let fields = headers
        .iter()
        .map(|name| {
            Type::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
                .with_repetition(Repetition::OPTIONAL)
                .with_converted_type(ConvertedType::UTF8)
                .build()
                .map(Arc::new)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Arc::new(
        Type::group_type_builder("mhm_merged")
            .with_fields(fields)
            .build()?,
    ))
}

fn write_wide_parquet(file: &mut File, table: &WideTable) -> Result<(), AggregateError> {
    let schema = merged_schema(&table.headers)?;
    let mut writer = SerializedFileWriter::new(file, schema, writer_properties())?;
    let mut row_group = writer.next_row_group()?;
    let mut position = 0;
    while let Some(mut column) = row_group.next_column()? {
        let (values, levels) = optional_byte_arrays(table.rows.iter().map(|row| {
            row.get(position)
                .map(String::as_str)
                .filter(|cell| !cell.is_empty())
        }));
        column
            .typed::<ByteArrayType>()
            .write_batch(&values, Some(levels.as_slice()), None)?;
        column.close()?;
        position += 1;
    }
    row_group.close()?;
    writer.close()?;
    Ok(())
}

fn write_wide_csv(file: &mut File, table: &WideTable) -> Result<(), AggregateError> {
    let encoder = GzEncoder::new(BufWriter::new(file), flate2::Compression::default());
    let mut writer = csv::Writer::from_writer(encoder);
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    let encoder = writer.into_inner().map_err(|err| AggregateError::Io(err.into_error()))?;
    encoder.finish()?.flush()?;
    Ok(())
}

/// Write a merged metric table in the requested format.
pub fn write_wide_table(
    path: &Path,
    format: OutputFormat,
    table: &WideTable,
) -> Result<(), AggregateError> {
    write_atomically(path, |file| match format {
        OutputFormat::Csv => write_wide_csv(file, table),
        OutputFormat::Parquet => write_wide_parquet(file, table),
    })
}

/// Write presence rows as plain CSV with a header, even when empty.
pub fn write_presence(path: &Path, rows: &[PresenceRow]) -> Result<(), AggregateError> {
    write_atomically(path, |file| {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));
        writer.write_record(PRESENCE_COLUMNS)?;
        for row in rows {
            writer.serialize(row)?;
        }
        let mut inner = writer
            .into_inner()
            .map_err(|err| AggregateError::Io(err.into_error()))?;
        inner.flush()?;
        Ok(())
    })
}

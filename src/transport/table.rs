use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use flate2::read::MultiGzDecoder;

use crate::errors::AggregateError;

/// Fully decoded gzip CSV table.
///
/// Rows are materialized eagerly so a decode or parse failure surfaces
/// before any row is handed to an extractor.
#[derive(Clone, Debug, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<StringRecord>,
}

impl Table {
    /// Build a table from headers and rows (mainly for tests and merges).
    pub fn new(headers: Vec<String>, rows: Vec<StringRecord>) -> Self {
        Self { headers, rows }
    }

    /// Read and decode a `.csv.gz` file.
    pub fn read_gz(path: &Path) -> Result<Self, AggregateError> {
        let file = File::open(path).map_err(|err| AggregateError::unreadable(path, err))?;
        Self::from_reader(MultiGzDecoder::new(BufReader::new(file)))
            .map_err(|err| AggregateError::unreadable(path, err))
    }

    /// Parse CSV from any reader. Ragged rows are accepted.
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, csv::Error> {
        let mut reader = ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
        Ok(Self { headers, rows })
    }

    /// Header row.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows.
    pub fn rows(&self) -> &[StringRecord] {
        &self.rows
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of the first column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Cell text; missing cells in short rows read as empty.
    pub fn cell<'a>(row: &'a StringRecord, idx: usize) -> &'a str {
        row.get(idx).unwrap_or("")
    }

    /// Iterate one column's cells, in row order.
    pub fn column<'a>(&'a self, idx: usize) -> impl Iterator<Item = &'a str> + 'a {
        self.rows.iter().map(move |row| Self::cell(row, idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_gz(path: &Path, body: &str) {
        let file = File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(body.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn reads_gzip_csv_with_ragged_rows() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("20230814_0930.csv.gz");
        write_gz(&path, "value.time,value.intVal\n1700000000,4\n1700003600\n");

        let table = Table::read_gz(&path).unwrap();
        assert_eq!(table.headers(), ["value.time", "value.intVal"]);
        assert_eq!(table.row_count(), 2);
        let idx = table.column_index("value.intVal").unwrap();
        assert_eq!(table.column(idx).collect::<Vec<_>>(), vec!["4", ""]);
    }

    #[test]
    fn reads_every_member_of_a_concatenated_gzip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("20230814_0930.csv.gz");
        let mut bytes = Vec::new();
        for body in ["value.time,v\n1700000000,1\n", "1700003600,2\n1700090000,3\n"] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(body.as_bytes()).unwrap();
            bytes.extend(encoder.finish().unwrap());
        }
        std::fs::write(&path, bytes).unwrap();

        let table = Table::read_gz(&path).unwrap();
        assert_eq!(table.headers(), ["value.time", "v"]);
        assert_eq!(table.row_count(), 3);
        let idx = table.column_index("v").unwrap();
        assert_eq!(table.column(idx).collect::<Vec<_>>(), vec!["1", "2", "3"]);
    }

    #[test]
    fn non_gzip_content_is_unreadable() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("broken.csv.gz");
        std::fs::write(&path, b"value.time\n1700000000\n").unwrap();
        assert!(matches!(
            Table::read_gz(&path),
            Err(AggregateError::Unreadable { .. })
        ));
    }
}

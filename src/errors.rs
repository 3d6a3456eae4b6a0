use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error type for configuration, table IO, and snapshot persistence failures.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Filesystem failure outside per-file reads.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// CSV encoding or decoding failure.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// Parquet encoding or decoding failure.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    /// JSON serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Directory traversal failure.
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    /// Invalid run configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Extraction flag that does not fit its grammar.
    #[error("invalid {kind} flag '{value}': {reason}")]
    InvalidFlag {
        /// Flag family (`feature`, `questionnaire`, ...).
        kind: &'static str,
        /// Raw flag value.
        value: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Output format other than csv or parquet.
    #[error("unsupported output format '{0}' (expected csv or parquet)")]
    UnsupportedFormat(String),
    /// Column a recipe needs is absent from the table.
    #[error("column '{0}' is missing")]
    MissingColumn(String),
    /// Input file that could not be opened or decoded.
    #[error("unreadable file {}: {reason}", path.display())]
    Unreadable {
        /// File that failed.
        path: PathBuf,
        /// Underlying error text.
        reason: String,
    },
    /// Previous artifact that could not be read back.
    #[error("snapshot {} could not be restored: {reason}", path.display())]
    Snapshot {
        /// Artifact that failed.
        path: PathBuf,
        /// Underlying error text.
        reason: String,
    },
}

impl AggregateError {
    pub(crate) fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Unreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

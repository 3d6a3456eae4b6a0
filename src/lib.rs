#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Key classification of export paths.
pub mod classify;
/// Command-line front end shared by the binary.
pub mod cli;
/// Engine, summary, and presence configuration types.
pub mod config;
/// Centralized constants used across classification, extraction, and writers.
pub mod constants;
/// Traversal drivers for the stats, summary, merge, and presence commands.
pub mod engine;
/// Per-file fact, feature, and questionnaire extraction.
pub mod extract;
/// Colon-delimited extraction flag parsers.
pub mod flags;
/// Include/exclude path segment filtering.
pub mod filter;
/// Column-union merging of a key's exports.
pub mod merge;
/// Daily presence listings.
pub mod presence;
/// Aggregate store and numeric accumulators.
pub mod store;
/// Summary document buckets.
pub mod summary;
/// Input transports (filesystem walking, gzip CSV tables).
pub mod transport;
/// Shared type aliases.
pub mod types;
/// Atomic artifact writers.
pub mod writer;

mod errors;

pub use classify::{AggregationKey, Classification, FileRecord, KeyLayout, PathClassifier};
pub use config::{EngineConfig, OutputFormat, PresenceConfig, SummaryConfig, TimeResolution};
pub use engine::{RunReport, run_merge, run_presence, run_stats, run_summary};
pub use errors::AggregateError;
pub use extract::{ExtractedFacts, extract_facts};
pub use filter::SegmentFilter;
pub use store::{AggregateRecord, AggregateStore, NumericAccumulator, NumericSummary, StatsRow};
pub use summary::{SummaryDocument, SummaryStore};
pub use types::{
    ColumnName, DayString, DomainLabel, FeatureName, MetricName, ParticipantId, PathSegment,
    SiteId, TimeKey,
};
pub use writer::IncrementalWriter;

//! Traversal drivers for the four commands.
//!
//! Each driver walks the input tree one directory at a time. Per-file
//! failures are logged and counted; only configuration and artifact write
//! failures abort a run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::classify::{AggregationKey, Classification, FileRecord, KeyLayout, PathClassifier};
use crate::config::{EngineConfig, PresenceConfig, SummaryConfig};
use crate::constants::writer::PRESENCE_FILE_NAME;
use crate::errors::AggregateError;
use crate::extract::extract_facts;
use crate::extract::features::{extract_feature, feature_for_path};
use crate::extract::questionnaire::{histogram_answers, response_times, slider_answers};
use crate::filter::SegmentFilter;
use crate::merge::TableMerger;
use crate::presence::{PresenceSet, days_from_contents, days_from_filename};
use crate::store::AggregateStore;
use crate::summary::SummaryStore;
use crate::transport::fs::DirectoryWalker;
use crate::transport::table::Table;
use crate::writer::{IncrementalWriter, write_presence, write_summary_document, write_wide_table};

/// Counters describing one finished run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Directory units visited.
    pub directories: usize,
    /// Files read and folded into the run's output.
    pub files_processed: usize,
    /// Files passed over by classification, filtering, or resume.
    pub files_skipped: usize,
    /// Files that could not be read or decoded.
    pub files_failed: usize,
    /// Output files written or replaced.
    pub artifacts_written: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} directories, {} files processed, {} skipped, {} failed, {} artifacts written",
            self.directories,
            self.files_processed,
            self.files_skipped,
            self.files_failed,
            self.artifacts_written
        )
    }
}

fn segment_filter(config: &EngineConfig) -> SegmentFilter {
    SegmentFilter::new(config.include.iter().cloned(), config.exclude.iter().cloned())
}

fn walker(config: &EngineConfig, filter: SegmentFilter) -> DirectoryWalker {
    DirectoryWalker::new(&config.input_dir, filter).with_follow_symlinks(config.follow_links)
}

/// Classify and filter one path, counting it as skipped when rejected.
fn admit(
    classifier: &PathClassifier,
    filter: &SegmentFilter,
    path: &std::path::Path,
    report: &mut RunReport,
) -> Option<FileRecord> {
    let record = match classifier.classify(path) {
        Classification::Classified(record) => record,
        Classification::Unclassifiable | Classification::InvalidTimestamp => {
            report.files_skipped += 1;
            return None;
        }
    };
    if !filter.admits(&record.segments) {
        debug!(path = %path.display(), "excluded by include/exclude filter");
        report.files_skipped += 1;
        return None;
    }
    Some(record)
}

fn read_table(record: &FileRecord, report: &mut RunReport) -> Option<Table> {
    match Table::read_gz(&record.path) {
        Ok(table) => Some(table),
        Err(err) => {
            error!(path = %record.path.display(), error = %err, "failed reading file");
            report.files_failed += 1;
            None
        }
    }
}

/// Aggregate row/day coverage per `(site, participant, metric)` and flush the
/// snapshot after every directory that produced facts.
pub fn run_stats(config: &EngineConfig) -> Result<RunReport, AggregateError> {
    config.validate()?;
    let writer = IncrementalWriter::new(&config.output_dir, config.output_format);
    let mut store = AggregateStore::new();
    if !config.update {
        store.restore(writer.load_snapshot()?);
        if store.restored_len() > 0 {
            info!(
                keys = store.restored_len(),
                snapshot = %writer.all_sites_path().display(),
                "[mhm:stats] resuming from previous snapshot"
            );
        }
    }

    let filter = segment_filter(config);
    let classifier = PathClassifier::new(&config.input_dir);
    let mut report = RunReport::default();

    for unit in walker(config, filter.clone()).units() {
        report.directories += 1;
        let mut produced = 0usize;
        for path in &unit.files {
            let Some(record) = admit(&classifier, &filter, path, &mut report) else {
                continue;
            };
            if store.is_restored(&record.key) {
                debug!(key = %record.key, "key already present in snapshot");
                report.files_skipped += 1;
                continue;
            }
            match extract_facts(&record) {
                Ok(facts) => {
                    for fact in &facts {
                        store.merge(fact);
                    }
                    produced += facts.len();
                    report.files_processed += 1;
                }
                Err(err) => {
                    error!(path = %record.path.display(), error = %err, "failed reading file");
                    report.files_failed += 1;
                }
            }
        }
        if produced > 0 {
            info!(
                dir = %unit.dir.display(),
                facts = produced,
                "[mhm:stats] directory produced new facts"
            );
            report.artifacts_written += writer.flush(&store.rows())?;
        }
    }

    info!("[mhm:stats] {report}");
    Ok(report)
}

/// Build per-(participant, time bucket) JSON summaries.
///
/// Keys use the tail layout so both raw and merged trees are accepted.
pub fn run_summary(
    config: &EngineConfig,
    summary: &SummaryConfig,
) -> Result<RunReport, AggregateError> {
    config.validate()?;
    if summary.is_empty() {
        return Err(AggregateError::Configuration(
            "summary needs at least one feature or questionnaire flag".into(),
        ));
    }

    let filter = segment_filter(config);
    let classifier = PathClassifier::new(&config.input_dir).with_layout(KeyLayout::Tail);
    let mut store = SummaryStore::new(summary);
    let mut report = RunReport::default();

    for unit in walker(config, filter.clone()).units() {
        report.directories += 1;
        for path in &unit.files {
            let Some(record) = admit(&classifier, &filter, path, &mut report) else {
                continue;
            };
            let path_text = record.path.to_string_lossy();
            let feature = feature_for_path(&summary.features, &path_text);
            let questionnaire = summary
                .questionnaire
                .as_ref()
                .filter(|spec| path_text.contains(spec.file_filter.as_str()));
            let sliders: Vec<_> = summary
                .sliders
                .iter()
                .filter(|spec| path_text.contains(spec.file_filter.as_str()))
                .collect();
            let histograms: Vec<_> = summary
                .histograms
                .iter()
                .filter(|spec| path_text.contains(spec.file_filter.as_str()))
                .collect();
            if feature.is_none() && questionnaire.is_none() && sliders.is_empty() && histograms.is_empty()
            {
                report.files_skipped += 1;
                continue;
            }

            let Some(table) = read_table(&record, &mut report) else {
                continue;
            };
            let participant = record.key.participant.as_str();
            let site = Some(record.key.site.as_str()).filter(|site| !site.is_empty());

            if let Some(feature) = feature {
                match extract_feature(feature, &table) {
                    Ok(observations) => {
                        store.record_feature(participant, site, feature, &observations);
                        debug!(
                            feature = %feature.name,
                            participant,
                            observations = observations.len(),
                            "feature extracted"
                        );
                    }
                    Err(err) => {
                        warn!(path = %record.path.display(), feature = %feature.name, error = %err, "feature not extracted");
                    }
                }
            }
            if let Some(spec) = questionnaire {
                match response_times(spec, &table) {
                    Ok(times) => store.record_responses(participant, site, &times),
                    Err(err) => {
                        warn!(path = %record.path.display(), error = %err, "questionnaire responses not extracted");
                    }
                }
            }
            for spec in sliders {
                store.record_slider(participant, site, &spec.domain, &slider_answers(spec, &table));
            }
            for spec in histograms {
                store.record_histogram(
                    participant,
                    site,
                    &spec.domain,
                    &histogram_answers(spec, &table),
                );
            }
            report.files_processed += 1;
        }

        for (key, document) in store.take_dirty() {
            let path = config.output_dir.join(key.file_name());
            write_summary_document(&path, &document)?;
            report.artifacts_written += 1;
            info!(path = %path.display(), "[mhm:summary] wrote summary document");
        }
    }

    info!("[mhm:summary] {report}");
    Ok(report)
}

/// `OUT/SITE/PARTICIPANT/METRIC/METRIC.<ext>`
pub fn merged_output_path(config: &EngineConfig, key: &AggregationKey) -> PathBuf {
    config
        .output_dir
        .join(&key.site)
        .join(&key.participant)
        .join(&key.metric)
        .join(format!("{}.{}", key.metric, config.output_format.extension()))
}

/// Concatenate every timestamped export of a key into one table.
pub fn run_merge(config: &EngineConfig) -> Result<RunReport, AggregateError> {
    config.validate()?;
    let filter = segment_filter(config);
    let classifier = PathClassifier::new(&config.input_dir);
    let mut report = RunReport::default();

    let mut groups: BTreeMap<AggregationKey, Vec<FileRecord>> = BTreeMap::new();
    for unit in walker(config, filter.clone()).units() {
        report.directories += 1;
        for path in &unit.files {
            let Some(record) = admit(&classifier, &filter, path, &mut report) else {
                continue;
            };
            if record.timestamp.is_none() {
                debug!(path = %path.display(), "no filename timestamp, not merged");
                report.files_skipped += 1;
                continue;
            }
            groups.entry(record.key.clone()).or_default().push(record);
        }
    }

    info!(keys = groups.len(), "[mhm:merge] starting to process metrics");
    for (key, mut records) in groups {
        let output = merged_output_path(config, &key);
        if !config.update && output.exists() {
            info!(output = %output.display(), "[mhm:merge] output already exists, skipping");
            report.files_skipped += records.len();
            continue;
        }
        records.sort_by(|a, b| {
            let stamp = |r: &FileRecord| r.timestamp.map(|t| (t.at, t.index));
            stamp(a).cmp(&stamp(b)).then_with(|| a.path.cmp(&b.path))
        });

        let mut merger = TableMerger::new(key.clone());
        for record in &records {
            let (Some(timestamp), Some(table)) = (record.timestamp, read_table(record, &mut report))
            else {
                continue;
            };
            merger.append(&timestamp, table);
            report.files_processed += 1;
        }
        if merger.is_empty() {
            info!(key = %key, "[mhm:merge] no data to merge");
            continue;
        }
        write_wide_table(&output, config.output_format, &merger.finish())?;
        report.artifacts_written += 1;
        info!(output = %output.display(), "[mhm:merge] wrote merged table");
    }

    info!("[mhm:merge] {report}");
    Ok(report)
}

/// List which days have data for metrics matching a prefix.
pub fn run_presence(
    config: &EngineConfig,
    presence: &PresenceConfig,
) -> Result<RunReport, AggregateError> {
    config.validate()?;
    let filter = segment_filter(config);
    let classifier = PathClassifier::new(&config.input_dir).with_layout(KeyLayout::Tail);
    let mut rows = PresenceSet::new();
    let mut report = RunReport::default();

    for unit in walker(config, filter.clone()).units() {
        report.directories += 1;
        for path in &unit.files {
            let Some(record) = admit(&classifier, &filter, path, &mut report) else {
                continue;
            };
            if !record.key.metric.starts_with(presence.data_prefix.as_str()) {
                report.files_skipped += 1;
                continue;
            }
            let days = if presence.from_contents {
                let Some(table) = read_table(&record, &mut report) else {
                    continue;
                };
                days_from_contents(&table)
            } else {
                days_from_filename(&record)
            };
            rows.extend(&record.key, days);
            report.files_processed += 1;
        }
    }

    let output = config.output_dir.join(PRESENCE_FILE_NAME);
    let rows = rows.into_rows();
    write_presence(&output, &rows)?;
    report.artifacts_written += 1;
    info!(rows = rows.len(), output = %output.display(), "[mhm:presence] wrote presence listing");
    info!("[mhm:presence] {report}");
    Ok(report)
}

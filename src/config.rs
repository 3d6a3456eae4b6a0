use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime};

use crate::constants::writer::{CSV_EXTENSION, PARQUET_EXTENSION};
use crate::errors::AggregateError;
use crate::flags::{FeatureSpec, HistogramSpec, QuestionnaireSpec, SliderSpec};
use crate::types::{PathSegment, TimeKey};

/// Tabular format used for stats and merged-metric artifacts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Gzip-compressed CSV with a header row.
    #[default]
    Csv,
    /// Single row-group parquet file.
    Parquet,
}

impl OutputFormat {
    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => CSV_EXTENSION,
            OutputFormat::Parquet => PARQUET_EXTENSION,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = AggregateError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "parquet" => Ok(OutputFormat::Parquet),
            other => Err(AggregateError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Csv => f.write_str("csv"),
            OutputFormat::Parquet => f.write_str("parquet"),
        }
    }
}

/// Bucket width for summary documents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimeResolution {
    /// `YYYY-Www` (ISO week numbering).
    Week,
    /// `YYYY-MM`.
    #[default]
    Month,
    /// `YYYY`.
    Year,
}

impl TimeResolution {
    /// Bucket key for a timestamp.
    pub fn time_key(self, at: &NaiveDateTime) -> TimeKey {
        match self {
            TimeResolution::Week => {
                let iso = at.date().iso_week();
                format!("{}-W{:02}", iso.year(), iso.week())
            }
            TimeResolution::Month => at.format("%Y-%m").to_string(),
            TimeResolution::Year => at.format("%Y").to_string(),
        }
    }
}

impl FromStr for TimeResolution {
    type Err = AggregateError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(TimeResolution::Week),
            "month" => Ok(TimeResolution::Month),
            "year" => Ok(TimeResolution::Year),
            other => Err(AggregateError::Configuration(format!(
                "unsupported time resolution '{other}' (expected month, week, or year)"
            ))),
        }
    }
}

/// Split a comma-separated segment list, trimming items and dropping empties.
pub fn parse_segment_list(raw: Option<&str>) -> Vec<PathSegment> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Shared traversal and output settings for every engine command.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Root of the input tree.
    pub input_dir: PathBuf,
    /// Directory receiving artifacts (created on first write).
    pub output_dir: PathBuf,
    /// Segments that admit a file (empty admits everything).
    pub include: Vec<PathSegment>,
    /// Segments that exclude a file or prune a directory.
    pub exclude: Vec<PathSegment>,
    /// Tabular artifact format.
    pub output_format: OutputFormat,
    /// Reprocess keys even when output already exists.
    pub update: bool,
    /// Whether symlinks are followed while walking.
    pub follow_links: bool,
}

impl EngineConfig {
    /// Create a config with default filtering and csv output.
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            output_format: OutputFormat::Csv,
            update: false,
            follow_links: false,
        }
    }

    /// Set the include segment list.
    pub fn with_include(mut self, include: Vec<PathSegment>) -> Self {
        self.include = include;
        self
    }

    /// Set the exclude segment list.
    pub fn with_exclude(mut self, exclude: Vec<PathSegment>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Set the tabular output format.
    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    /// Force reprocessing regardless of existing output.
    pub fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    /// Control symlink traversal.
    pub fn with_follow_links(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    /// Fail early when the input root is missing.
    pub fn validate(&self) -> Result<(), AggregateError> {
        if !self.input_dir.is_dir() {
            return Err(AggregateError::Configuration(format!(
                "input directory {} does not exist",
                self.input_dir.display()
            )));
        }
        Ok(())
    }
}

/// Extraction recipe for the summary command.
#[derive(Clone, Debug, Default)]
pub struct SummaryConfig {
    /// Bucket width of summary documents.
    pub time_resolution: TimeResolution,
    /// Numeric features, in declaration order.
    pub features: Vec<FeatureSpec>,
    /// Simple questionnaire response counter.
    pub questionnaire: Option<QuestionnaireSpec>,
    /// Slider questionnaires (numeric statistics per domain).
    pub sliders: Vec<SliderSpec>,
    /// Histogram questionnaires (value tallies per domain and question).
    pub histograms: Vec<HistogramSpec>,
}

impl SummaryConfig {
    /// Set the bucket width.
    pub fn with_time_resolution(mut self, time_resolution: TimeResolution) -> Self {
        self.time_resolution = time_resolution;
        self
    }

    /// Append a feature, rejecting duplicate names.
    pub fn with_feature(mut self, feature: FeatureSpec) -> Result<Self, AggregateError> {
        if self.features.iter().any(|existing| existing.name == feature.name) {
            return Err(AggregateError::Configuration(format!(
                "feature '{}' is declared more than once",
                feature.name
            )));
        }
        self.features.push(feature);
        Ok(self)
    }

    /// Set the simple questionnaire counter.
    pub fn with_questionnaire(mut self, questionnaire: QuestionnaireSpec) -> Self {
        self.questionnaire = Some(questionnaire);
        self
    }

    /// Append a slider questionnaire.
    pub fn with_slider(mut self, slider: SliderSpec) -> Self {
        self.sliders.push(slider);
        self
    }

    /// Append a histogram questionnaire.
    pub fn with_histogram(mut self, histogram: HistogramSpec) -> Self {
        self.histograms.push(histogram);
        self
    }

    /// True when no extraction recipe is configured.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
            && self.questionnaire.is_none()
            && self.sliders.is_empty()
            && self.histograms.is_empty()
    }
}

/// Settings of the presence command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PresenceConfig {
    /// Only metric directories starting with this prefix are listed.
    pub data_prefix: String,
    /// Derive days from time columns instead of filename timestamps.
    pub from_contents: bool,
}

impl PresenceConfig {
    /// Filename-derived presence for metrics starting with `data_prefix`.
    pub fn new(data_prefix: impl Into<String>) -> Self {
        Self {
            data_prefix: data_prefix.into(),
            from_contents: false,
        }
    }

    /// Derive days from table contents instead of filenames.
    pub fn with_from_contents(mut self, from_contents: bool) -> Self {
        self.from_contents = from_contents;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn time_keys_follow_resolution() {
        let ts = at(2023, 8, 14);
        assert_eq!(TimeResolution::Month.time_key(&ts), "2023-08");
        assert_eq!(TimeResolution::Year.time_key(&ts), "2023");
        assert_eq!(TimeResolution::Week.time_key(&ts), "2023-W33");
    }

    #[test]
    fn week_keys_use_iso_year_at_boundaries() {
        // 2021-01-01 belongs to ISO week 53 of 2020.
        assert_eq!(TimeResolution::Week.time_key(&at(2021, 1, 1)), "2020-W53");
        assert_eq!(TimeResolution::Week.time_key(&at(2024, 12, 30)), "2025-W01");
    }

    #[test]
    fn output_format_parsing_rejects_unknown_values() {
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!(
            "parquet".parse::<OutputFormat>().unwrap(),
            OutputFormat::Parquet
        );
        assert!(matches!(
            "xlsx".parse::<OutputFormat>(),
            Err(AggregateError::UnsupportedFormat(value)) if value == "xlsx"
        ));
    }

    #[test]
    fn segment_lists_are_trimmed_and_skip_empties() {
        assert_eq!(
            parse_segment_list(Some(" P001, ,SITE1 ,")),
            vec!["P001".to_string(), "SITE1".to_string()]
        );
        assert!(parse_segment_list(None).is_empty());
    }
}

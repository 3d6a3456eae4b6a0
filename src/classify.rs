use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;
use tracing::{debug, warn};

use crate::constants::classify::{
    METRIC_INDEX, MIN_SEGMENTS, MIN_TAIL_SEGMENTS, PARTICIPANT_INDEX, SITE_INDEX,
    TIMESTAMP_FILENAME_PATTERN, TIMESTAMP_FORMAT,
};
use crate::constants::extract::DEVICE_SEPARATOR;
use crate::types::{MetricName, ParticipantId, PathSegment, SiteId};

/// `(site, participant, metric[/device])` identity of one aggregate line item.
///
/// Field order defines the ordering used for every written artifact.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AggregationKey {
    /// Site (study center) segment.
    pub site: SiteId,
    /// Participant segment.
    pub participant: ParticipantId,
    /// Metric directory name, with `/<device>` for device-split groups.
    pub metric: MetricName,
}

impl AggregationKey {
    /// Key from its three components.
    pub fn new(
        site: impl Into<SiteId>,
        participant: impl Into<ParticipantId>,
        metric: impl Into<MetricName>,
    ) -> Self {
        Self {
            site: site.into(),
            participant: participant.into(),
            metric: metric.into(),
        }
    }

    /// Key for one device group of this metric.
    pub fn with_device(&self, device: &str) -> Self {
        Self {
            site: self.site.clone(),
            participant: self.participant.clone(),
            metric: format!("{}{DEVICE_SEPARATOR}{device}", self.metric),
        }
    }

    /// Metric name with any `/device` suffix removed.
    pub fn base_metric(&self) -> &str {
        self.metric
            .split_once(DEVICE_SEPARATOR)
            .map(|(base, _)| base)
            .unwrap_or(&self.metric)
    }

    /// True when `self` is `other` or one of its device groups.
    pub fn derives_from(&self, other: &AggregationKey) -> bool {
        self.site == other.site
            && self.participant == other.participant
            && self.base_metric() == other.metric
    }
}

impl fmt::Display for AggregationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.site, self.participant, self.metric)
    }
}

/// Timestamp embedded in an export filename (`YYYYMMDD_HHMM[_index].csv.gz`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileTimestamp {
    /// Minute-resolution instant encoded in the filename.
    pub at: NaiveDateTime,
    /// Numbered suffix distinguishing exports of the same minute. Never part of a key.
    pub index: Option<u32>,
}

/// Outcome of matching a filename against the timestamp pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilenameTimestamp {
    /// Well-formed, valid timestamp.
    Parsed(FileTimestamp),
    /// Filename does not have the timestamp shape.
    Absent,
    /// Shape matched but the digits are not a valid calendar date/time.
    Invalid,
}

fn timestamp_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(TIMESTAMP_FILENAME_PATTERN).expect("timestamp filename pattern compiles")
    })
}

/// Parse the timestamp of an export filename.
pub fn parse_filename_timestamp(filename: &str) -> FilenameTimestamp {
    let Some(captures) = timestamp_regex().captures(filename) else {
        return FilenameTimestamp::Absent;
    };
    let Ok(at) = NaiveDateTime::parse_from_str(&captures[1], TIMESTAMP_FORMAT) else {
        return FilenameTimestamp::Invalid;
    };
    let index = captures.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
    FilenameTimestamp::Parsed(FileTimestamp { at, index })
}

/// One physical input file after classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Key derived from the path.
    pub key: AggregationKey,
    /// Filename timestamp, when the filename carries one.
    pub timestamp: Option<FileTimestamp>,
    /// Segments relative to the input root, filename last.
    pub segments: Vec<PathSegment>,
}

/// Result of classifying a path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Path maps to a key.
    Classified(FileRecord),
    /// Too few segments below the root (or not under the root at all).
    Unclassifiable,
    /// Filename timestamp digits do not form a valid date/time.
    InvalidTimestamp,
}

/// How key components are located in the relative path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyLayout {
    /// `<ignored>/SITE/PARTICIPANT/METRIC/...` by fixed index from the root.
    #[default]
    Positional,
    /// `.../SITE/PARTICIPANT/METRIC/FILENAME` anchored at the filename
    /// (merged trees); the site is optional.
    Tail,
}

/// Maps file paths under a root to aggregation keys.
#[derive(Clone, Debug)]
pub struct PathClassifier {
    root: PathBuf,
    layout: KeyLayout,
}

impl PathClassifier {
    /// Classifier for paths under `root`, using the positional layout.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            layout: KeyLayout::Positional,
        }
    }

    /// Override the key layout.
    pub fn with_layout(mut self, layout: KeyLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Input root paths are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path segments relative to the root, or `None` when `path` is outside it.
    pub fn relative_segments(&self, path: &Path) -> Option<Vec<PathSegment>> {
        let relative = path.strip_prefix(&self.root).ok()?;
        Some(
            relative
                .components()
                .filter_map(|component| match component {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .filter(|part| !part.is_empty())
                .collect(),
        )
    }

    /// Classify `path`, logging why a path is rejected.
    pub fn classify(&self, path: &Path) -> Classification {
        let Some(segments) = self.relative_segments(path) else {
            debug!(path = %path.display(), "path is outside the input root");
            return Classification::Unclassifiable;
        };
        let Some(key) = self.key_for(&segments) else {
            debug!(
                path = %path.display(),
                segments = segments.len(),
                "path does not have enough segments to classify"
            );
            return Classification::Unclassifiable;
        };
        let filename = segments.last().map(String::as_str).unwrap_or_default();
        let timestamp = match parse_filename_timestamp(filename) {
            FilenameTimestamp::Parsed(timestamp) => Some(timestamp),
            FilenameTimestamp::Absent => None,
            FilenameTimestamp::Invalid => {
                warn!(path = %path.display(), "timestamp format invalid in filename");
                return Classification::InvalidTimestamp;
            }
        };
        Classification::Classified(FileRecord {
            path: path.to_path_buf(),
            key,
            timestamp,
            segments,
        })
    }

    fn key_for(&self, segments: &[PathSegment]) -> Option<AggregationKey> {
        match self.layout {
            KeyLayout::Positional => {
                if segments.len() < MIN_SEGMENTS {
                    return None;
                }
                Some(AggregationKey::new(
                    segments[SITE_INDEX].clone(),
                    segments[PARTICIPANT_INDEX].clone(),
                    segments[METRIC_INDEX].clone(),
                ))
            }
            KeyLayout::Tail => {
                let len = segments.len();
                if len < MIN_TAIL_SEGMENTS {
                    return None;
                }
                let site = if len > MIN_TAIL_SEGMENTS {
                    segments[len - 4].clone()
                } else {
                    String::new()
                };
                Some(AggregationKey::new(
                    site,
                    segments[len - 3].clone(),
                    segments[len - 2].clone(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn classifies_positional_layout_with_timestamp() {
        let classifier = PathClassifier::new("/data/root");
        let Classification::Classified(record) =
            classifier.classify(Path::new("/data/root/x/SITE1/P001/steps/20230814_0930.csv.gz"))
        else {
            panic!("expected classification");
        };
        assert_eq!(record.key, AggregationKey::new("SITE1", "P001", "steps"));
        assert_eq!(
            record.timestamp,
            Some(FileTimestamp {
                at: ts(2023, 8, 14, 9, 30),
                index: None
            })
        );
        assert_eq!(record.segments.len(), 5);
    }

    #[test]
    fn numbered_suffix_is_recorded_but_not_keyed() {
        let classifier = PathClassifier::new("/r");
        let plain = classifier.classify(Path::new("/r/x/SITE1/P001/steps/20230814_0930.csv.gz"));
        let numbered =
            classifier.classify(Path::new("/r/x/SITE1/P001/steps/deep/20230814_0930_2.csv.gz"));
        let (Classification::Classified(plain), Classification::Classified(numbered)) =
            (plain, numbered)
        else {
            panic!("expected both to classify");
        };
        assert_eq!(plain.key, numbered.key);
        assert_eq!(plain.timestamp.map(|t| t.at), numbered.timestamp.map(|t| t.at));
        assert_eq!(numbered.timestamp.and_then(|t| t.index), Some(2));
    }

    #[test]
    fn too_few_segments_is_unclassifiable() {
        let classifier = PathClassifier::new("/r");
        assert_eq!(
            classifier.classify(Path::new("/r/SITE1/P001/20230814_0930.csv.gz")),
            Classification::Unclassifiable
        );
        assert_eq!(
            classifier.classify(Path::new("/elsewhere/a/b/c/d.csv.gz")),
            Classification::Unclassifiable
        );
    }

    #[test]
    fn filename_timestamp_shapes() {
        assert_eq!(
            parse_filename_timestamp("20231345_2561.csv.gz"),
            FilenameTimestamp::Invalid
        );
        assert_eq!(parse_filename_timestamp("export.csv.gz"), FilenameTimestamp::Absent);
        assert_eq!(
            parse_filename_timestamp("x20230814_0930.csv.gz"),
            FilenameTimestamp::Absent
        );
        assert_eq!(
            parse_filename_timestamp("20230814_0930.csv"),
            FilenameTimestamp::Absent
        );
    }

    #[test]
    fn invalid_timestamp_skips_file() {
        let classifier = PathClassifier::new("/r");
        assert_eq!(
            classifier.classify(Path::new("/r/x/S/P/m/20231345_2561.csv.gz")),
            Classification::InvalidTimestamp
        );
        assert!(matches!(
            classifier.classify(Path::new("/r/x/S/P/m/export.csv.gz")),
            Classification::Classified(FileRecord { timestamp: None, .. })
        ));
    }

    #[test]
    fn tail_layout_reads_from_filename_end() {
        let classifier = PathClassifier::new("/merged").with_layout(KeyLayout::Tail);
        let Classification::Classified(record) =
            classifier.classify(Path::new("/merged/SITE1/P001/steps/steps.csv.gz"))
        else {
            panic!("expected classification");
        };
        assert_eq!(record.key, AggregationKey::new("SITE1", "P001", "steps"));

        let Classification::Classified(short) =
            classifier.classify(Path::new("/merged/P001/steps/steps.csv.gz"))
        else {
            panic!("expected classification");
        };
        assert_eq!(short.key, AggregationKey::new("", "P001", "steps"));
    }

    #[test]
    fn device_keys_derive_from_base() {
        let base = AggregationKey::new("S", "P", "acc");
        let device = base.with_device("d1");
        assert_eq!(device.metric, "acc/d1");
        assert_eq!(device.base_metric(), "acc");
        assert!(device.derives_from(&base));
        assert!(base.derives_from(&base));
        assert!(!AggregationKey::new("S", "P", "acceleration").derives_from(&base));
    }
}

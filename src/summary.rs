//! Per-(participant, time bucket) summary documents for the `summary` command.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::Serialize;

use crate::config::{SummaryConfig, TimeResolution};
use crate::constants::writer::SUMMARY_EXTENSION;
use crate::extract::features::FeatureObservation;
use crate::extract::format_day;
use crate::extract::questionnaire::{HistogramAnswer, SliderAnswer};
use crate::flags::FeatureSpec;
use crate::store::{NumericAccumulator, NumericSummary};
use crate::types::{DayString, DomainLabel, FeatureName, ParticipantId, SiteId, TimeKey};

/// Identity of one summary document.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    /// Participant the document describes.
    pub participant: ParticipantId,
    /// Period key at the configured resolution.
    pub time_key: TimeKey,
}

impl BucketKey {
    /// `<participant>_<time_key>.json`
    pub fn file_name(&self) -> String {
        format!("{}_{}.{SUMMARY_EXTENSION}", self.participant, self.time_key)
    }
}

#[derive(Clone, Debug, Default)]
struct QuestionnaireTally {
    total_responses: u64,
    days: BTreeSet<NaiveDate>,
    slider: BTreeMap<DomainLabel, NumericAccumulator>,
    histogram: BTreeMap<DomainLabel, BTreeMap<String, BTreeMap<String, u64>>>,
}

/// Accumulated state behind one summary document.
#[derive(Clone, Debug)]
pub struct SummaryBucket {
    site: Option<SiteId>,
    features_available: BTreeSet<FeatureName>,
    features: IndexMap<FeatureName, NumericAccumulator>,
    questionnaire: QuestionnaireTally,
}

impl SummaryBucket {
    fn new(features: &[FeatureSpec]) -> Self {
        Self {
            site: None,
            features_available: BTreeSet::new(),
            features: features
                .iter()
                .map(|feature| (feature.name.clone(), NumericAccumulator::default()))
                .collect(),
            questionnaire: QuestionnaireTally::default(),
        }
    }

    /// Accumulator of a configured feature.
    pub fn feature(&self, name: &str) -> Option<&NumericAccumulator> {
        self.features.get(name)
    }

    /// Questionnaire responses counted so far.
    pub fn total_responses(&self) -> u64 {
        self.questionnaire.total_responses
    }
}

/// JSON rendering of one bucket.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryDocument {
    /// Participant id.
    pub patient_id: ParticipantId,
    /// Site, `null` when the path carries none.
    pub site: Option<SiteId>,
    /// Coverage across every feature.
    pub data_summary: DataSummary,
    /// Per-feature statistics in declaration order.
    pub feature_statistics: IndexMap<FeatureName, FeatureStatistics>,
    /// Questionnaire tallies.
    pub questionnaire_responses: QuestionnaireResponses,
}

/// Day coverage of one document.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataSummary {
    /// First day with feature data.
    pub start_date: Option<DayString>,
    /// Last day with feature data.
    pub end_date: Option<DayString>,
    /// Distinct days with feature data.
    pub total_days_with_data: u64,
    /// Always `null`; the expected-days denominator is not known here.
    pub missing_days: Option<u64>,
    /// Features with at least one matched row, sorted.
    pub features_available: Vec<FeatureName>,
}

/// Statistics of one feature or slider domain.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureStatistics {
    /// Matched rows, numeric or not.
    pub total_entries: u64,
    /// Days with a numeric value.
    pub days_with_data: u64,
    /// Mean, median, spread, and range.
    #[serde(flatten)]
    pub stats: NumericSummary,
    /// Unit of directly extracted features.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl FeatureStatistics {
    fn of(accumulator: &NumericAccumulator, unit: Option<&str>) -> Self {
        Self {
            total_entries: accumulator.total_entries,
            days_with_data: accumulator.days_with_data(),
            stats: accumulator.summary(),
            unit: unit.map(str::to_string),
        }
    }
}

/// Questionnaire section of one document.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuestionnaireResponses {
    /// Responses with a valid time.
    pub total_responses: u64,
    /// Distinct response days.
    pub days_with_responses: u64,
    /// Slider statistics per domain.
    pub slider: BTreeMap<DomainLabel, FeatureStatistics>,
    /// Response counts per domain, question id, and response.
    pub histogram: BTreeMap<DomainLabel, BTreeMap<String, BTreeMap<String, u64>>>,
}

/// Buckets keyed by `(participant, time_key)`, with a dirty set tracking
/// which documents changed since the last flush.
#[derive(Debug)]
pub struct SummaryStore {
    resolution: TimeResolution,
    features: Vec<FeatureSpec>,
    buckets: BTreeMap<BucketKey, SummaryBucket>,
    dirty: BTreeSet<BucketKey>,
}

impl SummaryStore {
    /// Empty store for the configured features and resolution.
    pub fn new(config: &SummaryConfig) -> Self {
        Self {
            resolution: config.time_resolution,
            features: config.features.clone(),
            buckets: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True when no bucket exists.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Bucket for `key`, if any data reached it.
    pub fn get(&self, key: &BucketKey) -> Option<&SummaryBucket> {
        self.buckets.get(key)
    }

    fn bucket_mut(
        &mut self,
        participant: &str,
        site: Option<&str>,
        at: &NaiveDateTime,
    ) -> &mut SummaryBucket {
        let key = BucketKey {
            participant: participant.to_string(),
            time_key: self.resolution.time_key(at),
        };
        self.dirty.insert(key.clone());
        let features = &self.features;
        let bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| SummaryBucket::new(features));
        if bucket.site.is_none() {
            bucket.site = site.map(str::to_string);
        }
        bucket
    }

    /// Fold a feature's observations into their buckets.
    pub fn record_feature(
        &mut self,
        participant: &str,
        site: Option<&str>,
        feature: &FeatureSpec,
        observations: &[FeatureObservation],
    ) {
        for observation in observations {
            let bucket = self.bucket_mut(participant, site, &observation.at);
            bucket.features_available.insert(feature.name.clone());
            bucket
                .features
                .entry(feature.name.clone())
                .or_default()
                .record(&observation.at, observation.value);
        }
    }

    /// Count simple questionnaire responses.
    pub fn record_responses(
        &mut self,
        participant: &str,
        site: Option<&str>,
        times: &[NaiveDateTime],
    ) {
        for at in times {
            let tally = &mut self.bucket_mut(participant, site, at).questionnaire;
            tally.total_responses += 1;
            tally.days.insert(at.date());
        }
    }

    /// Fold slider answers into their buckets under `domain`.
    pub fn record_slider(
        &mut self,
        participant: &str,
        site: Option<&str>,
        domain: &str,
        answers: &[SliderAnswer],
    ) {
        for answer in answers {
            self.bucket_mut(participant, site, &answer.at)
                .questionnaire
                .slider
                .entry(domain.to_string())
                .or_default()
                .record(&answer.at, answer.value);
        }
    }

    /// Count histogram answers into their buckets under `domain`.
    pub fn record_histogram(
        &mut self,
        participant: &str,
        site: Option<&str>,
        domain: &str,
        answers: &[HistogramAnswer],
    ) {
        for answer in answers {
            *self
                .bucket_mut(participant, site, &answer.at)
                .questionnaire
                .histogram
                .entry(domain.to_string())
                .or_default()
                .entry(answer.question_id.clone())
                .or_default()
                .entry(answer.response.clone())
                .or_default() += 1;
        }
    }

    /// Render every bucket changed since the last call, clearing the dirty set.
    pub fn take_dirty(&mut self) -> Vec<(BucketKey, SummaryDocument)> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .filter_map(|key| {
                let document = self.render(&key)?;
                Some((key, document))
            })
            .collect()
    }

    /// Document for one bucket.
    pub fn render(&self, key: &BucketKey) -> Option<SummaryDocument> {
        let bucket = self.buckets.get(key)?;

        let all_days: BTreeSet<NaiveDate> = bucket
            .features
            .values()
            .flat_map(|accumulator| accumulator.days.iter().copied())
            .collect();

        let feature_statistics = self
            .features
            .iter()
            .map(|feature| {
                let accumulator = bucket.features.get(&feature.name).cloned().unwrap_or_default();
                (
                    feature.name.clone(),
                    FeatureStatistics::of(&accumulator, feature.unit()),
                )
            })
            .collect();

        let questionnaire = &bucket.questionnaire;
        Some(SummaryDocument {
            patient_id: key.participant.clone(),
            site: bucket.site.clone(),
            data_summary: DataSummary {
                start_date: all_days.first().map(format_day),
                end_date: all_days.last().map(format_day),
                total_days_with_data: all_days.len() as u64,
                missing_days: None,
                features_available: bucket.features_available.iter().cloned().collect(),
            },
            feature_statistics,
            questionnaire_responses: QuestionnaireResponses {
                total_responses: questionnaire.total_responses,
                days_with_responses: questionnaire.days.len() as u64,
                slider: questionnaire
                    .slider
                    .iter()
                    .map(|(domain, accumulator)| {
                        (domain.clone(), FeatureStatistics::of(accumulator, None))
                    })
                    .collect(),
                histogram: questionnaire.histogram.clone(),
            },
        })
    }
}

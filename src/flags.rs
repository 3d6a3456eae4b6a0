//! Strict parsers for the colon-delimited extraction flags.
//!
//! Every flag kind has a fixed arity; empty fields are rejected so a typo
//! fails at startup instead of silently matching nothing mid-run.

use crate::errors::AggregateError;
use crate::types::{ColumnName, DomainLabel, FeatureName};

/// How a feature selects its numeric value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeatureExtraction {
    /// Keep rows where `filter_field == filter_value`, read `extraction_field`.
    Filtered {
        /// Column compared against `filter_value`.
        filter_field: ColumnName,
        /// Value a row must carry to be kept.
        filter_value: String,
        /// Column holding the value.
        extraction_field: ColumnName,
    },
    /// Read `extraction_field` from every row; `unit` is reported verbatim.
    Direct {
        /// Column holding the value.
        extraction_field: ColumnName,
        /// Unit label reported with the statistics.
        unit: String,
    },
}

/// `name:source:time_field:(filter_field:filter_value:extraction_field | extraction_field:unit)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureSpec {
    /// Key under `feature_statistics`.
    pub name: FeatureName,
    /// Substring matched against the file path.
    pub source: String,
    /// Column holding Unix seconds.
    pub time_field: ColumnName,
    /// Value selection rule.
    pub extraction: FeatureExtraction,
}

impl FeatureSpec {
    /// Column holding the numeric observation.
    pub fn extraction_field(&self) -> &str {
        match &self.extraction {
            FeatureExtraction::Filtered {
                extraction_field, ..
            }
            | FeatureExtraction::Direct {
                extraction_field, ..
            } => extraction_field,
        }
    }

    /// Unit label, only present for direct extraction.
    pub fn unit(&self) -> Option<&str> {
        match &self.extraction {
            FeatureExtraction::Direct { unit, .. } => Some(unit),
            FeatureExtraction::Filtered { .. } => None,
        }
    }
}

/// `file_filter:time_field`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuestionnaireSpec {
    /// Substring matched against the file path.
    pub file_filter: String,
    /// Column holding the response time.
    pub time_field: ColumnName,
}

/// `domain:file_filter:answers_base:target_prefix:value_suffix:time_suffix`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SliderSpec {
    /// Key under `questionnaire_responses.slider`.
    pub domain: DomainLabel,
    /// Substring matched against the file path.
    pub file_filter: String,
    /// Prefix of the indexed answer columns (`<base>.<i>.questionId`).
    pub answers_base: String,
    /// Question ids starting with this prefix are collected.
    pub target_prefix: String,
    /// Suffix of an answer slot's value column.
    pub value_suffix: String,
    /// Suffix of an answer slot's time column.
    pub time_suffix: String,
}

/// `domain:file_filter:answers_base:target_question_id:value_suffix:time_suffix`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistogramSpec {
    /// Key under `questionnaire_responses.histogram`.
    pub domain: DomainLabel,
    /// Substring matched against the file path.
    pub file_filter: String,
    /// Prefix of the indexed answer columns (`<base>.<i>.questionId`).
    pub answers_base: String,
    /// Only answers to exactly this question id are tallied.
    pub target_question_id: String,
    /// Suffix of an answer slot's value column.
    pub value_suffix: String,
    /// Suffix of an answer slot's time column.
    pub time_suffix: String,
}

fn split_fields<'a>(
    kind: &'static str,
    raw: &'a str,
    arities: &[usize],
) -> Result<Vec<&'a str>, AggregateError> {
    let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
    if !arities.contains(&parts.len()) {
        let expected = arities
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(" or ");
        return Err(AggregateError::InvalidFlag {
            kind,
            value: raw.to_string(),
            reason: format!("expected {expected} ':'-separated fields, found {}", parts.len()),
        });
    }
    if let Some(position) = parts.iter().position(|part| part.is_empty()) {
        return Err(AggregateError::InvalidFlag {
            kind,
            value: raw.to_string(),
            reason: format!("field {} is empty", position + 1),
        });
    }
    Ok(parts)
}

/// Parse a `--feature` flag.
pub fn parse_feature(raw: &str) -> Result<FeatureSpec, AggregateError> {
    let parts = split_fields("feature", raw, &[5, 6])?;
    let extraction = if parts.len() == 6 {
        FeatureExtraction::Filtered {
            filter_field: parts[3].to_string(),
            filter_value: parts[4].to_string(),
            extraction_field: parts[5].to_string(),
        }
    } else {
        FeatureExtraction::Direct {
            extraction_field: parts[3].to_string(),
            unit: parts[4].to_string(),
        }
    };
    Ok(FeatureSpec {
        name: parts[0].to_string(),
        source: parts[1].to_string(),
        time_field: parts[2].to_string(),
        extraction,
    })
}

/// Parse a `--questionnaire` flag.
pub fn parse_questionnaire(raw: &str) -> Result<QuestionnaireSpec, AggregateError> {
    let parts = split_fields("questionnaire", raw, &[2])?;
    Ok(QuestionnaireSpec {
        file_filter: parts[0].to_string(),
        time_field: parts[1].to_string(),
    })
}

/// Parse a `--questionnaire-slider` flag.
pub fn parse_slider(raw: &str) -> Result<SliderSpec, AggregateError> {
    let parts = split_fields("questionnaire-slider", raw, &[6])?;
    Ok(SliderSpec {
        domain: parts[0].to_string(),
        file_filter: parts[1].to_string(),
        answers_base: parts[2].to_string(),
        target_prefix: parts[3].to_string(),
        value_suffix: parts[4].to_string(),
        time_suffix: parts[5].to_string(),
    })
}

/// Parse a `--questionnaire-histogram` flag.
pub fn parse_histogram(raw: &str) -> Result<HistogramSpec, AggregateError> {
    let parts = split_fields("questionnaire-histogram", raw, &[6])?;
    Ok(HistogramSpec {
        domain: parts[0].to_string(),
        file_filter: parts[1].to_string(),
        answers_base: parts[2].to_string(),
        target_question_id: parts[3].to_string(),
        value_suffix: parts[4].to_string(),
        time_suffix: parts[5].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filtered_and_direct_features() {
        let filtered = parse_feature(
            "steps:android_health_connect_typed_data:value.time:value.key:Steps:value.intVal",
        )
        .unwrap();
        assert_eq!(filtered.name, "steps");
        assert_eq!(filtered.extraction_field(), "value.intVal");
        assert_eq!(filtered.unit(), None);
        assert_eq!(
            filtered.extraction,
            FeatureExtraction::Filtered {
                filter_field: "value.key".to_string(),
                filter_value: "Steps".to_string(),
                extraction_field: "value.intVal".to_string(),
            }
        );

        let direct =
            parse_feature("sleep_period:wearable_sleep_tracker:value.time:value.duration:hours")
                .unwrap();
        assert_eq!(direct.extraction_field(), "value.duration");
        assert_eq!(direct.unit(), Some("hours"));
    }

    #[test]
    fn rejects_wrong_arity_and_empty_fields() {
        assert!(matches!(
            parse_feature("steps:source:value.time"),
            Err(AggregateError::InvalidFlag { kind: "feature", .. })
        ));
        assert!(matches!(
            parse_feature("steps::value.time:value.intVal:count"),
            Err(AggregateError::InvalidFlag { reason, .. }) if reason == "field 2 is empty"
        ));
        assert!(parse_questionnaire("questionnaire_response").is_err());
        assert!(parse_slider("a:b:c:d:e").is_err());
        assert!(parse_histogram("a:b:c:d:e:f:g").is_err());
    }

    #[test]
    fn parses_questionnaire_modes() {
        let simple = parse_questionnaire("questionnaire_response:value.timeCompleted").unwrap();
        assert_eq!(simple.time_field, "value.timeCompleted");

        let slider = parse_slider(
            "negative_emotions:questionnaire_response:value.answers:negative_emotions_:value:startTime",
        )
        .unwrap();
        assert_eq!(slider.target_prefix, "negative_emotions_");
        assert_eq!(slider.time_suffix, "startTime");

        let histogram =
            parse_histogram("sleep:questionnaire_response:value.answers:sleep_5:value:endTime")
                .unwrap();
        assert_eq!(histogram.target_question_id, "sleep_5");
        assert_eq!(histogram.time_suffix, "endTime");
    }
}

use chrono::NaiveDateTime;

use crate::constants::extract::QUESTION_ID_SUFFIX;
use crate::errors::AggregateError;
use crate::extract::{parse_epoch_seconds, parse_numeric};
use crate::flags::{HistogramSpec, QuestionnaireSpec, SliderSpec};
use crate::transport::table::Table;

/// Completion instants of every response with a valid time value.
pub fn response_times(
    spec: &QuestionnaireSpec,
    table: &Table,
) -> Result<Vec<NaiveDateTime>, AggregateError> {
    let time_idx = table
        .column_index(&spec.time_field)
        .ok_or_else(|| AggregateError::MissingColumn(spec.time_field.clone()))?;
    Ok(table.column(time_idx).filter_map(parse_epoch_seconds).collect())
}

/// Column positions of one answer slot in a wide answers table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct AnswerSlot {
    question_id: usize,
    value: usize,
    time: usize,
}

/// Locate answer slots under `answers_base`.
///
/// A slot is a `<base>.questionId` column with a sibling `<base>.<value_suffix>`.
/// Its time is `<base>.<time_suffix>` when present, otherwise the top-level
/// `<time_suffix>` column. Slots missing either sibling are ignored.
fn answer_slots(
    table: &Table,
    answers_base: &str,
    value_suffix: &str,
    time_suffix: &str,
) -> Vec<AnswerSlot> {
    table
        .headers()
        .iter()
        .enumerate()
        .filter(|(_, header)| {
            header.starts_with(answers_base) && header.ends_with(QUESTION_ID_SUFFIX)
        })
        .filter_map(|(question_id, header)| {
            let base = header.rsplit_once('.').map(|(base, _)| base)?;
            let value = table.column_index(&format!("{base}.{value_suffix}"))?;
            let time = table
                .column_index(&format!("{base}.{time_suffix}"))
                .or_else(|| table.column_index(time_suffix))?;
            Some(AnswerSlot {
                question_id,
                value,
                time,
            })
        })
        .collect()
}

/// One slider answer: instant and numeric value, if the value parsed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliderAnswer {
    /// Answer instant.
    pub at: NaiveDateTime,
    /// Slider position; `None` when not numeric.
    pub value: Option<f64>,
}

/// Answers whose question id starts with the slider's target prefix.
pub fn slider_answers(spec: &SliderSpec, table: &Table) -> Vec<SliderAnswer> {
    let slots = answer_slots(table, &spec.answers_base, &spec.value_suffix, &spec.time_suffix);
    let mut answers = Vec::new();
    for row in table.rows() {
        for slot in &slots {
            let question = Table::cell(row, slot.question_id);
            if question.is_empty() || !question.starts_with(spec.target_prefix.as_str()) {
                continue;
            }
            let Some(at) = parse_epoch_seconds(Table::cell(row, slot.time)) else {
                continue;
            };
            answers.push(SliderAnswer {
                at,
                value: parse_numeric(Table::cell(row, slot.value)),
            });
        }
    }
    answers
}

/// One categorical answer to the histogram's target question.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistogramAnswer {
    /// Answer instant.
    pub at: NaiveDateTime,
    /// Question id of the answer slot.
    pub question_id: String,
    /// Categorical response, verbatim.
    pub response: String,
}

/// Answers whose question id equals the histogram's target exactly.
pub fn histogram_answers(spec: &HistogramSpec, table: &Table) -> Vec<HistogramAnswer> {
    let slots = answer_slots(table, &spec.answers_base, &spec.value_suffix, &spec.time_suffix);
    let mut answers = Vec::new();
    for row in table.rows() {
        for slot in &slots {
            let question = Table::cell(row, slot.question_id);
            if question != spec.target_question_id {
                continue;
            }
            let Some(at) = parse_epoch_seconds(Table::cell(row, slot.time)) else {
                continue;
            };
            answers.push(HistogramAnswer {
                at,
                question_id: question.to_string(),
                response: Table::cell(row, slot.value).to_string(),
            });
        }
    }
    answers
}

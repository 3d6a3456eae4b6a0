//! Per-file extraction: coverage facts, feature observations, and
//! questionnaire answers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};

use crate::constants::extract::{
    DAY_FORMAT, FRACTIONAL_INSTANT_FORMAT, INSTANT_FORMAT, INSTANT_PARSE_FORMAT,
};
use crate::types::DayString;

/// Row/day/time coverage facts for the stats command.
pub mod facts;
/// Feature-flag driven numeric extraction.
pub mod features;
/// Simple, slider, and histogram questionnaire extraction.
pub mod questionnaire;

pub use facts::{ExtractedFacts, extract_facts, facts_from_table};

/// Interpret a cell as Unix seconds (integer or fractional).
///
/// Fractions are rounded to whole microseconds. Returns `None` for empty,
/// non-numeric, non-finite, or out-of-range values.
pub fn parse_epoch_seconds(raw: &str) -> Option<NaiveDateTime> {
    let value = raw.trim().parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    let mut secs = value.floor();
    let mut micros = ((value - secs) * 1e6).round();
    if micros >= 1e6 {
        secs += 1.0;
        micros = 0.0;
    }
    DateTime::from_timestamp(secs as i64, micros as u32 * 1_000).map(|dt| dt.naive_utc())
}

/// Parse a cell as a finite float.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// ISO-8601 rendering of an instant: `YYYY-MM-DDTHH:MM:SS`, with a
/// six-digit fraction only when the instant has one.
pub fn format_instant(at: &NaiveDateTime) -> String {
    let format = if at.nanosecond() == 0 {
        INSTANT_FORMAT
    } else {
        FRACTIONAL_INSTANT_FORMAT
    };
    at.format(format).to_string()
}

/// Parse an instant written by `format_instant`.
pub fn parse_instant(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), INSTANT_PARSE_FORMAT).ok()
}

/// `YYYY-MM-DD` day of an instant.
pub fn day_string(at: &NaiveDateTime) -> DayString {
    format_day(&at.date())
}

/// `YYYY-MM-DD` rendering of a date.
pub fn format_day(date: &NaiveDate) -> DayString {
    date.format(DAY_FORMAT).to_string()
}

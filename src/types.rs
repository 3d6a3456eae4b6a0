/// Study site identifier taken from the first positional path segment.
/// Examples: `SITE1`, `kcl`
pub type SiteId = String;
/// Participant identifier taken from the segment below the site.
/// Example: `P001`, `3be1c1a0-5e3c-4c4e-9a0f-0f3b2c6a1d42`
pub type ParticipantId = String;
/// Metric (data type) name, optionally suffixed with `/<device>`.
/// Examples: `steps`, `android_phone_acceleration/3f9a`
pub type MetricName = String;
/// Calendar day string in `YYYY-MM-DD` form.
/// Example: `2023-08-14`
pub type DayString = String;
/// Summary bucket key derived from a timestamp and a `TimeResolution`.
/// Examples: `2023-08`, `2023-W33`, `2023`
pub type TimeKey = String;
/// Name of a configured numeric feature.
/// Examples: `steps`, `heart_rate`
pub type FeatureName = String;
/// Label grouping slider or histogram answers.
/// Examples: `negative_emotions`, `sleep`
pub type DomainLabel = String;
/// Column header in an input table.
/// Examples: `value.time`, `value.answers.0.questionId`
pub type ColumnName = String;
/// Path segment relative to the input root.
/// Examples: `RADAR-CNS`, `P001`, `20230814_0930.csv.gz`
pub type PathSegment = String;

/// Constants used by path classification.
pub mod classify {
    /// Minimum number of relative path segments for `SITE/PARTICIPANT/METRIC` layouts.
    pub const MIN_SEGMENTS: usize = 4;
    /// Positional index of the site segment.
    pub const SITE_INDEX: usize = 1;
    /// Positional index of the participant segment.
    pub const PARTICIPANT_INDEX: usize = 2;
    /// Positional index of the metric segment.
    pub const METRIC_INDEX: usize = 3;
    /// Minimum segments for tail-anchored (merged tree) layouts.
    pub const MIN_TAIL_SEGMENTS: usize = 3;
    /// Filename pattern for timestamp-bearing exports, with optional `_index`.
    pub const TIMESTAMP_FILENAME_PATTERN: &str = r"^(\d{8}_\d{4})(?:_(\d+))?\.csv\.gz$";
    /// `chrono` format of the captured timestamp.
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M";
    /// Extension of every eligible input file.
    pub const INPUT_SUFFIX: &str = ".csv.gz";
}

/// Constants used by per-file extraction.
pub mod extract {
    /// Designated time column, Unix seconds.
    pub const TIME_COLUMN: &str = "value.time";
    /// Case-insensitive substring marking a device column.
    pub const DEVICE_COLUMN_MARKER: &str = "device";
    /// Separator between metric and device identifier in a device-split key.
    pub const DEVICE_SEPARATOR: char = '/';
    /// ISO-8601 rendering of a whole-second instant.
    pub const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
    /// ISO-8601 rendering of an instant with a sub-second part.
    pub const FRACTIONAL_INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
    /// Accepts both renderings; the fraction is optional.
    pub const INSTANT_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
    /// Rendering used for day-set members.
    pub const DAY_FORMAT: &str = "%Y-%m-%d";
    /// Column suffix identifying a questionnaire answer's question id.
    pub const QUESTION_ID_SUFFIX: &str = ".questionId";
    /// Time columns tried, in order, when deriving days from file contents.
    pub const PRESENCE_TIME_COLUMNS: [&str; 6] = [
        "timestamp",
        "value.time",
        "value.startTime",
        "value.timeCompleted",
        "time",
        "timeReceived",
    ];
}

/// Constants used by output artifacts.
pub mod writer {
    /// Suffix for per-site stats artifacts (`<SITE>_stats.<ext>`).
    pub const SITE_STATS_SUFFIX: &str = "_stats";
    /// Stem of the combined stats artifact.
    pub const ALL_SITES_STEM: &str = "all_sites";
    /// Extension of gzip CSV artifacts.
    pub const CSV_EXTENSION: &str = "csv.gz";
    /// Extension of parquet artifacts.
    pub const PARQUET_EXTENSION: &str = "parquet";
    /// Column order of stats artifacts.
    pub const STATS_COLUMNS: [&str; 7] = [
        "site",
        "participant",
        "metric",
        "row_count",
        "start_date",
        "end_date",
        "day_count",
    ];
    /// Parquet schema of stats artifacts.
    pub const STATS_PARQUET_SCHEMA: &str = "
        message mhm_stats {
            REQUIRED BYTE_ARRAY site (UTF8);
            REQUIRED BYTE_ARRAY participant (UTF8);
            REQUIRED BYTE_ARRAY metric (UTF8);
            REQUIRED INT64 row_count;
            OPTIONAL BYTE_ARRAY start_date (UTF8);
            OPTIONAL BYTE_ARRAY end_date (UTF8);
            REQUIRED INT64 day_count;
        }
    ";
    /// Columns appended to every merged metric table.
    pub const MERGE_EXTRA_COLUMNS: [&str; 3] = ["file_timestamp", "site", "participant_id"];
    /// File name of the presence listing.
    pub const PRESENCE_FILE_NAME: &str = "presence.csv";
    /// Header of presence artifacts.
    pub const PRESENCE_COLUMNS: [&str; 4] = ["site", "participant_id", "metric", "date"];
    /// Extension of summary documents.
    pub const SUMMARY_EXTENSION: &str = "json";
}

use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, error::ErrorKind};

use crate::config::{
    EngineConfig, OutputFormat, PresenceConfig, SummaryConfig, TimeResolution, parse_segment_list,
};
use crate::engine::{RunReport, run_merge, run_presence, run_stats, run_summary};
use crate::flags::{
    FeatureSpec, HistogramSpec, QuestionnaireSpec, SliderSpec, parse_feature, parse_histogram,
    parse_questionnaire, parse_slider,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Parquet,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Csv => OutputFormat::Csv,
            FormatArg::Parquet => OutputFormat::Parquet,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResolutionArg {
    Week,
    Month,
    Year,
}

impl From<ResolutionArg> for TimeResolution {
    fn from(value: ResolutionArg) -> Self {
        match value {
            ResolutionArg::Week => TimeResolution::Week,
            ResolutionArg::Month => TimeResolution::Month,
            ResolutionArg::Year => TimeResolution::Year,
        }
    }
}

/// Command-line interface of `mhm-aggregate`.
#[derive(Debug, Parser)]
#[command(
    name = "mhm-aggregate",
    disable_help_subcommand = true,
    about = "Aggregate timestamped gzip CSV exports of mobile-health studies",
    long_about = "Walk a SITE/PARTICIPANT/METRIC export tree and write coverage stats, participant summaries, merged metric tables, or daily presence listings."
)]
pub struct Cli {
    #[arg(
        long = "log-level",
        global = true,
        default_value = "info",
        help = "Log filter used when RUST_LOG is unset (e.g. debug, warn, mhm_aggregate=trace)"
    )]
    /// Fallback log filter directive.
    pub log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Row, day, and date-range coverage per site/participant/metric.
    Stats(StatsArgs),
    /// Per-participant JSON summaries bucketed by month, week, or year.
    Summary(SummaryArgs),
    /// Concatenate each metric's exports into one table.
    Merge(MergeArgs),
    /// One row per day with data for metrics matching a prefix.
    Presence(PresenceArgs),
}

#[derive(Debug, Args)]
struct CommonArgs {
    #[arg(long = "input-dir", value_name = "DIR", help = "Root of the export tree")]
    input_dir: PathBuf,
    #[arg(long = "output-dir", value_name = "DIR", help = "Directory receiving artifacts")]
    output_dir: PathBuf,
    #[arg(long, value_name = "A,B", help = "Comma-separated path segments to include")]
    include: Option<String>,
    #[arg(long, value_name = "A,B", help = "Comma-separated path segments to exclude")]
    exclude: Option<String>,
    #[arg(long = "follow-links", help = "Follow symlinks while walking the input tree")]
    follow_links: bool,
}

impl CommonArgs {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(&self.input_dir, &self.output_dir)
            .with_include(parse_segment_list(self.include.as_deref()))
            .with_exclude(parse_segment_list(self.exclude.as_deref()))
            .with_follow_links(self.follow_links)
    }
}

#[derive(Debug, Args)]
struct StatsArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long = "output-format", value_enum, default_value_t = FormatArg::Csv)]
    output_format: FormatArg,
    #[arg(
        long,
        help = "Reprocess every file instead of resuming from all_sites",
        long_help = "Reprocess every file instead of resuming from all_sites. Without it, keys already present in all_sites are kept as written, so a key interrupted partway through its directories stays partial until a run with --update."
    )]
    update: bool,
}

#[derive(Debug, Args)]
struct SummaryArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long = "time-resolution", value_enum, default_value_t = ResolutionArg::Month)]
    time_resolution: ResolutionArg,
    #[arg(
        long = "feature",
        value_name = "NAME:SOURCE:TIME:(FILTER_FIELD:FILTER_VALUE:FIELD | FIELD:UNIT)",
        value_parser = parse_feature_arg,
        help = "Numeric feature to summarize, repeat as needed"
    )]
    features: Vec<FeatureSpec>,
    #[arg(
        long,
        value_name = "FILE_FILTER:TIME_FIELD",
        value_parser = parse_questionnaire_arg,
        help = "Count questionnaire responses in matching files"
    )]
    questionnaire: Option<QuestionnaireSpec>,
    #[arg(
        long = "questionnaire-slider",
        value_name = "DOMAIN:FILE_FILTER:ANSWERS_BASE:TARGET_PREFIX:VALUE_SUFFIX:TIME_SUFFIX",
        value_parser = parse_slider_arg,
        help = "Slider questionnaire statistics, repeat as needed"
    )]
    sliders: Vec<SliderSpec>,
    #[arg(
        long = "questionnaire-histogram",
        value_name = "DOMAIN:FILE_FILTER:ANSWERS_BASE:TARGET_QUESTION_ID:VALUE_SUFFIX:TIME_SUFFIX",
        value_parser = parse_histogram_arg,
        help = "Categorical answer tallies, repeat as needed"
    )]
    histograms: Vec<HistogramSpec>,
}

impl SummaryArgs {
    fn summary_config(&self) -> Result<SummaryConfig, Box<dyn Error>> {
        let mut config = SummaryConfig::default().with_time_resolution(self.time_resolution.into());
        for feature in &self.features {
            config = config.with_feature(feature.clone())?;
        }
        if let Some(questionnaire) = &self.questionnaire {
            config = config.with_questionnaire(questionnaire.clone());
        }
        for slider in &self.sliders {
            config = config.with_slider(slider.clone());
        }
        for histogram in &self.histograms {
            config = config.with_histogram(histogram.clone());
        }
        Ok(config)
    }
}

#[derive(Debug, Args)]
struct MergeArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long = "output-format", value_enum, default_value_t = FormatArg::Csv)]
    output_format: FormatArg,
    #[arg(long, help = "Rewrite merged tables that already exist")]
    update: bool,
}

#[derive(Debug, Args)]
struct PresenceArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(
        long = "data-prefix",
        value_name = "PREFIX",
        help = "Only metrics whose directory starts with this prefix (e.g. sensorkit_)"
    )]
    data_prefix: String,
    #[arg(
        long = "from-contents",
        help = "Derive days from time columns instead of filename timestamps"
    )]
    from_contents: bool,
}

fn parse_feature_arg(raw: &str) -> Result<FeatureSpec, String> {
    parse_feature(raw).map_err(|err| err.to_string())
}

fn parse_questionnaire_arg(raw: &str) -> Result<QuestionnaireSpec, String> {
    parse_questionnaire(raw).map_err(|err| err.to_string())
}

fn parse_slider_arg(raw: &str) -> Result<SliderSpec, String> {
    parse_slider(raw).map_err(|err| err.to_string())
}

fn parse_histogram_arg(raw: &str) -> Result<HistogramSpec, String> {
    parse_histogram(raw).map_err(|err| err.to_string())
}

/// Parse arguments (program name excluded).
///
/// Returns `Ok(None)` after printing help or version output.
pub fn parse<I>(args: I) -> Result<Option<Cli>, Box<dyn Error>>
where
    I: IntoIterator<Item = String>,
{
    match Cli::try_parse_from(std::iter::once("mhm-aggregate".to_string()).chain(args)) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

/// Run the parsed command.
pub fn execute(cli: Cli) -> Result<RunReport, Box<dyn Error>> {
    let report = match cli.command {
        Command::Stats(args) => {
            let config = args
                .common
                .engine_config()
                .with_output_format(args.output_format.into())
                .with_update(args.update);
            run_stats(&config)?
        }
        Command::Summary(args) => {
            let summary = args.summary_config()?;
            run_summary(&args.common.engine_config(), &summary)?
        }
        Command::Merge(args) => {
            let config = args
                .common
                .engine_config()
                .with_output_format(args.output_format.into())
                .with_update(args.update);
            run_merge(&config)?
        }
        Command::Presence(args) => {
            let presence =
                PresenceConfig::new(args.data_prefix).with_from_contents(args.from_contents);
            run_presence(&args.common.engine_config(), &presence)?
        }
    };
    Ok(report)
}

//! Garmin Flux CLI - Command-line interface for Garmin export analysis
//!
//! Commands:
//! - analyze: Full report (tables, merged table, correlation, insights, summary, notices)
//! - correlate: Correlation matrix, ranked pairs and recommendations
//! - summary: Headline statistics

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use garmin_flux::config::{AnalyzerConfig, DuplicatePolicy};
use garmin_flux::insights::{CorrelationStrength, Recommendation};
use garmin_flux::pipeline::{AnalysisReport, ExportAnalyzer};
use garmin_flux::types::Notice;
use garmin_flux::{AnalysisError, FLUX_VERSION, PRODUCER_NAME};

/// Garmin Flux - Normalize a Garmin Connect export and correlate its domains
#[derive(Parser)]
#[command(name = "garmin-flux")]
#[command(version = FLUX_VERSION)]
#[command(about = "Analyze a Garmin Connect data export", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command
#[derive(clap::Args)]
struct AnalysisArgs {
    /// Export archive (.zip)
    #[arg(short, long)]
    input: PathBuf,

    /// Analyzer configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// How rows sharing a date collapse before merging
    #[arg(long)]
    duplicate_policy: Option<PolicyArg>,

    /// Minimum merged days before correlation
    #[arg(long)]
    min_merged_rows: Option<usize>,

    /// Output format
    #[arg(long, default_value = "json-pretty")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the full analysis report
    Analyze {
        #[command(flatten)]
        args: AnalysisArgs,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Print the correlation matrix, ranked pairs and recommendations
    Correlate {
        #[command(flatten)]
        args: AnalysisArgs,
    },

    /// Print headline statistics
    Summary {
        #[command(flatten)]
        args: AnalysisArgs,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Single-line JSON
    Json,
    /// Indented JSON
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    KeepLast,
    Mean,
    Reject,
}

impl From<PolicyArg> for DuplicatePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::KeepLast => DuplicatePolicy::KeepLast,
            PolicyArg::Mean => DuplicatePolicy::Mean,
            PolicyArg::Reject => DuplicatePolicy::Reject,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FluxCliError> {
    match cli.command {
        Commands::Analyze { args, output } => cmd_analyze(&args, &output),
        Commands::Correlate { args } => cmd_correlate(&args),
        Commands::Summary { args } => cmd_summary(&args),
    }
}

fn cmd_analyze(args: &AnalysisArgs, output: &Path) -> Result<(), FluxCliError> {
    let report = analyze(args)?;
    let rendered = format_output(&report, &args.format)?;
    write_output(output, &rendered)
}

/// Correlation view of a report
#[derive(Serialize)]
struct CorrelationOutput<'a> {
    columns: &'a [String],
    matrix: &'a [Vec<f64>],
    observations: usize,
    pairs: Vec<LabeledPair<'a>>,
    recommendations: &'a [Recommendation],
    notices: &'a [Notice],
}

#[derive(Serialize)]
struct LabeledPair<'a> {
    first: &'a str,
    second: &'a str,
    coefficient: f64,
    strength: &'static str,
}

fn cmd_correlate(args: &AnalysisArgs) -> Result<(), FluxCliError> {
    let report = analyze(args)?;
    let (Some(correlation), Some(insights)) = (&report.correlation, &report.insights) else {
        return Err(FluxCliError::NoCorrelation(report.notices));
    };

    let output = CorrelationOutput {
        columns: &correlation.matrix.columns,
        matrix: &correlation.matrix.values,
        observations: correlation.matrix.observations,
        pairs: correlation
            .ranked_pairs
            .iter()
            .map(|pair| LabeledPair {
                first: &pair.first,
                second: &pair.second,
                coefficient: pair.coefficient,
                strength: CorrelationStrength::from_coefficient(pair.coefficient).label(),
            })
            .collect(),
        recommendations: &insights.recommendations,
        notices: &report.notices,
    };

    let rendered = format_output(&output, &args.format)?;
    write_output(Path::new("-"), &rendered)
}

fn cmd_summary(args: &AnalysisArgs) -> Result<(), FluxCliError> {
    let report = analyze(args)?;
    let output = serde_json::json!({
        "producer": PRODUCER_NAME,
        "session_id": report.session_id,
        "domains": report.tables.present(),
        "summary": report.summary,
        "notices": report.notices,
    });

    let rendered = format_output(&output, &args.format)?;
    write_output(Path::new("-"), &rendered)
}

// Helper functions

fn load_config(args: &AnalysisArgs) -> Result<AnalyzerConfig, FluxCliError> {
    let mut config = match &args.config {
        Some(path) => AnalyzerConfig::from_file(path)?,
        None => AnalyzerConfig::default(),
    };
    if let Some(policy) = args.duplicate_policy {
        config.duplicate_policy = policy.into();
    }
    if let Some(rows) = args.min_merged_rows {
        config.min_merged_rows = rows;
    }
    config.validate()?;
    Ok(config)
}

fn analyze(args: &AnalysisArgs) -> Result<AnalysisReport, FluxCliError> {
    let config = load_config(args)?;
    let analyzer = ExportAnalyzer::from_path(&args.input, config)?;
    Ok(analyzer.analyze())
}

fn format_output<T: Serialize>(value: &T, format: &OutputFormat) -> Result<String, FluxCliError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(value)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(value)? + "\n"),
    }
}

fn write_output(output: &Path, rendered: &str) -> Result<(), FluxCliError> {
    if output.to_string_lossy() == "-" {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(rendered.as_bytes())?;
        handle.flush()?;
    } else {
        fs::write(output, rendered)?;
    }
    Ok(())
}

// Error handling

#[derive(Debug)]
enum FluxCliError {
    Io(io::Error),
    Analysis(AnalysisError),
    Json(serde_json::Error),
    NoCorrelation(Vec<Notice>),
}

impl From<io::Error> for FluxCliError {
    fn from(e: io::Error) -> Self {
        FluxCliError::Io(e)
    }
}

impl From<AnalysisError> for FluxCliError {
    fn from(e: AnalysisError) -> Self {
        FluxCliError::Analysis(e)
    }
}

impl From<serde_json::Error> for FluxCliError {
    fn from(e: serde_json::Error) -> Self {
        FluxCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FluxCliError> for CliError {
    fn from(e: FluxCliError) -> Self {
        match e {
            FluxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FluxCliError::Analysis(e @ AnalysisError::Archive(_)) => CliError {
                code: "ARCHIVE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Pass the .zip downloaded from Garmin Connect data export".to_string()),
            },
            FluxCliError::Analysis(e @ AnalysisError::Config(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the values in the --config file".to_string()),
            },
            FluxCliError::Analysis(e @ (AnalysisError::Json(_) | AnalysisError::Io(_))) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check that the --config file exists and is valid JSON".to_string()),
            },
            FluxCliError::Analysis(e) => CliError {
                code: "ANALYSIS_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            FluxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            FluxCliError::NoCorrelation(notices) => CliError {
                code: "INSUFFICIENT_DATA".to_string(),
                message: notices
                    .iter()
                    .rev()
                    .find(|n| n.kind == garmin_flux::types::NoticeKind::InsufficientData)
                    .map(|n| n.message.clone())
                    .unwrap_or_else(|| "correlation matrix unavailable".to_string()),
                hint: Some("The export needs more days with activity, sleep and body data".to_string()),
            },
        }
    }
}

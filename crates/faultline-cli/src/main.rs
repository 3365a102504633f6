//! faultline converts test and analysis reports into canonical violation records
//! and emits them as JSON, a Markdown summary, or GitHub workflow annotations.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use faultline_adapters_vstest::{VsTestOptions, VsTestParser};
use faultline_config::{
    CliOverrides, ConfigError, EffectiveConfig, FailOn, discover_config, load_config,
    resolve_config,
};
use faultline_ports::ReportParser;
use faultline_render::{render_annotations, render_json, render_markdown};
use faultline_types::{Report, SeverityCounts};
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// faultline converts test and analysis reports into canonical violation records.
#[derive(Parser)]
#[command(name = "faultline")]
#[command(about = "Converts test and analysis reports into canonical violation records.")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Supported report formats
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
enum ReportFormat {
    /// Visual Studio test results (.trx)
    #[default]
    Vstest,
}

/// CLI fail-on option
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum CliFailOn {
    Error,
    Warn,
    Never,
}

impl From<CliFailOn> for FailOn {
    fn from(value: CliFailOn) -> Self {
        match value {
            CliFailOn::Error => FailOn::Error,
            CliFailOn::Warn => FailOn::Warn,
            CliFailOn::Never => FailOn::Never,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Parse one report file into violations
    Parse {
        /// Path to the report file
        report: String,

        /// Report format
        #[arg(long, value_enum, default_value = "vstest")]
        format: ReportFormat,

        /// Output path for report JSON (default: stdout)
        #[arg(long)]
        out: Option<String>,

        /// Output path for markdown summary
        #[arg(long)]
        md: Option<String>,

        /// Print GitHub workflow annotations to stdout
        #[arg(long)]
        annotations: bool,

        /// Path to config file (default: auto-discover faultline.toml)
        #[arg(long, short = 'c')]
        config: Option<String>,

        /// Maximum characters of a failure message (overrides config file)
        #[arg(long)]
        max_message_len: Option<NonZeroUsize>,

        /// Maximum characters of a stack trace (overrides config file)
        #[arg(long)]
        max_stack_trace_len: Option<NonZeroUsize>,

        /// Prefix to strip from reported file paths (repeatable)
        #[arg(long)]
        path_strip: Vec<String>,

        /// When to exit with a failure code (overrides config file)
        #[arg(long, value_enum)]
        fail_on: Option<CliFailOn>,
    },
}

/// CLI errors
#[derive(Debug, Error)]
enum CliError {
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    DirCreate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to load config: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to parse '{path}': {message}")]
    Parse { path: String, message: String },
}

/// Exit codes:
/// - 0: Parsed, no blocking violations
/// - 1: Tool/runtime error (I/O, unparseable report, config)
/// - 2: Policy fail (blocking violations)
const EXIT_CODE_OK: i32 = 0;
const EXIT_CODE_ERROR: i32 = 1;
const EXIT_CODE_POLICY_FAIL: i32 = 2;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "FAULTLINE_LOG";

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            EXIT_CODE_ERROR
        }
    };
    std::process::exit(exit_code);
}

/// Install the stderr log subscriber.
///
/// `-v` flags take precedence over `FAULTLINE_LOG`; without either only
/// warnings are shown.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Commands::Parse {
            report,
            format,
            out,
            md,
            annotations,
            config,
            max_message_len,
            max_stack_trace_len,
            path_strip,
            fail_on,
        } => {
            let file_config = match config {
                Some(path) => Some(load_config(Path::new(&path))?),
                None => discover_config()?.map(|(path, config)| {
                    debug!(path = %path.display(), "using discovered config");
                    config
                }),
            };

            let overrides = CliOverrides {
                fail_on: fail_on.map(FailOn::from),
                max_message_len: max_message_len.map(NonZeroUsize::get),
                max_stack_trace_len: max_stack_trace_len.map(NonZeroUsize::get),
                path_strip: (!path_strip.is_empty()).then_some(path_strip),
            };
            let effective = resolve_config(file_config.as_ref(), &overrides);

            let text = fs::read_to_string(&report).map_err(|e| CliError::FileRead {
                path: report.clone(),
                source: e,
            })?;

            let parser = build_parser(format, &effective);
            let violations = parser
                .parse_report(&text)
                .map_err(|message| CliError::Parse {
                    path: report.clone(),
                    message,
                })?;
            info!(path = %report, count = violations.len(), "parsed report");

            let result = Report::new(parser.parser(), Some(report), violations);

            let json = render_json(&result)?;
            match &out {
                Some(path) => write_file(path, &json)?,
                None => println!("{}", json),
            }

            if let Some(path) = &md {
                write_file(path, &render_markdown(&result, effective.max_markdown_rows))?;
            }

            if annotations {
                print!(
                    "{}",
                    render_annotations(&result, effective.max_annotations)
                );
            }

            Ok(exit_code_for(effective.fail_on, &result.counts))
        }
    }
}

/// Build the converter for a report format.
fn build_parser(format: ReportFormat, config: &EffectiveConfig) -> Box<dyn ReportParser> {
    match format {
        ReportFormat::Vstest => Box::new(VsTestParser::with_options(VsTestOptions {
            max_message_len: config.max_message_len,
            max_stack_trace_len: config.max_stack_trace_len,
            path_strip: config.path_strip.clone(),
        })),
    }
}

/// Whether the counts contain violations at or above the fail-on level.
fn is_blocking(fail_on: FailOn, counts: &SeverityCounts) -> bool {
    match fail_on {
        FailOn::Error => counts.error > 0,
        FailOn::Warn => counts.error > 0 || counts.warn > 0,
        FailOn::Never => false,
    }
}

fn exit_code_for(fail_on: FailOn, counts: &SeverityCounts) -> i32 {
    if is_blocking(fail_on, counts) {
        EXIT_CODE_POLICY_FAIL
    } else {
        EXIT_CODE_OK
    }
}

fn write_file(path: &str, content: &str) -> Result<(), CliError> {
    ensure_parent_dir(path)?;
    fs::write(path, content).map_err(|e| CliError::FileWrite {
        path: path.to_string(),
        source: e,
    })
}

fn ensure_parent_dir(path: &str) -> Result<(), CliError> {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| CliError::DirCreate {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

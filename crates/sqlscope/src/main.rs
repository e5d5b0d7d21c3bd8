//! sqlscope - offline SQL statement log analyzer.
//!
//! Reads a persisted statement log, groups statements into patterns and
//! prints (or writes) a report with slow queries, N+1 suspects and
//! recommendations.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use sqlscope_core::batch;
use sqlscope_core::config::ThresholdConfig;
use sqlscope_core::error::BatchError;
use sqlscope_core::format;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// SQL statement log analyzer.
#[derive(Parser, Debug)]
#[command(name = "sqlscope", about = "Analyze a SQL statement log", version)]
struct Args {
    /// Statement log to analyze.
    log_file: PathBuf,

    /// Slow statement threshold in seconds [default: 0.1, or
    /// SQLSCOPE_SLOW_STATEMENT_MS when set].
    #[arg(short, long, env = "SQLSCOPE_SLOW_THRESHOLD")]
    threshold: Option<f64>,

    /// Write the report to this file instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Report format. Defaults to json with --output, text otherwise.
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn output_format(&self) -> OutputFormat {
        match (self.format, &self.output) {
            (Some(f), _) => f,
            (None, Some(_)) => OutputFormat::Json,
            (None, None) => OutputFormat::Text,
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["sqlscope", "sqlscope_core"] {
        if let Ok(directive) = format!("{target}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Defaults, then valid `SQLSCOPE_*` overrides, then `--threshold`.
fn thresholds<F>(args: &Args, lookup: F) -> ThresholdConfig
where
    F: Fn(&str) -> Option<String>,
{
    let (mut config, errors) = ThresholdConfig::default().with_valid_overrides(lookup);
    for e in errors {
        warn!("Ignoring threshold override: {}", e);
    }
    if let Some(secs) = args.threshold {
        config.slow_statement_ms = secs * 1000.0;
    }
    config
}

fn run(args: &Args) -> Result<(), BatchError> {
    let parsed = batch::load(&args.log_file)?;
    let config = thresholds(args, |var| std::env::var(var).ok());
    let report = batch::analyze_with(&parsed.records, &config);

    info!(
        "Analyzed {} statements in {} patterns",
        report.total_queries,
        report.groups.len()
    );

    let rendered = match args.output_format() {
        OutputFormat::Json => format::to_json(&report)? + "\n",
        OutputFormat::Text => format::render_text(&report),
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered).map_err(|source| BatchError::Write {
                path: path.clone(),
                source,
            })?;
            info!("Report written to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if matches!(args.threshold, Some(t) if !t.is_finite() || t < 0.0) {
        error!("--threshold must be a non-negative number of seconds");
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("sqlscope: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let a = args(&["sqlscope", "queries.log"]);
        assert_eq!(a.threshold, None);
        assert_eq!(a.output_format(), OutputFormat::Text);
        assert!(a.output.is_none());
    }

    #[test]
    fn test_output_implies_json() {
        let a = args(&["sqlscope", "queries.log", "--output", "report.json"]);
        assert_eq!(a.output_format(), OutputFormat::Json);
        let a = args(&["sqlscope", "q.log", "-o", "r.txt", "--format", "text"]);
        assert_eq!(a.output_format(), OutputFormat::Text);
    }

    #[test]
    fn test_thresholds_precedence() {
        let env = |var: &str| match var {
            "SQLSCOPE_SLOW_STATEMENT_MS" => Some("250".to_string()),
            "SQLSCOPE_QUERY_COUNT_THRESHOLD" => Some("many".to_string()),
            "SQLSCOPE_MIN_GROUP_SIZE" => Some("5".to_string()),
            _ => None,
        };

        let c = thresholds(&args(&["sqlscope", "q.log"]), env);
        assert_eq!(c.slow_statement_ms, 250.0);
        assert_eq!(c.scope_statement_count_threshold, 20);
        assert_eq!(c.min_group_size_for_n_plus_one, 5);

        let c = thresholds(&args(&["sqlscope", "q.log", "--threshold", "0.5"]), env);
        assert_eq!(c.slow_statement_ms, 500.0);
        assert_eq!(c.min_group_size_for_n_plus_one, 5);

        let c = thresholds(&args(&["sqlscope", "q.log"]), |_| None);
        assert_eq!(c.slow_statement_ms, 100.0);
    }

    #[test]
    fn test_missing_log_file_argument() {
        assert!(Args::try_parse_from(["sqlscope"]).is_err());
    }

    #[test]
    fn test_run_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("queries.log");
        let mut f = std::fs::File::create(&log_path).unwrap();
        writeln!(f, "[SQL] (0.250s) SELECT * FROM big").unwrap();
        writeln!(f, "[SQL] (0.001s) SELECT * FROM tag WHERE id = 1").unwrap();
        drop(f);

        let out = dir.path().join("report.json");
        let a = args(&[
            "sqlscope",
            log_path.to_str().unwrap(),
            "--output",
            out.to_str().unwrap(),
        ]);
        run(&a).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(value["total_queries"], 2);
        assert_eq!(value["slow_queries"]["count"], 1);
    }

    #[test]
    fn test_run_missing_log() {
        let a = args(&["sqlscope", "/nonexistent/sqlscope.log"]);
        assert!(matches!(run(&a), Err(BatchError::SourceUnavailable { .. })));
    }
}

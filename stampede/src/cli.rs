use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    // Bare numbers are seconds, as in the YAML config.
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s)
        .map_err(|e| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m): {e}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    HumanReadable,
    /// Emit progress ticks and the end-of-run summary as JSON lines on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "stampede",
    author,
    version,
    about = "Scenario-driven load generation engine",
    long_about = "stampede runs a declarative load profile against a synthetic workload.\n\nA YAML config defines `scenarios` (executor, VUs, rates, stages), `thresholds` and the `exec` workloads each scenario runs.\n\nThresholds are evaluated while the run is in progress; `abortOnFail` thresholds stop it early.",
    after_help = "Examples:\n  stampede run load.yaml\n  stampede run load.yaml --vus 50 --duration 30s\n  stampede run load.yaml --output json --summary-export summary.json\n  stampede inspect load.yaml"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test config
    #[command(
        long_about = "Run the scenarios of a config file and report thresholds and metrics.\n\nAny of --vus/--iterations/--duration replaces the configured scenarios with a single `default` scenario."
    )]
    Run(RunArgs),

    /// Validate a config and print the resolved scenarios
    Inspect(InspectArgs),
}

/// Run-shape overrides shared by `run` and `inspect`.
#[derive(Debug, Args)]
pub struct ShapeArgs {
    /// Override iterations (shared across VUs)
    #[arg(long, env = "STAMPEDE_ITERATIONS")]
    pub iterations: Option<u64>,

    /// Number of virtual users
    #[arg(long, env = "STAMPEDE_VUS")]
    pub vus: Option<u64>,

    /// Test duration (e.g. 10s, 250ms, 1m)
    #[arg(long, env = "STAMPEDE_DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,
}

impl ShapeArgs {
    pub fn run_config(&self) -> stampede_core::RunConfig {
        stampede_core::RunConfig {
            iterations: self.iterations,
            vus: self.vus,
            duration: self.duration,
        }
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the config (.yaml)
    pub config: PathBuf,

    #[command(flatten)]
    pub shape: ShapeArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Write the end-of-run summary as JSON to this file
    #[arg(long, value_name = "PATH")]
    pub summary_export: Option<PathBuf>,

    /// Log filter (e.g. info, stampede_core=debug); `RUST_LOG` takes precedence
    #[arg(long, env = "STAMPEDE_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Do not print the summary
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Path to the config (.yaml)
    pub config: PathBuf,

    #[command(flatten)]
    pub shape: ShapeArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("1m 30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("5"), Ok(Duration::from_secs(5)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn cli_parses_run_with_overrides() {
        let parsed = Cli::try_parse_from([
            "stampede",
            "run",
            "load.yaml",
            "--iterations",
            "10",
            "--vus",
            "2",
            "--duration",
            "250ms",
            "--output",
            "json",
            "--summary-export",
            "out/summary.json",
            "--quiet",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.config, PathBuf::from("load.yaml"));
                assert_eq!(args.shape.iterations, Some(10));
                assert_eq!(args.shape.vus, Some(2));
                assert_eq!(args.shape.duration, Some(Duration::from_millis(250)));
                assert_eq!(args.output, OutputFormat::Json);
                assert_eq!(args.summary_export, Some(PathBuf::from("out/summary.json")));
                assert!(args.quiet);
                assert!(args.shape.run_config().is_set());
            }
            Command::Inspect(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_parses_inspect() {
        let parsed = Cli::try_parse_from(["stampede", "inspect", "load.yaml"]);
        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Inspect(args) => {
                assert_eq!(args.config, PathBuf::from("load.yaml"));
            }
            Command::Run(_) => panic!("expected inspect command"),
        }
    }
}

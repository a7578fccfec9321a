//! Load driver CLI for the orders API.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use order_load::{
    LoadDriver, Overrides, ResultsReport, RunReport, ScenarioConfig, ThresholdRule,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "order-load")]
#[command(about = "Load driver for the orders API", long_about = None)]
struct Cli {
    /// Log level (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and exit non-zero if any threshold fails
    Run {
        /// Built-in scenario name (create-orders, get-orders) or a YAML file
        scenario: String,

        /// Override the number of virtual workers
        #[arg(short, long)]
        workers: Option<u32>,

        /// Override run duration in seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Override think time between iterations in milliseconds
        #[arg(short, long)]
        think_time_ms: Option<u64>,

        /// Override the target base URL
        #[arg(long, env = "ORDER_LOAD_BASE_URL")]
        base_url: Option<String>,

        /// Override the per-request timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Replace the scenario's thresholds, e.g. "status:500 count>1" (repeatable)
        #[arg(long = "threshold")]
        thresholds: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,

        /// Write every request outcome to this JSONL file
        #[arg(long)]
        log_requests: Option<PathBuf>,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// List built-in scenarios and scenario files
    List {
        /// Scenarios directory
        #[arg(short, long, default_value = "scenarios")]
        dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    match cli.command {
        Commands::Run {
            scenario,
            workers,
            duration,
            think_time_ms,
            base_url,
            timeout_ms,
            thresholds,
            output,
            log_requests,
            no_progress,
        } => {
            let mut config = ScenarioConfig::resolve(&scenario)
                .with_context(|| format!("Failed to load scenario '{}'", scenario))?;

            let thresholds = if thresholds.is_empty() {
                None
            } else {
                Some(
                    thresholds
                        .iter()
                        .map(|rule| ThresholdRule::parse(rule))
                        .collect::<Result<Vec<_>, _>>()?,
                )
            };
            config.apply_overrides(Overrides {
                workers,
                duration_secs: duration,
                think_time_ms,
                base_url,
                request_timeout_ms: timeout_ms,
                thresholds,
            });

            let driver = LoadDriver::new(config)
                .context("Invalid scenario configuration")?
                .with_progress(!no_progress && output == OutputFormat::Table)
                .with_request_log(log_requests);

            let running = driver.start();
            let stop = running.stop_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping run");
                    stop.stop();
                }
            });

            let report = running.wait().await;
            print_report(&report, output)?;

            Ok(if report.passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::List { dir } => {
            list_scenarios(&dir);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_report(report: &RunReport, output: OutputFormat) -> anyhow::Result<()> {
    match output {
        OutputFormat::Json => println!("{}", ResultsReport::format_json(report)?),
        OutputFormat::Csv => {
            println!("{}", ResultsReport::csv_header());
            println!("{}", ResultsReport::format_csv(report));
        }
        OutputFormat::Table => println!("{}", ResultsReport::format_table(report)),
    }
    Ok(())
}

fn list_scenarios(dir: &Path) {
    println!("Built-in scenarios:");
    println!();
    for name in ScenarioConfig::builtin_names() {
        if let Some(config) = ScenarioConfig::builtin(name) {
            println!("  {} - {} workers, {}s", name, config.workers, config.duration_secs);
            println!("    {}", config.description);
            println!();
        }
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            info!(dir = %dir.display(), error = %e, "No scenario directory");
            return;
        }
    };

    let mut scenarios: Vec<(String, ScenarioConfig)> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .filter_map(|path| match ScenarioConfig::from_file(&path) {
            Ok(config) => Some((path.display().to_string(), config)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable scenario");
                None
            }
        })
        .collect();
    scenarios.sort_by(|a, b| a.0.cmp(&b.0));

    println!("Scenario files in {}:", dir.display());
    println!();
    if scenarios.is_empty() {
        println!("  No scenario files found");
    }
    for (path, config) in scenarios {
        println!("  {} - {}", path, config.name);
        println!("    {}", config.description);
        println!();
    }
}

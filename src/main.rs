// Token Watchdog - Main Entry Point
//
// CLI over the admission gate:
// - check:  admission verdict, exit status 1 when denied
// - record: log one observed request
// - status: read-only projection
// - usage:  upstream probe + local estimate

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, Level};

use token_watchdog::config::Config;
use token_watchdog::logging;
use token_watchdog::metrics;
use token_watchdog::watchdog::{AdmissionGate, JsonFileStore};

/// Token Rate Limit Watchdog
#[derive(Parser, Debug)]
#[command(name = "token-watchdog")]
#[command(version)]
#[command(about = "Admission gate for tokens-per-minute limited APIs", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the XDG config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State file override
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check before a request (exit status 1 if blocked)
    Check,
    /// Record one request after it was sent
    Record {
        /// Tokens consumed by the request (defaults to the configured cost)
        tokens: Option<u64>,
    },
    /// Show current usage and cooldown state
    Status {
        /// Output format
        #[arg(long, value_enum, default_value_t = StatusFormat::Json)]
        format: StatusFormat,
    },
    /// Query the upstream status command, then estimate usage
    Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StatusFormat {
    Json,
    Prometheus,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Resolved before the subscriber exists; reported once logging is up
    let config_path = args.config.clone().unwrap_or_else(Config::config_path);
    let mut config = Config::load_from_path(&config_path)?;
    if let Some(path) = args.state_file.clone() {
        config.state.path = path;
    }

    let level = if args.verbose {
        Level::DEBUG
    } else {
        config.log_level()?
    };
    logging::init_logging(&config.logging, level)?;
    metrics::init();

    if config_path.exists() {
        debug!("Loaded configuration from {:?}", config_path);
    } else {
        debug!("Config file not found at {:?}, using defaults", config_path);
    }

    let store = JsonFileStore::new(&config.state.path);
    debug!("Using state file {:?}", store.path());
    let gate = AdmissionGate::new(config.limits.clone(), store);

    match args.command {
        Some(Commands::Check) => {
            let verdict = gate.check_before_request().into_value();
            print_json(&verdict.report())?;
            if !verdict.is_allowed() {
                return Ok(ExitCode::from(1));
            }
        }
        Some(Commands::Record { tokens }) => {
            let tokens = tokens.unwrap_or(config.limits.default_request_tokens);
            print_json(&gate.record_request(tokens).into_value())?;
        }
        Some(Commands::Status { format }) => {
            let status = gate.get_status().into_value();
            match format {
                StatusFormat::Json => print_json(&status)?,
                StatusFormat::Prometheus => {
                    let tpm = i64::try_from(status.current_tpm).unwrap_or(i64::MAX);
                    metrics::ESTIMATED_TPM.set(tpm);
                    print!("{}", metrics::gather_metrics()?);
                }
            }
        }
        Some(Commands::Usage) => {
            let probe = config.probe.build();
            print_json(&gate.check_token_usage(&probe).await.into_value())?;
        }
        None => print_usage(&config),
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", json);
    Ok(())
}

fn print_usage(config: &Config) {
    println!("Token Rate Limit Watchdog");
    println!();
    println!("Usage:");
    println!("  token-watchdog check          # check before a request (exit 1 if blocked)");
    println!(
        "  token-watchdog record [N]     # record a request (default {} tokens)",
        config.limits.default_request_tokens
    );
    println!("  token-watchdog status         # show current state");
    println!();
    println!("Config:");
    println!("  TPM Threshold: {}", config.limits.tpm_threshold);
    println!("  TPM Limit: {}", config.limits.tpm_limit);
    println!("  Cooldown: {}s", config.limits.cooldown_seconds);
    println!("  State file: {}", config.state.path.display());
}

//! plantwatch - Industrial Telemetry Intelligence
//!
//! Command-line front end over a sled-backed `TelemetryEngine`.
//!
//! ## Usage
//! ```bash
//! simulation --ticks 500 | plantwatch ingest
//! plantwatch detect pl_temp_001 --hours 24
//! plantwatch forecast pl_temp_001 temperature --horizon 24
//! plantwatch train-reconstructor pl_speed_001 production_speed --window 10
//! plantwatch reconstruct pl_speed_001 production_speed --threshold 0.1
//! plantwatch alerts --limit 20
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use plantwatch::ml_engine::checkpoint;
use plantwatch::types::{ModelKey, Reading};
use plantwatch::{EngineConfig, TelemetryEngine};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "plantwatch")]
#[command(about = "Industrial telemetry intelligence: threshold alerts, outlier scoring, forecasting")]
#[command(version)]
struct CliArgs {
    /// Engine config file (overrides PLANTWATCH_CONFIG and ./plantwatch.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the sled data directory
    #[arg(long, global = true, value_name = "DIR", env = "PLANTWATCH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Read JSON-lines readings from stdin, store them and print any alerts
    Ingest,

    /// Outlier scan over the recent readings of one sensor
    Detect {
        sensor_id: String,
        /// Scan window in hours (training uses twice this)
        #[arg(long, default_value = "24")]
        hours: u64,
    },

    /// Forecast a parameter's trajectory
    Forecast {
        sensor_id: String,
        parameter: String,
        /// Hours ahead (default: forecast.default_horizon)
        #[arg(long)]
        horizon: Option<usize>,
    },

    /// Projected stock level and shortage risk for a warehouse sensor
    StockOutlook {
        sensor_id: String,
        #[arg(long, default_value = "7")]
        days: u32,
    },

    /// Train (and persist) a window reconstructor from stored history
    TrainReconstructor {
        sensor_id: String,
        parameter: String,
        /// Window length (default: reconstruction.default_window)
        #[arg(long)]
        window: Option<usize>,
        /// History to train on, in hours (default: reconstruction.history_hours)
        #[arg(long)]
        hours: Option<u64>,
        /// Also write the checkpoint to this JSON file
        #[arg(long, value_name = "PATH")]
        export: Option<PathBuf>,
    },

    /// Install a reconstructor checkpoint exported by another process
    ImportReconstructor {
        sensor_id: String,
        parameter: String,
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Sliding-window reconstruction scan over recent readings
    Reconstruct {
        sensor_id: String,
        parameter: String,
        #[arg(long, default_value = "24")]
        hours: u64,
        #[arg(long)]
        window: Option<usize>,
        /// Reconstruction error limit (default: reconstruction.default_threshold)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// List unresolved alerts, newest first
    Alerts {
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Mark an alert resolved
    Resolve { alert_id: u64 },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries JSON results
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::load(),
    };
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = dir;
    }

    let data_dir = config.storage.data_dir.clone();
    let engine = Arc::new(
        TelemetryEngine::open(config)
            .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?,
    );

    // Model training and sled I/O are blocking; keep them off the async workers
    let command = args.command;
    tokio::task::spawn_blocking(move || run(&engine, command))
        .await
        .map_err(|e| anyhow::anyhow!("Task panicked: {}", e))?
}

fn run(engine: &TelemetryEngine, command: SubCommand) -> Result<()> {
    match command {
        SubCommand::Ingest => ingest(engine),

        SubCommand::Detect { sensor_id, hours } => {
            print_json(&engine.detect_outliers(&sensor_id, hours)?)
        }

        SubCommand::Forecast {
            sensor_id,
            parameter,
            horizon,
        } => {
            let horizon = horizon.unwrap_or(engine.config().forecast.default_horizon);
            print_json(&engine.forecast(&sensor_id, &parameter, horizon)?)
        }

        SubCommand::StockOutlook { sensor_id, days } => {
            print_json(&engine.stock_outlook(&sensor_id, days)?)
        }

        SubCommand::TrainReconstructor {
            sensor_id,
            parameter,
            window,
            hours,
            export,
        } => {
            let defaults = &engine.config().reconstruction;
            let outcome = engine.train_reconstructor(
                &sensor_id,
                &parameter,
                window.unwrap_or(defaults.default_window),
                hours.unwrap_or(defaults.history_hours),
            )?;
            print_json(&outcome)?;

            if let Some(path) = export {
                let key = ModelKey::series(&sensor_id, &parameter)?;
                match engine.reconstructor().checkpoint(&key)? {
                    Some(cp) => {
                        checkpoint::save_to_disk(&cp, &path)
                            .with_context(|| format!("Failed to export checkpoint to {}", path.display()))?;
                        info!(path = %path.display(), "Checkpoint exported");
                    }
                    None => warn!(key = %key, "No stored checkpoint to export"),
                }
            }
            Ok(())
        }

        SubCommand::ImportReconstructor {
            sensor_id,
            parameter,
            path,
        } => {
            let cp = checkpoint::load_from_disk(&path)
                .with_context(|| format!("Failed to read checkpoint {}", path.display()))?;
            let key = ModelKey::series(&sensor_id, &parameter)?;
            engine.reconstructor().import(&key, &cp)?;
            Ok(())
        }

        SubCommand::Reconstruct {
            sensor_id,
            parameter,
            hours,
            window,
            threshold,
        } => {
            let window = window.unwrap_or(engine.config().reconstruction.default_window);
            print_json(&engine.detect_windows(&sensor_id, &parameter, hours, window, threshold)?)
        }

        SubCommand::Alerts { limit } => print_json(&engine.alerts().active_alerts(limit)?),

        SubCommand::Resolve { alert_id } => match engine.alerts().resolve(alert_id)? {
            Some(alert) => print_json(&alert),
            None => Err(anyhow::anyhow!("No alert with id {}", alert_id)),
        },
    }
}

/// JSON-lines in, alerts out. Malformed lines are skipped with a warning.
fn ingest(engine: &TelemetryEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut ingested = 0usize;
    let mut alerted = 0usize;

    for (line_no, line) in stdin.lock().lines().enumerate() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let reading: Reading = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "Skipping malformed reading");
                continue;
            }
        };

        for alert in engine.ingest(&reading)? {
            writeln!(stdout, "{}", serde_json::to_string(&alert)?)?;
            alerted += 1;
        }
        ingested += 1;
    }

    info!(readings = ingested, alerts = alerted, "Ingest complete");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

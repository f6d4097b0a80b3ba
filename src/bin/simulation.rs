//! Plant Telemetry Simulation
//!
//! Emits JSON-lines readings for the reference plant (raw material,
//! production line, warehouse) with occasional injected spikes and drops.
//!
//! # Usage
//! ```bash
//! ./simulation --ticks 2000 --interval-secs 60 --seed 7 | ./plantwatch ingest
//! ```

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::Parser;
use std::io::{self, Write};

use plantwatch::simulation::{ReadingSimulator, DEFAULT_ANOMALY_PROB};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "plant-simulation")]
#[command(about = "Synthetic plant telemetry for plantwatch testing")]
#[command(version = "1.0")]
struct Args {
    /// Number of ticks; each tick emits one reading per sensor
    #[arg(short, long, default_value = "100")]
    ticks: u32,

    /// Simulated seconds between ticks. Timestamps end at "now".
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u32).range(1..=86_400))]
    interval_secs: u32,

    /// Random seed for reproducibility
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Probability that a value is an injected anomaly
    #[arg(long, default_value_t = DEFAULT_ANOMALY_PROB)]
    anomaly_prob: f64,

    /// Only emit this sensor category (raw_material, production_line, warehouse)
    #[arg(long)]
    sensor_type: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut sim = ReadingSimulator::new(args.seed).with_anomaly_prob(args.anomaly_prob);
    let interval = Duration::seconds(i64::from(args.interval_secs));
    let start = Utc::now() - interval * args.ticks as i32;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut injected = 0usize;

    for tick in 0..args.ticks {
        let timestamp = start + interval * (tick as i32 + 1);
        let readings = match &args.sensor_type {
            Some(sensor_type) => sim.tick_category(sensor_type, timestamp),
            None => sim.tick(timestamp),
        };
        for reading in readings {
            injected += usize::from(reading.is_anomaly);
            writeln!(out, "{}", serde_json::to_string(&reading)?)?;
        }
    }

    out.flush()?;
    eprintln!("simulation: {} ticks, {} injected anomalies", args.ticks, injected);
    Ok(())
}

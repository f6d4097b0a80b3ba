//! plantwatch: Industrial Telemetry Intelligence
//!
//! Turns a stream of plant sensor readings into alerts, forecasts and
//! window-level anomaly reports.
//!
//! ## Architecture
//!
//! - **Threshold Rule Engine**: static min/max rules per (sensor type, parameter)
//! - **Outlier Scorer**: per-sensor isolation forest, auto-trained on the alert path
//! - **Trajectory Forecaster**: seasonal model with a permanent linear fallback
//! - **Window Reconstructor**: autoencoder over sliding windows, persisted durably
//! - **Alert Generator**: rules + outlier scoring, persisted as one batch per reading

pub mod alerts;
pub mod config;
pub mod engine;
pub mod ml_engine;
pub mod simulation;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, EngineConfig};

// Re-export commonly used types
pub use types::{
    Alert, AlertSeverity, AlertType, Detection, Forecast, ForecastMethod, ForecastOutcome,
    ForecastPoint, ModelKey, NewAlert, Reading, ThresholdRule,
};

// Re-export components
pub use alerts::{AlertGenerator, ThresholdEngine};
pub use engine::TelemetryEngine;
pub use ml_engine::{EngineError, OutlierScorer, TrajectoryForecaster, WindowReconstructor};

// Re-export storage
pub use storage::{InMemoryStore, SledStore, StorageError};

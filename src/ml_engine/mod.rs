//! ML Engine: per-key models over sensor history
//!
//! Components, leaf to root:
//! - `window`: Training-Window Extractor (reading stream -> sample set)
//! - `registry`: per-key training lock + atomically swapped handles
//! - `outlier`: Outlier Scorer (isolation forest, auto-trained on the alert path)
//! - `forecast`: Trajectory Forecaster (seasonal model, permanent linear fallback)
//! - `reconstructor`: Window Reconstructor (autoencoder, durable checkpoints)
//!
//! Every registry is owned by its component instance; nothing here is a
//! process-wide singleton, so tests build isolated engines freely.

pub mod autoencoder;
pub mod checkpoint;
pub mod forecast;
pub mod isolation_forest;
pub mod outlier;
pub mod reconstructor;
pub mod registry;
pub mod scaler;
pub mod window;

pub use forecast::{linear_forecast, ForecastError, ForecastModel, FittedForecast, TrajectoryForecaster};
pub use outlier::{OutlierHandle, OutlierScorer};
pub use reconstructor::{ReconstructorHandle, WindowReconstructor};
pub use registry::ModelRegistry;
pub use window::{SampleSet, TrainingWindow, WindowExtractor};

use crate::storage::StorageError;
use checkpoint::CheckpointError;
use crate::types::KeyError;

/// Hard failures of the ML components.
///
/// Insufficient data is never one of these; see the tagged outcome types.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid model key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("window size must be at least 2 (got {0})")]
    InvalidWindowSize(usize),

    #[error("window length mismatch: model expects {expected} values, got {actual}")]
    WindowLengthMismatch { expected: usize, actual: usize },

    #[error("unusable checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

//! System-wide default constants.
//!
//! Centralises the minimums and sizes shared by several components.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Storage
// ============================================================================

/// Default data directory for the sled database.
pub const DATA_DIR: &str = "./data";

// ============================================================================
// ML Engine
// ============================================================================

/// Fewer readings than this in a training window is insufficient data.
pub const MIN_TRAINING_SAMPLES: usize = 10;

/// Minimum historical points before the Trajectory Forecaster fits anything.
pub const MIN_FORECAST_HISTORY: usize = 24;

/// Minimum stride-1 windows for a Window Reconstructor training run.
pub const MIN_RECONSTRUCTION_WINDOWS: usize = 10;

/// Hidden layer width of the window autoencoder.
pub const AUTOENCODER_HIDDEN: usize = 16;

/// Smallest autoencoder code width (`max(4, window / 4)`).
pub const AUTOENCODER_MIN_CODE: usize = 4;

/// Checkpoint format version written by the Window Reconstructor.
pub const CHECKPOINT_VERSION: u32 = 1;

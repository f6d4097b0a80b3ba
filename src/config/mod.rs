//! Engine Configuration Module
//!
//! Provides the engine configuration loaded from TOML files: model
//! hyper-parameters, the auto-train policy and the static threshold table.
//!
//! ## Loading Order
//!
//! 1. `PLANTWATCH_CONFIG` environment variable (path to TOML file)
//! 2. `plantwatch.toml` in the current working directory
//! 3. Built-in defaults
//!
//! Components receive their section explicitly, so tests can build isolated
//! engines with different settings in the same process:
//!
//! ```ignore
//! let config = EngineConfig::load();
//! let scorer = OutlierScorer::new(config.outlier.clone());
//! ```

mod engine_config;
pub mod defaults;

pub use engine_config::*;

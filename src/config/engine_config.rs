//! Engine Configuration - model hyper-parameters and rule tables as TOML values
//!
//! Each section implements `Default` with the values the engine ships with,
//! so an empty or missing config file behaves exactly like the built-ins.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::types::{default_threshold_table, ThresholdTable, DEFAULT_ML_PARAMETERS};

use super::defaults;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "PLANTWATCH_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "plantwatch.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one engine process.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$PLANTWATCH_CONFIG`
/// 2. `./plantwatch.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub outlier: OutlierConfig,

    #[serde(default)]
    pub forecast: ForecastConfig,

    #[serde(default)]
    pub reconstruction: ReconstructionConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    /// Static rules, `sensor_type -> parameter -> {min, max}`.
    #[serde(default = "default_threshold_table")]
    pub thresholds: ThresholdTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            outlier: OutlierConfig::default(),
            forecast: ForecastConfig::default(),
            reconstruction: ReconstructionConfig::default(),
            alerts: AlertConfig::default(),
            thresholds: default_threshold_table(),
        }
    }
}

impl EngineConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded engine config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded engine config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found - using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate hyper-parameters and rule bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let o = &self.outlier;
        if !(o.contamination > 0.0 && o.contamination <= 0.5) {
            errors.push(format!(
                "outlier.contamination must be in (0, 0.5] (got {})",
                o.contamination
            ));
        }
        Self::check_positive(o.n_trees, "outlier.n_trees", &mut errors);
        Self::check_positive(o.max_samples, "outlier.max_samples", &mut errors);
        Self::check_positive(o.recent_limit, "outlier.recent_limit", &mut errors);
        if o.min_samples < defaults::MIN_TRAINING_SAMPLES {
            errors.push(format!(
                "outlier.min_samples must be >= {} (got {})",
                defaults::MIN_TRAINING_SAMPLES,
                o.min_samples
            ));
        }

        let f = &self.forecast;
        if !(f.interval_width > 0.0 && f.interval_width < 1.0) {
            errors.push(format!(
                "forecast.interval_width must be in (0, 1) (got {})",
                f.interval_width
            ));
        }
        if f.min_history < 2 {
            errors.push(format!("forecast.min_history must be >= 2 (got {})", f.min_history));
        }
        Self::check_positive(f.default_horizon, "forecast.default_horizon", &mut errors);

        let r = &self.reconstruction;
        Self::check_positive(r.epochs, "reconstruction.epochs", &mut errors);
        Self::check_positive(r.batch_size, "reconstruction.batch_size", &mut errors);
        Self::check_positive(r.min_windows, "reconstruction.min_windows", &mut errors);
        if r.default_window < 2 {
            errors.push(format!(
                "reconstruction.default_window must be >= 2 (got {})",
                r.default_window
            ));
        }
        if !(r.learning_rate.is_finite() && r.learning_rate > 0.0) {
            errors.push(format!(
                "reconstruction.learning_rate must be positive (got {})",
                r.learning_rate
            ));
        }

        for (sensor_type, rules) in &self.thresholds {
            for (parameter, rule) in rules {
                if let (Some(min), Some(max)) = (rule.min, rule.max) {
                    if !min.is_finite() || !max.is_finite() || min > max {
                        errors.push(format!(
                            "thresholds.{sensor_type}.{parameter}: min ({min}) must be <= max ({max})"
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_positive(value: usize, name: &str, errors: &mut Vec<String>) {
        if value == 0 {
            errors.push(format!("{name} must be >= 1"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Storage Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the sled database (readings, alerts, model checkpoints).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(defaults::DATA_DIR)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

// ============================================================================
// Outlier Scorer Config
// ============================================================================

/// Isolation forest parameters and the auto-train policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierConfig {
    /// Expected fraction of training samples treated as outliers.
    #[serde(default = "default_contamination")]
    pub contamination: f64,

    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    /// Sub-sample size per tree (capped at the training set size).
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    #[serde(default = "default_outlier_seed")]
    pub seed: u64,

    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Lookback used by the alert path when auto-training.
    #[serde(default = "default_training_lookback_hours")]
    pub training_lookback_hours: u64,

    /// How many of the most recent readings `detect_recent` re-scores.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// Auto-train path replaces handles older than this. `0` keeps handles forever.
    #[serde(default = "default_retrain_after_hours")]
    pub retrain_after_hours: u64,
}

fn default_contamination() -> f64 { 0.1 }
fn default_n_trees() -> usize { 100 }
fn default_max_samples() -> usize { 256 }
fn default_outlier_seed() -> u64 { 42 }
fn default_min_samples() -> usize { defaults::MIN_TRAINING_SAMPLES }
fn default_training_lookback_hours() -> u64 { 24 }
fn default_recent_limit() -> usize { 100 }
fn default_retrain_after_hours() -> u64 { 24 }

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            contamination: default_contamination(),
            n_trees: default_n_trees(),
            max_samples: default_max_samples(),
            seed: default_outlier_seed(),
            min_samples: default_min_samples(),
            training_lookback_hours: default_training_lookback_hours(),
            recent_limit: default_recent_limit(),
            retrain_after_hours: default_retrain_after_hours(),
        }
    }
}

// ============================================================================
// Forecast Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Fewer historical points than this is insufficient data.
    #[serde(default = "default_min_history")]
    pub min_history: usize,

    #[serde(default = "default_forecast_history_hours")]
    pub history_hours: u64,

    #[serde(default = "default_horizon")]
    pub default_horizon: usize,

    /// Fourier order of the 24 h component.
    #[serde(default = "default_daily_order")]
    pub daily_order: usize,

    /// Fourier order of the 168 h component.
    #[serde(default = "default_weekly_order")]
    pub weekly_order: usize,

    #[serde(default = "default_interval_width")]
    pub interval_width: f64,

    /// When false every key is fallback-only from process start.
    #[serde(default = "default_seasonal_enabled")]
    pub seasonal_enabled: bool,

    #[serde(default = "default_stock_history_days")]
    pub stock_history_days: u64,

    #[serde(default = "default_stock_min_points")]
    pub stock_min_points: usize,
}

fn default_min_history() -> usize { defaults::MIN_FORECAST_HISTORY }
fn default_forecast_history_hours() -> u64 { 168 }
fn default_horizon() -> usize { 24 }
fn default_daily_order() -> usize { 4 }
fn default_weekly_order() -> usize { 3 }
fn default_interval_width() -> f64 { 0.95 }
fn default_seasonal_enabled() -> bool { true }
fn default_stock_history_days() -> u64 { 30 }
fn default_stock_min_points() -> usize { 10 }

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_history: default_min_history(),
            history_hours: default_forecast_history_hours(),
            default_horizon: default_horizon(),
            daily_order: default_daily_order(),
            weekly_order: default_weekly_order(),
            interval_width: default_interval_width(),
            seasonal_enabled: default_seasonal_enabled(),
            stock_history_days: default_stock_history_days(),
            stock_min_points: default_stock_min_points(),
        }
    }
}

// ============================================================================
// Reconstruction Config
// ============================================================================

/// Autoencoder training schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_min_windows")]
    pub min_windows: usize,

    #[serde(default = "default_window")]
    pub default_window: usize,

    /// Mean squared reconstruction error above which a window is anomalous.
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,

    /// History queried when a detection pass has to train first.
    #[serde(default = "default_reconstruction_history_hours")]
    pub history_hours: u64,

    #[serde(default = "default_reconstruction_seed")]
    pub seed: u64,
}

fn default_epochs() -> usize { 50 }
fn default_batch_size() -> usize { 32 }
fn default_learning_rate() -> f64 { 0.001 }
fn default_min_windows() -> usize { defaults::MIN_RECONSTRUCTION_WINDOWS }
fn default_window() -> usize { 10 }
fn default_threshold() -> f64 { 0.1 }
fn default_reconstruction_history_hours() -> u64 { 168 }
fn default_reconstruction_seed() -> u64 { 42 }

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            min_windows: default_min_windows(),
            default_window: default_window(),
            default_threshold: default_threshold(),
            history_hours: default_reconstruction_history_hours(),
            seed: default_reconstruction_seed(),
        }
    }
}

// ============================================================================
// Alert Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Parameters that get outlier scoring on the alert path.
    #[serde(default = "default_ml_parameters")]
    pub ml_parameters: Vec<String>,
}

fn default_ml_parameters() -> Vec<String> {
    DEFAULT_ML_PARAMETERS.iter().map(|p| (*p).to_string()).collect()
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            ml_parameters: default_ml_parameters(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.len(), 3);
        assert_eq!(config.alerts.ml_parameters.len(), 3);
    }

    #[test]
    fn test_empty_toml_matches_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.outlier.n_trees, 100);
        assert_eq!(config.reconstruction.epochs, 50);
        assert_eq!(config.forecast.min_history, 24);
        assert!(config.thresholds.contains_key("warehouse"));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [outlier]
            contamination = 0.05

            [thresholds.kiln]
            temperature = { max = 1200.0 }
            "#,
        )
        .unwrap();
        assert!((config.outlier.contamination - 0.05).abs() < 1e-12);
        assert_eq!(config.outlier.n_trees, 100);
        // An explicit table replaces the built-in one.
        assert_eq!(config.thresholds.len(), 1);
        assert_eq!(config.thresholds["kiln"]["temperature"].max, Some(1200.0));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = EngineConfig::default();
        config.outlier.contamination = 0.9;
        config.reconstruction.epochs = 0;
        config
            .thresholds
            .get_mut("warehouse")
            .unwrap()
            .get_mut("humidity")
            .unwrap()
            .min = Some(80.0);

        match config.validate() {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_from_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plantwatch.toml");
        let mut config = EngineConfig::default();
        config.forecast.seasonal_enabled = false;
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        let loaded = EngineConfig::load_from_file(&path).unwrap();
        assert!(!loaded.forecast.seasonal_enabled);
        assert_eq!(loaded.thresholds, config.thresholds);
    }
}

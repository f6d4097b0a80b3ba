//! Trajectory Forecaster
//!
//! Per (sensor, parameter) forecasts with uncertainty bounds. Forecasting
//! methods sit behind the [`ForecastModel`] capability trait:
//! - `seasonal`: trend + daily/weekly Fourier terms, fitted once per key
//! - `linear`: least squares on elapsed hours, recomputed on every call
//!
//! Each key carries one state tag: untried, trained, or fallback-only. A key
//! whose primary model fails to fit *or* to predict is demoted to
//! fallback-only for the rest of the process and never tries the primary
//! again. With no primary configured every key is fallback-only from start.

pub mod linear;
pub mod seasonal;

pub use linear::{stock_outlook_from, LeastSquares, LinearForecaster, LinearTrend};
pub use seasonal::SeasonalForecaster;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ForecastConfig;
use crate::storage::ReadingStore;
use crate::types::{
    parameters, Forecast, ForecastKeyState, ForecastMethod, ForecastOutcome, ForecastPoint, ModelKey,
    StockOutlookOutcome,
};

use super::registry::ModelRegistry;
use super::window::{lookback_days, lookback_hours, since, SampleSet};
use super::EngineError;

/// Errors inside the forecasting capability interface.
///
/// These never escape [`TrajectoryForecaster::forecast`]: a primary failure
/// demotes the key and the fallback answers instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForecastError {
    #[error("fit failed: {0}")]
    Fit(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("insufficient history: {available} points, need {required}")]
    InsufficientHistory { available: usize, required: usize },
}

/// A forecasting method that can be fitted on `(timestamp, value)` history.
pub trait ForecastModel: Send + Sync {
    fn method(&self) -> ForecastMethod;

    fn fit(&self, history: &[(DateTime<Utc>, f64)]) -> Result<Box<dyn FittedForecast>, ForecastError>;
}

/// A fitted model, able to forecast `horizon` hourly steps after `last`.
pub trait FittedForecast: Send + Sync {
    fn predict(&self, last: DateTime<Utc>, horizon: usize) -> Result<Vec<ForecastPoint>, ForecastError>;
}

/// Registry entry for one key. Absent means untried.
enum PrimaryState {
    Trained(Box<dyn FittedForecast>),
    FallbackOnly,
}

/// Linear forecast over `history` (ascending). `None` below two points.
pub fn linear_forecast(history: &[(DateTime<Utc>, f64)], horizon: usize) -> Option<Forecast> {
    let trend = LinearTrend::fit(history).ok()?;
    let (last_ts, last_value) = history[history.len() - 1];
    let points = trend.predict(last_ts, horizon).ok()?;
    Some(Forecast {
        method: ForecastMethod::LinearFallback,
        horizon_hours: horizon,
        current_value: last_value,
        points,
    })
}

pub struct TrajectoryForecaster {
    config: ForecastConfig,
    primary: Option<Box<dyn ForecastModel>>,
    registry: ModelRegistry<PrimaryState>,
}

impl TrajectoryForecaster {
    /// Seasonal primary (unless disabled in config) with linear fallback.
    pub fn new(config: ForecastConfig) -> Self {
        let primary: Option<Box<dyn ForecastModel>> = if config.seasonal_enabled {
            Some(Box::new(SeasonalForecaster::from_config(&config)))
        } else {
            info!("Seasonal forecasting disabled, every key is fallback-only");
            None
        };
        Self {
            config,
            primary,
            registry: ModelRegistry::new(),
        }
    }

    /// No primary method: every key starts fallback-only.
    pub fn linear_only(config: ForecastConfig) -> Self {
        Self {
            config,
            primary: None,
            registry: ModelRegistry::new(),
        }
    }

    /// Custom primary method.
    pub fn with_primary(config: ForecastConfig, primary: Box<dyn ForecastModel>) -> Self {
        Self {
            config,
            primary: Some(primary),
            registry: ModelRegistry::new(),
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Primary-model state tag of `key`.
    pub fn state(&self, key: &ModelKey) -> ForecastKeyState {
        if self.primary.is_none() {
            return ForecastKeyState::FallbackOnly;
        }
        match self.registry.get(&key.to_string()).as_deref() {
            None => ForecastKeyState::Untried,
            Some(PrimaryState::Trained(_)) => ForecastKeyState::Trained,
            Some(PrimaryState::FallbackOnly) => ForecastKeyState::FallbackOnly,
        }
    }

    /// Forecast `horizon` hourly points after the last point of `history`
    /// (ascending `(timestamp, value)` pairs).
    pub fn forecast(
        &self,
        key: &ModelKey,
        history: &[(DateTime<Utc>, f64)],
        horizon: usize,
    ) -> Result<ForecastOutcome, EngineError> {
        key.require_parameter()?;

        let history: Vec<(DateTime<Utc>, f64)> =
            history.iter().copied().filter(|(_, v)| v.is_finite()).collect();
        if history.len() < self.config.min_history {
            return Ok(ForecastOutcome::InsufficientData {
                available: history.len(),
                required: self.config.min_history,
            });
        }

        let Some(primary) = self.primary.as_deref() else {
            return Ok(self.fallback(&history, horizon));
        };

        let key_str = key.to_string();
        let state = match self.registry.get(&key_str) {
            Some(state) => state,
            None => self.fit_primary(&key_str, primary, &history),
        };

        let PrimaryState::Trained(model) = state.as_ref() else {
            return Ok(self.fallback(&history, horizon));
        };

        let (last_ts, last_value) = history[history.len() - 1];
        match model.predict(last_ts, horizon) {
            Ok(points) => Ok(ForecastOutcome::Forecast(Forecast {
                method: primary.method(),
                horizon_hours: horizon,
                current_value: last_value,
                points,
            })),
            Err(e) => {
                self.demote(&key_str, &e);
                Ok(self.fallback(&history, horizon))
            }
        }
    }

    /// Fit the primary once under the key's training lock.
    fn fit_primary(
        &self,
        key: &str,
        primary: &dyn ForecastModel,
        history: &[(DateTime<Utc>, f64)],
    ) -> Arc<PrimaryState> {
        self.registry.with_training_lock(key, |current| {
            // Another request may have finished fitting while we waited
            if let Some(state) = current {
                return (None, state);
            }
            let state = Arc::new(match primary.fit(history) {
                Ok(model) => {
                    info!(key = %key, points = history.len(), "Primary forecaster fitted");
                    PrimaryState::Trained(model)
                }
                Err(e) => {
                    warn!(
                        key = %key,
                        error = %e,
                        "Primary forecaster failed to fit, using linear fallback for this key from now on"
                    );
                    PrimaryState::FallbackOnly
                }
            });
            (Some(Arc::clone(&state)), state)
        })
    }

    /// Demote `key` to fallback-only, logging once.
    fn demote(&self, key: &str, error: &ForecastError) {
        self.registry.with_training_lock(key, |current| match current.as_deref() {
            Some(PrimaryState::FallbackOnly) => (None, ()),
            _ => {
                warn!(
                    key = %key,
                    error = %error,
                    "Primary forecaster failed to predict, using linear fallback for this key from now on"
                );
                (Some(Arc::new(PrimaryState::FallbackOnly)), ())
            }
        });
    }

    /// Linear forecast, or `InsufficientData` below two points. A validated
    /// config gates `min_history >= 2` before this; a hand-built
    /// `ForecastConfig` with a lower minimum reaches the two-point check.
    fn fallback(&self, history: &[(DateTime<Utc>, f64)], horizon: usize) -> ForecastOutcome {
        match linear_forecast(history, horizon) {
            Some(forecast) => ForecastOutcome::Forecast(forecast),
            None => ForecastOutcome::InsufficientData {
                available: history.len(),
                required: 2,
            },
        }
    }

    /// Query the last `history_hours` of `key` from `store`, then forecast.
    pub fn forecast_recent(
        &self,
        store: &dyn ReadingStore,
        key: &ModelKey,
        horizon: usize,
        history_hours: u64,
    ) -> Result<ForecastOutcome, EngineError> {
        let parameter = key.require_parameter()?;
        let readings = store.query(
            key.sensor_id(),
            Some(parameter),
            since(Utc::now(), lookback_hours(history_hours)),
        )?;
        let history = SampleSet::from_readings(&readings).series();
        debug!(key = %key, points = history.len(), "Forecast history loaded");
        self.forecast(key, &history, horizon)
    }

    /// Stock-level projection for a warehouse sensor, `days_ahead` out.
    pub fn stock_outlook(
        &self,
        store: &dyn ReadingStore,
        sensor_id: &str,
        days_ahead: u32,
    ) -> Result<StockOutlookOutcome, EngineError> {
        let key = ModelKey::series(sensor_id, parameters::STOCK_LEVEL)?;
        let start = since(Utc::now(), lookback_days(self.config.stock_history_days));
        let readings = store.query(key.sensor_id(), key.parameter(), start)?;
        let history = SampleSet::from_readings(&readings).series();
        Ok(stock_outlook_from(&history, days_ahead, self.config.stock_min_points))
    }
}

//! TelemetryEngine: one process's wiring of stores and components
//!
//! All components share one backing store (readings, alerts and model
//! checkpoints live in separate trees of the same sled database).

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::alerts::{AlertGenerator, ThresholdEngine};
use crate::config::EngineConfig;
use crate::ml_engine::{window, EngineError, OutlierScorer, TrajectoryForecaster, WindowReconstructor};
use crate::storage::{AlertStore, InMemoryStore, ModelStore, ReadingStore, SledStore, StorageError};
use crate::types::{
    Alert, Detection, ForecastOutcome, ModelKey, OutlierAnomaly, Reading, ReconstructionAnomaly,
    ReconstructorTraining, StockOutlookOutcome,
};

pub struct TelemetryEngine {
    config: EngineConfig,
    readings: Arc<dyn ReadingStore>,
    outlier: Arc<OutlierScorer>,
    forecaster: TrajectoryForecaster,
    reconstructor: WindowReconstructor,
    alerts: AlertGenerator,
}

impl TelemetryEngine {
    /// Open (or create) the sled database at `config.storage.data_dir`.
    pub fn open(config: EngineConfig) -> Result<Self, StorageError> {
        let store = Arc::new(SledStore::open(&config.storage.data_dir)?);
        Ok(Self::with_stores(config, store.clone(), store.clone(), store))
    }

    /// Open at an explicit path, ignoring `storage.data_dir`.
    pub fn open_at(config: EngineConfig, path: &Path) -> Result<Self, StorageError> {
        let store = Arc::new(SledStore::open(path)?);
        Ok(Self::with_stores(config, store.clone(), store.clone(), store))
    }

    /// Non-durable engine for tests and one-shot runs.
    pub fn in_memory(config: EngineConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::with_stores(config, store.clone(), store.clone(), store)
    }

    pub fn with_stores(
        config: EngineConfig,
        readings: Arc<dyn ReadingStore>,
        alerts: Arc<dyn AlertStore>,
        models: Arc<dyn ModelStore>,
    ) -> Self {
        let outlier = Arc::new(OutlierScorer::new(config.outlier.clone()));
        let forecaster = TrajectoryForecaster::new(config.forecast.clone());
        let reconstructor = WindowReconstructor::new(config.reconstruction.clone(), models);
        let generator = AlertGenerator::new(
            readings.clone(),
            alerts,
            outlier.clone(),
            ThresholdEngine::new(config.thresholds.clone()),
            config.alerts.ml_parameters.clone(),
        );

        info!(
            rule_types = config.thresholds.len(),
            ml_parameters = ?config.alerts.ml_parameters,
            seasonal = config.forecast.seasonal_enabled,
            "Telemetry engine ready"
        );

        Self {
            config,
            readings,
            outlier,
            forecaster,
            reconstructor,
            alerts: generator,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn readings(&self) -> &dyn ReadingStore {
        self.readings.as_ref()
    }

    pub fn outlier(&self) -> &OutlierScorer {
        &self.outlier
    }

    pub fn forecaster(&self) -> &TrajectoryForecaster {
        &self.forecaster
    }

    pub fn reconstructor(&self) -> &WindowReconstructor {
        &self.reconstructor
    }

    pub fn alerts(&self) -> &AlertGenerator {
        &self.alerts
    }

    /// Store a reading, then run it through the Alert Generator.
    pub fn ingest(&self, reading: &Reading) -> Result<Vec<Alert>, EngineError> {
        self.readings.insert(reading)?;
        self.alerts.process(reading)
    }

    pub fn detect_outliers(
        &self,
        sensor_id: &str,
        lookback_hours: u64,
    ) -> Result<Detection<OutlierAnomaly>, EngineError> {
        let key = ModelKey::sensor(sensor_id)?;
        self.outlier
            .detect_recent(self.readings(), &key, window::lookback_hours(lookback_hours))
    }

    pub fn forecast(
        &self,
        sensor_id: &str,
        parameter: &str,
        horizon_hours: usize,
    ) -> Result<ForecastOutcome, EngineError> {
        let key = ModelKey::series(sensor_id, parameter)?;
        self.forecaster
            .forecast_recent(self.readings(), &key, horizon_hours, self.config.forecast.history_hours)
    }

    pub fn stock_outlook(&self, sensor_id: &str, days_ahead: u32) -> Result<StockOutlookOutcome, EngineError> {
        self.forecaster.stock_outlook(self.readings(), sensor_id, days_ahead)
    }

    pub fn train_reconstructor(
        &self,
        sensor_id: &str,
        parameter: &str,
        window_size: usize,
        history_hours: u64,
    ) -> Result<ReconstructorTraining, EngineError> {
        let key = ModelKey::series(sensor_id, parameter)?;
        self.reconstructor
            .train_recent(self.readings(), &key, window_size, history_hours)
    }

    pub fn detect_windows(
        &self,
        sensor_id: &str,
        parameter: &str,
        lookback_hours: u64,
        window_size: usize,
        threshold: Option<f64>,
    ) -> Result<Detection<ReconstructionAnomaly>, EngineError> {
        let key = ModelKey::series(sensor_id, parameter)?;
        self.reconstructor.detect_recent(
            self.readings(),
            &key,
            window::lookback_hours(lookback_hours),
            window_size,
            threshold,
        )
    }
}

//! Window Reconstructor: autoencoder anomaly scoring over sliding windows
//!
//! The anomaly score of a window is the mean squared error between the
//! min-max scaled window and its reconstruction. Handles are persisted to
//! the [`ModelStore`] right after training and auto-loaded on first use, so
//! another process can score without retraining.
//!
//! Persistence failures never invalidate an in-memory handle: a failed save
//! is logged and reported (`persisted: false`), a failed load falls back to
//! retraining from history.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ReconstructionConfig;
use crate::storage::{ModelStore, ReadingStore};
use crate::types::{
    Detection, ModelKey, ReconstructionAnomaly, ReconstructorTraining, TrainingReport, WindowScore,
};

use super::autoencoder::{Autoencoder, TrainSchedule};
use super::checkpoint::{CheckpointError, ReconstructorCheckpoint};
use super::registry::ModelRegistry;
use super::scaler::MinMaxScaler;
use super::window::{lookback_hours, since, SampleSet};
use super::EngineError;

/// Trained autoencoder and the scaler fitted on its training series.
#[derive(Debug, Clone)]
pub struct ReconstructorHandle {
    model: Autoencoder,
    scaler: MinMaxScaler,
    trained_at: DateTime<Utc>,
}

impl ReconstructorHandle {
    fn from_checkpoint(cp: &ReconstructorCheckpoint) -> Result<Self, CheckpointError> {
        Ok(Self {
            model: cp.restore()?,
            scaler: cp.scaler,
            trained_at: cp.trained_at,
        })
    }

    pub fn window_size(&self) -> usize {
        self.model.window_size()
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Reconstruction error of a raw window (length already checked).
    fn error(&self, window: &[f64]) -> f64 {
        self.model.reconstruction_error(&self.scaler.transform_all(window))
    }
}

/// Stride-1 window count over `points` values.
pub fn window_count(points: usize, window_size: usize) -> usize {
    if window_size == 0 || points < window_size {
        0
    } else {
        points - window_size + 1
    }
}

pub struct WindowReconstructor {
    config: ReconstructionConfig,
    models: Arc<dyn ModelStore>,
    registry: ModelRegistry<ReconstructorHandle>,
}

impl WindowReconstructor {
    pub fn new(config: ReconstructionConfig, models: Arc<dyn ModelStore>) -> Self {
        Self {
            config,
            models,
            registry: ModelRegistry::new(),
        }
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Train a handle for `key` on a flat value series (oldest first).
    pub fn train(
        &self,
        key: &ModelKey,
        window_size: usize,
        history: &[f64],
    ) -> Result<ReconstructorTraining, EngineError> {
        key.require_parameter()?;
        if window_size < 2 {
            return Err(EngineError::InvalidWindowSize(window_size));
        }

        let values: Vec<f64> = history.iter().copied().filter(|v| v.is_finite()).collect();
        if values.len() < 2 * window_size {
            return Ok(ReconstructorTraining::InsufficientData {
                available: values.len(),
                required: 2 * window_size,
            });
        }

        let windows = window_count(values.len(), window_size);
        if windows < self.config.min_windows {
            return Ok(ReconstructorTraining::InsufficientWindows {
                available: windows,
                required: self.config.min_windows,
            });
        }

        let key_str = key.to_string();
        let report = self.registry.with_training_lock(&key_str, |_| {
            let (handle, report) = self.fit(&key_str, window_size, &values);
            (Some(Arc::new(handle)), report)
        });
        Ok(ReconstructorTraining::Trained(report))
    }

    fn fit(&self, key: &str, window_size: usize, values: &[f64]) -> (ReconstructorHandle, TrainingReport) {
        let scaler = MinMaxScaler::fit(values);
        let scaled = scaler.transform_all(values);
        let windows: Vec<Vec<f64>> = scaled.windows(window_size).map(<[f64]>::to_vec).collect();

        info!(
            key = %key,
            windows = windows.len(),
            epochs = self.config.epochs,
            "Starting autoencoder training"
        );

        let mut model = Autoencoder::new(window_size, self.config.seed);
        let epoch_losses = model.train(
            &windows,
            &TrainSchedule {
                epochs: self.config.epochs,
                batch_size: self.config.batch_size,
                learning_rate: self.config.learning_rate,
                seed: self.config.seed,
            },
        );

        for (epoch, loss) in epoch_losses.iter().enumerate() {
            if epoch == 0 || (epoch + 1) % 10 == 0 {
                info!(key = %key, epoch = epoch + 1, loss = format!("{loss:.6}"), "Epoch complete");
            }
        }

        let initial_loss = epoch_losses.first().copied().unwrap_or(0.0);
        let final_loss = epoch_losses.last().copied().unwrap_or(0.0);
        let trained_at = Utc::now();

        let checkpoint = ReconstructorCheckpoint::capture(&model, scaler, trained_at, final_loss);
        let persisted = match self.models.save_checkpoint(key, &checkpoint) {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to persist reconstructor, keeping in-memory handle");
                false
            }
        };

        info!(
            key = %key,
            initial_loss = format!("{initial_loss:.6}"),
            final_loss = format!("{final_loss:.6}"),
            persisted,
            "Autoencoder trained"
        );

        let report = TrainingReport {
            epochs: epoch_losses.len(),
            initial_loss,
            final_loss,
            epoch_losses,
            data_points: values.len(),
            windows: windows.len(),
            window_size,
            persisted,
        };
        let handle = ReconstructorHandle {
            model,
            scaler,
            trained_at,
        };
        (handle, report)
    }

    /// Cached handle, or one loaded from the model store.
    ///
    /// Load failures are logged and reported as "no handle".
    pub fn handle(&self, key: &ModelKey) -> Option<Arc<ReconstructorHandle>> {
        let key_str = key.to_string();
        if let Some(handle) = self.registry.get(&key_str) {
            return Some(handle);
        }

        self.registry.with_training_lock(&key_str, |current| {
            if current.is_some() {
                return (None, current);
            }
            let loaded = match self.models.load_checkpoint(&key_str) {
                Ok(Some(cp)) => match ReconstructorHandle::from_checkpoint(&cp) {
                    Ok(handle) => Some(Arc::new(handle)),
                    Err(e) => {
                        warn!(key = %key_str, error = %e, "Stored reconstructor is unusable");
                        None
                    }
                },
                Ok(None) => None,
                Err(e) => {
                    warn!(key = %key_str, error = %e, "Failed to load reconstructor");
                    None
                }
            };
            if loaded.is_some() {
                info!(key = %key_str, "Reconstructor loaded from model store");
            }
            (loaded.clone(), loaded)
        })
    }

    /// The durable checkpoint stored for `key`, if any.
    pub fn checkpoint(&self, key: &ModelKey) -> Result<Option<ReconstructorCheckpoint>, EngineError> {
        key.require_parameter()?;
        Ok(self.models.load_checkpoint(&key.to_string())?)
    }

    /// Install an externally produced checkpoint: validated, persisted, then
    /// swapped in as the live handle.
    pub fn import(&self, key: &ModelKey, checkpoint: &ReconstructorCheckpoint) -> Result<(), EngineError> {
        key.require_parameter()?;
        let handle = Arc::new(ReconstructorHandle::from_checkpoint(checkpoint)?);
        let key_str = key.to_string();
        self.registry.with_training_lock(&key_str, |_| {
            match self.models.save_checkpoint(&key_str, checkpoint) {
                Ok(()) => (Some(handle), Ok(())),
                Err(e) => (None, Err(e)),
            }
        })?;
        info!(key = %key_str, window_size = checkpoint.window_size, "Reconstructor imported");
        Ok(())
    }

    /// Score one raw window. No handle means `(false, 0.0)`.
    ///
    /// `threshold` defaults to `default_threshold` from config.
    pub fn score(
        &self,
        key: &ModelKey,
        window: &[f64],
        threshold: Option<f64>,
    ) -> Result<WindowScore, EngineError> {
        key.require_parameter()?;
        let Some(handle) = self.handle(key) else {
            return Ok(WindowScore::UNAVAILABLE);
        };
        if window.len() != handle.window_size() {
            return Err(EngineError::WindowLengthMismatch {
                expected: handle.window_size(),
                actual: window.len(),
            });
        }

        let error = handle.error(window);
        Ok(WindowScore {
            is_anomaly: error > threshold.unwrap_or(self.config.default_threshold),
            error,
        })
    }

    /// Query the last `history_hours` of `key` and train on it.
    pub fn train_recent(
        &self,
        store: &dyn ReadingStore,
        key: &ModelKey,
        window_size: usize,
        history_hours: u64,
    ) -> Result<ReconstructorTraining, EngineError> {
        let parameter = key.require_parameter()?;
        let readings = store.query(
            key.sensor_id(),
            Some(parameter),
            since(Utc::now(), lookback_hours(history_hours)),
        )?;
        let samples = SampleSet::from_readings(&readings);
        self.train(key, window_size, &samples.values)
    }

    /// Slide stride-1 windows over the last `lookback` of readings and report
    /// the last reading of every flagged window. Overlapping flagged windows
    /// report overlapping points; duplicates are kept.
    ///
    /// Trains from `history_hours` of history first when no handle exists
    /// or the stored one cannot be loaded.
    pub fn detect_recent(
        &self,
        store: &dyn ReadingStore,
        key: &ModelKey,
        lookback: Duration,
        window_size: usize,
        threshold: Option<f64>,
    ) -> Result<Detection<ReconstructionAnomaly>, EngineError> {
        let parameter = key.require_parameter()?;
        if window_size < 2 {
            return Err(EngineError::InvalidWindowSize(window_size));
        }

        let handle = match self.handle(key) {
            Some(handle) => handle,
            None => {
                match self.train_recent(store, key, window_size, self.config.history_hours)? {
                    ReconstructorTraining::Trained(_) => {}
                    ReconstructorTraining::InsufficientData { available, required }
                    | ReconstructorTraining::InsufficientWindows { available, required } => {
                        return Ok(Detection::InsufficientData { available, required });
                    }
                }
                match self.registry.get(&key.to_string()) {
                    Some(handle) => handle,
                    None => return Ok(Detection::Completed { anomalies: Vec::new() }),
                }
            }
        };

        let window = handle.window_size();
        if window != window_size {
            warn!(
                key = %key,
                requested = window_size,
                trained = window,
                "Window size differs from trained model, using the model's"
            );
        }

        let readings = store.query(key.sensor_id(), Some(parameter), since(Utc::now(), lookback))?;
        let readings: Vec<_> = readings.into_iter().filter(|r| r.value.is_finite()).collect();
        if readings.len() < window {
            return Ok(Detection::InsufficientData {
                available: readings.len(),
                required: window,
            });
        }

        let limit = threshold.unwrap_or(self.config.default_threshold);
        let values: Vec<f64> = readings.iter().map(|r| r.value).collect();
        let anomalies: Vec<ReconstructionAnomaly> = values
            .windows(window)
            .zip(readings.iter().skip(window - 1))
            .filter_map(|(w, last)| {
                let error = handle.error(w);
                (error > limit).then(|| ReconstructionAnomaly {
                    sensor_id: last.sensor_id.clone(),
                    parameter: last.parameter.clone(),
                    value: last.value,
                    timestamp: last.timestamp,
                    reconstruction_error: error,
                })
            })
            .collect();

        debug!(key = %key, windows = window_count(values.len(), window), flagged = anomalies.len(), "Reconstruction pass complete");
        Ok(Detection::Completed { anomalies })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStore, StorageError};

    /// Model store whose writes always fail.
    struct ReadOnlyStore;

    impl ModelStore for ReadOnlyStore {
        fn save_checkpoint(&self, _: &str, _: &ReconstructorCheckpoint) -> Result<(), StorageError> {
            Err(StorageError::Backend("read-only".into()))
        }

        fn load_checkpoint(&self, _: &str) -> Result<Option<ReconstructorCheckpoint>, StorageError> {
            Err(StorageError::Backend("unreachable".into()))
        }
    }

    fn quick_config() -> ReconstructionConfig {
        ReconstructionConfig {
            epochs: 5,
            ..ReconstructionConfig::default()
        }
    }

    fn key() -> ModelKey {
        ModelKey::series("pl_speed_001", "production_speed").unwrap()
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + 10.0 * (i as f64 * 0.5).sin()).collect()
    }

    #[test]
    fn test_window_count() {
        assert_eq!(window_count(20, 10), 11);
        assert_eq!(window_count(9, 10), 0);
    }

    #[test]
    fn test_exactly_two_windows_worth() {
        let reconstructor = WindowReconstructor::new(quick_config(), Arc::new(InMemoryStore::new()));
        let outcome = reconstructor.train(&key(), 10, &wave(20)).unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.windows, 11);
        assert_eq!(report.data_points, 20);
        assert_eq!(report.epoch_losses.len(), 5);
        assert!(report.persisted);
    }

    #[test]
    fn test_too_few_windows() {
        let reconstructor = WindowReconstructor::new(quick_config(), Arc::new(InMemoryStore::new()));
        // 2 * 5 points -> 6 windows < 10
        assert_eq!(
            reconstructor.train(&key(), 5, &wave(10)).unwrap(),
            ReconstructorTraining::InsufficientWindows { available: 6, required: 10 }
        );
        assert_eq!(
            reconstructor.train(&key(), 10, &wave(19)).unwrap(),
            ReconstructorTraining::InsufficientData { available: 19, required: 20 }
        );
        assert!(matches!(
            reconstructor.train(&key(), 1, &wave(50)),
            Err(EngineError::InvalidWindowSize(1))
        ));
    }

    #[test]
    fn test_save_failure_keeps_handle() {
        let reconstructor = WindowReconstructor::new(quick_config(), Arc::new(ReadOnlyStore));
        let outcome = reconstructor.train(&key(), 10, &wave(40)).unwrap();
        assert!(!outcome.report().unwrap().persisted);

        let score = reconstructor.score(&key(), &wave(10), None).unwrap();
        assert!(score.error > 0.0);
    }

    #[test]
    fn test_no_handle_is_unavailable() {
        let reconstructor = WindowReconstructor::new(quick_config(), Arc::new(ReadOnlyStore));
        assert_eq!(
            reconstructor.score(&key(), &wave(10), None).unwrap(),
            WindowScore::UNAVAILABLE
        );
    }

    #[test]
    fn test_window_length_mismatch() {
        let reconstructor = WindowReconstructor::new(quick_config(), Arc::new(InMemoryStore::new()));
        reconstructor.train(&key(), 10, &wave(40)).unwrap();
        assert!(matches!(
            reconstructor.score(&key(), &wave(8), None),
            Err(EngineError::WindowLengthMismatch { expected: 10, actual: 8 })
        ));
    }

    #[test]
    fn test_checkpoint_import_into_fresh_instance() {
        let source = WindowReconstructor::new(quick_config(), Arc::new(InMemoryStore::new()));
        source.train(&key(), 10, &wave(40)).unwrap();
        let cp = source.checkpoint(&key()).unwrap().unwrap();

        let target = WindowReconstructor::new(quick_config(), Arc::new(InMemoryStore::new()));
        target.import(&key(), &cp).unwrap();
        let a = source.score(&key(), &wave(10), None).unwrap();
        let b = target.score(&key(), &wave(10), None).unwrap();
        assert!((a.error - b.error).abs() < 1e-12);
        assert!(target.checkpoint(&key()).unwrap().is_some());

        let mut broken = cp;
        broken.version = 0;
        assert!(matches!(target.import(&key(), &broken), Err(EngineError::Checkpoint(_))));
    }

    #[test]
    fn test_threshold_is_strict() {
        let reconstructor = WindowReconstructor::new(quick_config(), Arc::new(InMemoryStore::new()));
        reconstructor.train(&key(), 10, &wave(40)).unwrap();
        let score = reconstructor.score(&key(), &wave(10), Some(f64::MAX)).unwrap();
        assert!(!score.is_anomaly);
        let error = score.error;
        assert!(!reconstructor.score(&key(), &wave(10), Some(error)).unwrap().is_anomaly);
        assert!(reconstructor.score(&key(), &wave(10), Some(error / 2.0)).unwrap().is_anomaly);
    }

    #[test]
    fn test_failed_import_leaves_no_live_handle() {
        let source = WindowReconstructor::new(quick_config(), Arc::new(InMemoryStore::new()));
        source.train(&key(), 10, &wave(40)).unwrap();
        let cp = source.checkpoint(&key()).unwrap().unwrap();

        let target = WindowReconstructor::new(quick_config(), Arc::new(ReadOnlyStore));
        assert!(matches!(target.import(&key(), &cp), Err(EngineError::Storage(_))));
        assert!(target.registry.get(&key().to_string()).is_none());
        assert_eq!(
            target.score(&key(), &wave(10), None).unwrap(),
            WindowScore::UNAVAILABLE
        );
    }

    #[test]
    fn test_flat_history_still_separates_windows() {
        // Enough optimiser steps for the flat target to be learned
        let config = ReconstructionConfig {
            epochs: 200,
            batch_size: 4,
            learning_rate: 0.01,
            ..ReconstructionConfig::default()
        };
        let reconstructor = WindowReconstructor::new(config, Arc::new(InMemoryStore::new()));
        reconstructor.train(&key(), 10, &[100.0; 40]).unwrap();

        let flat = reconstructor.score(&key(), &[100.0; 10], None).unwrap();
        assert!(!flat.is_anomaly, "flat window error {}", flat.error);

        let mut spiked = [100.0; 10];
        spiked[9] = 1000.0;
        let spike = reconstructor.score(&key(), &spiked, None).unwrap();
        assert!(spike.is_anomaly);
        assert!(spike.error > flat.error);

        let shifted = reconstructor.score(&key(), &[5000.0; 10], None).unwrap();
        assert!(shifted.error > spike.error);
    }
}

//! Outlier Scorer: per-sensor isolation forest over the standardised value
//!
//! Two entry points touch training:
//! - `train` always fits and replaces the handle
//! - `ensure_trained` (the alert path) fits only when no handle exists or the
//!   current one is older than `retrain_after_hours`
//!
//! `score` never trains; a missing handle means "not anomalous".

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::OutlierConfig;
use crate::storage::ReadingStore;
use crate::types::{Detection, ModelKey, OutlierAnomaly, TrainOutcome};

use super::isolation_forest::{ForestParams, IsolationForest};
use super::registry::ModelRegistry;
use super::scaler::StandardScaler;
use super::window::{lookback_hours, since, TrainingWindow, WindowExtractor};
use super::EngineError;

/// Trained forest and the scaler it was fitted with.
#[derive(Debug, Clone)]
pub struct OutlierHandle {
    scaler: StandardScaler,
    forest: IsolationForest,
    trained_at: DateTime<Utc>,
    samples: usize,
}

impl OutlierHandle {
    pub fn is_outlier(&self, value: f64) -> bool {
        value.is_finite() && self.forest.is_outlier(self.scaler.transform(value))
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    fn is_stale(&self, max_age_hours: u64, now: DateTime<Utc>) -> bool {
        max_age_hours > 0 && now - self.trained_at > lookback_hours(max_age_hours)
    }
}

pub struct OutlierScorer {
    config: OutlierConfig,
    params: ForestParams,
    extractor: WindowExtractor,
    registry: ModelRegistry<OutlierHandle>,
}

impl OutlierScorer {
    pub fn new(config: OutlierConfig) -> Self {
        let params = ForestParams {
            n_trees: config.n_trees,
            max_samples: config.max_samples,
            contamination: config.contamination,
            seed: config.seed,
        };
        Self {
            extractor: WindowExtractor::new(config.min_samples),
            params,
            config,
            registry: ModelRegistry::new(),
        }
    }

    pub fn config(&self) -> &OutlierConfig {
        &self.config
    }

    /// Current handle for `key`, if one exists.
    pub fn handle(&self, key: &ModelKey) -> Option<Arc<OutlierHandle>> {
        self.registry.get(&key.to_string())
    }

    /// Fit a fresh handle on `samples`, replacing any previous one.
    pub fn train(&self, key: &ModelKey, samples: &[f64]) -> TrainOutcome<Arc<OutlierHandle>> {
        let key_str = key.to_string();
        self.registry.with_training_lock(&key_str, |_| {
            match self.fit(&key_str, samples) {
                TrainOutcome::Trained(handle) => (Some(Arc::clone(&handle)), TrainOutcome::Trained(handle)),
                insufficient => (None, insufficient),
            }
        })
    }

    fn fit(&self, key: &str, samples: &[f64]) -> TrainOutcome<Arc<OutlierHandle>> {
        let finite: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        let required = self.extractor.min_samples();
        if finite.len() < required {
            return TrainOutcome::InsufficientData {
                available: finite.len(),
                required,
            };
        }

        let scaler = StandardScaler::fit(&finite);
        let scaled: Vec<f64> = finite.iter().map(|v| scaler.transform(*v)).collect();
        let Some(forest) = IsolationForest::fit(&scaled, &self.params) else {
            return TrainOutcome::InsufficientData {
                available: finite.len(),
                required,
            };
        };

        info!(
            key = %key,
            samples = finite.len(),
            threshold = forest.threshold(),
            "Outlier model trained"
        );

        TrainOutcome::Trained(Arc::new(OutlierHandle {
            scaler,
            forest,
            trained_at: Utc::now(),
            samples: finite.len(),
        }))
    }

    /// Whether `value` is an outlier for `key`. False when no handle exists.
    pub fn score(&self, key: &ModelKey, value: f64) -> bool {
        self.registry
            .get(&key.to_string())
            .is_some_and(|handle| handle.is_outlier(value))
    }

    /// Auto-train path: return the current handle, training first when none
    /// exists or it has gone stale. Runs under the key's training lock.
    ///
    /// A stale handle is kept when the fresh window is too small to retrain.
    pub fn ensure_trained(
        &self,
        store: &dyn ReadingStore,
        key: &ModelKey,
        lookback: Duration,
    ) -> Result<Option<Arc<OutlierHandle>>, EngineError> {
        let key_str = key.to_string();
        let now = Utc::now();

        // Fast path without the lock
        if let Some(handle) = self.registry.get(&key_str) {
            if !handle.is_stale(self.config.retrain_after_hours, now) {
                return Ok(Some(handle));
            }
        }

        self.registry.with_training_lock(&key_str, |current| {
            if let Some(handle) = &current {
                if !handle.is_stale(self.config.retrain_after_hours, now) {
                    return (None, Ok(current));
                }
                info!(
                    key = %key_str,
                    trained_at = %handle.trained_at(),
                    "Outlier model stale, retraining"
                );
            }

            let window = match self.extractor.extract(store, key, lookback) {
                Ok(window) => window,
                Err(e) => return (None, Err(EngineError::from(e))),
            };

            match window {
                TrainingWindow::Ready(samples) => match self.fit(&key_str, &samples.values) {
                    TrainOutcome::Trained(handle) => (Some(Arc::clone(&handle)), Ok(Some(handle))),
                    TrainOutcome::InsufficientData { .. } => (None, Ok(current)),
                },
                TrainingWindow::InsufficientData { available, required } => {
                    debug!(key = %key_str, available, required, "Not enough history to train outlier model");
                    (None, Ok(current))
                }
            }
        })
    }

    /// Alert-path scoring: auto-train if needed, then score.
    pub fn train_and_score(
        &self,
        store: &dyn ReadingStore,
        key: &ModelKey,
        value: f64,
    ) -> Result<bool, EngineError> {
        let lookback = lookback_hours(self.config.training_lookback_hours);
        Ok(self
            .ensure_trained(store, key, lookback)?
            .is_some_and(|handle| handle.is_outlier(value)))
    }

    /// Train on the last `2 * lookback` if no handle exists, then score the
    /// newest readings of the last `lookback` (at most `recent_limit`,
    /// newest first) and return the flagged ones.
    pub fn detect_recent(
        &self,
        store: &dyn ReadingStore,
        key: &ModelKey,
        lookback: Duration,
    ) -> Result<Detection<OutlierAnomaly>, EngineError> {
        let training_lookback = lookback.checked_add(&lookback).unwrap_or(Duration::MAX);
        let Some(handle) = self.ensure_trained(store, key, training_lookback)? else {
            let available = store
                .query(key.sensor_id(), key.parameter(), since(Utc::now(), training_lookback))?
                .iter()
                .filter(|r| r.value.is_finite())
                .count();
            return Ok(Detection::InsufficientData {
                available,
                required: self.extractor.min_samples(),
            });
        };

        let recent = store.query(key.sensor_id(), key.parameter(), since(Utc::now(), lookback))?;
        let anomalies: Vec<OutlierAnomaly> = recent
            .iter()
            .rev()
            .take(self.config.recent_limit)
            .filter(|r| handle.is_outlier(r.value))
            .map(|r| OutlierAnomaly {
                sensor_id: r.sensor_id.clone(),
                parameter: r.parameter.clone(),
                value: r.value,
                timestamp: r.timestamp,
            })
            .collect();

        debug!(key = %key, flagged = anomalies.len(), "Outlier detection pass complete");
        Ok(Detection::Completed { anomalies })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use crate::types::Reading;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn near_constant(n: usize, base: f64, noise: f64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(1);
        (0..n).map(|_| base + rng.gen_range(-noise..noise)).collect()
    }

    fn store_with(sensor: &str, values: &[f64], spacing: Duration) -> InMemoryStore {
        let t0 = Utc::now() - spacing * values.len() as i32;
        InMemoryStore::with_readings(values.iter().enumerate().map(|(i, v)| {
            Reading::new(sensor, "production_line", "temperature", *v, t0 + spacing * i as i32)
        }))
    }

    fn key() -> ModelKey {
        ModelKey::sensor("pl_temp_001").unwrap()
    }

    #[test]
    fn test_train_requires_ten_samples() {
        let scorer = OutlierScorer::new(OutlierConfig::default());
        let outcome = scorer.train(&key(), &[70.0; 9]);
        assert!(matches!(
            outcome,
            TrainOutcome::InsufficientData { available: 9, required: 10 }
        ));
        assert!(scorer.handle(&key()).is_none());
        assert!(!scorer.score(&key(), 1e6));
    }

    #[test]
    fn test_far_value_flagged_and_idempotent() {
        let scorer = OutlierScorer::new(OutlierConfig::default());
        let values = near_constant(20, 75.0, 0.5);
        assert!(scorer.train(&key(), &values).is_trained());

        // base + 10 * range
        let far = 75.0 + 10.0 * 30.0;
        assert!(scorer.score(&key(), far));
        assert_eq!(scorer.score(&key(), far), scorer.score(&key(), far));
        assert_eq!(scorer.score(&key(), 75.1), scorer.score(&key(), 75.1));
    }

    #[test]
    fn test_explicit_train_replaces_handle() {
        let scorer = OutlierScorer::new(OutlierConfig::default());
        let first = scorer.train(&key(), &near_constant(20, 10.0, 1.0)).handle().unwrap();
        let second = scorer.train(&key(), &near_constant(30, 10.0, 1.0)).handle().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(scorer.handle(&key()).unwrap().samples(), 30);
    }

    #[test]
    fn test_ensure_trained_trains_once() {
        let scorer = OutlierScorer::new(OutlierConfig::default());
        let store = store_with("pl_temp_001", &near_constant(30, 75.0, 1.0), Duration::minutes(10));

        let a = scorer.ensure_trained(&store, &key(), Duration::hours(24)).unwrap().unwrap();
        let b = scorer.ensure_trained(&store, &key(), Duration::hours(24)).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_stale_handle_retrained_on_auto_path() {
        let config = OutlierConfig {
            retrain_after_hours: 1,
            ..OutlierConfig::default()
        };
        let scorer = OutlierScorer::new(config);
        let store = store_with("pl_temp_001", &near_constant(30, 75.0, 1.0), Duration::minutes(10));

        let mut old = (*scorer.train(&key(), &near_constant(12, 75.0, 1.0)).handle().unwrap()).clone();
        old.trained_at = Utc::now() - Duration::hours(3);
        scorer.registry.install(&key().to_string(), Arc::new(old));

        let fresh = scorer.ensure_trained(&store, &key(), Duration::hours(24)).unwrap().unwrap();
        assert_eq!(fresh.samples(), 30);
        assert!(Utc::now() - fresh.trained_at() < Duration::minutes(1));
    }

    #[test]
    fn test_detect_recent_insufficient_without_history() {
        let scorer = OutlierScorer::new(OutlierConfig::default());
        let store = store_with("pl_temp_001", &[70.0; 5], Duration::minutes(10));
        let detection = scorer.detect_recent(&store, &key(), Duration::hours(24)).unwrap();
        assert!(matches!(
            detection,
            Detection::InsufficientData { available: 5, required: 10 }
        ));
    }

    #[test]
    fn test_detect_recent_flags_spike() {
        let scorer = OutlierScorer::new(OutlierConfig::default());
        let mut values = near_constant(40, 75.0, 0.5);
        values.push(400.0);
        let store = store_with("pl_temp_001", &values, Duration::minutes(10));

        let detection = scorer.detect_recent(&store, &key(), Duration::hours(24)).unwrap();
        let anomalies = detection.anomalies();
        assert!(anomalies.iter().any(|a| a.value == 400.0));
        assert!(anomalies.iter().all(|a| a.parameter == "temperature"));
    }
}

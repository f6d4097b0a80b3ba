//! Alert Generator
//!
//! `process` runs the threshold rules on every reading and the Outlier
//! Scorer's auto-train path on allow-listed parameters, then persists every
//! alert from that reading as one batch. Persistence errors propagate; the
//! scorer may have trained a handle by then, which stays valid.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::ml_engine::{EngineError, OutlierScorer};
use crate::storage::{AlertStore, ReadingStore};
use crate::types::{parameters, Alert, AlertSeverity, AlertType, ModelKey, NewAlert, Reading};

use super::rules::ThresholdEngine;

pub struct AlertGenerator {
    readings: Arc<dyn ReadingStore>,
    alerts: Arc<dyn AlertStore>,
    scorer: Arc<OutlierScorer>,
    rules: ThresholdEngine,
    ml_parameters: HashSet<String>,
}

impl AlertGenerator {
    pub fn new(
        readings: Arc<dyn ReadingStore>,
        alerts: Arc<dyn AlertStore>,
        scorer: Arc<OutlierScorer>,
        rules: ThresholdEngine,
        ml_parameters: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            readings,
            alerts,
            scorer,
            rules,
            ml_parameters: ml_parameters.into_iter().collect(),
        }
    }

    pub fn rules(&self) -> &ThresholdEngine {
        &self.rules
    }

    /// Whether `parameter` goes through outlier scoring.
    pub fn scores_parameter(&self, parameter: &str) -> bool {
        self.ml_parameters.contains(parameter)
    }

    /// Evaluate one reading and persist the resulting alerts (0, 1 or 2).
    pub fn process(&self, reading: &Reading) -> Result<Vec<Alert>, EngineError> {
        let mut drafts: Vec<NewAlert> = Vec::with_capacity(2);

        if let Some(alert) = self.rules.evaluate(reading) {
            drafts.push(alert);
        }

        if self.scores_parameter(&reading.parameter) {
            let key = ModelKey::sensor(&reading.sensor_id)?;
            if self.scorer.train_and_score(self.readings.as_ref(), &key, reading.value)? {
                drafts.push(NewAlert {
                    sensor_id: reading.sensor_id.clone(),
                    sensor_type: reading.sensor_type.clone(),
                    alert_type: AlertType::MlAnomaly,
                    severity: AlertSeverity::High,
                    message: format!(
                        "ML detected an anomaly in {}: {}",
                        parameters::label(&reading.parameter),
                        reading.value
                    ),
                    value: reading.value,
                    threshold: None,
                });
            }
        }

        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let saved = self.alerts.save(drafts)?;
        debug!(
            sensor_id = %reading.sensor_id,
            parameter = %reading.parameter,
            count = saved.len(),
            "Alert batch persisted"
        );
        Ok(saved)
    }

    /// Unresolved alerts, newest first.
    pub fn active_alerts(&self, limit: usize) -> Result<Vec<Alert>, EngineError> {
        Ok(self.alerts.active(limit)?)
    }

    pub fn resolve(&self, alert_id: u64) -> Result<Option<Alert>, EngineError> {
        Ok(self.alerts.resolve(alert_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, OutlierConfig};
    use crate::storage::{InMemoryStore, StorageError};
    use chrono::{Duration, Utc};

    /// Alert store that refuses every write.
    struct BrokenAlertStore;

    impl AlertStore for BrokenAlertStore {
        fn save(&self, _: Vec<NewAlert>) -> Result<Vec<Alert>, StorageError> {
            Err(StorageError::Backend("disk full".into()))
        }

        fn resolve(&self, _: u64) -> Result<Option<Alert>, StorageError> {
            Ok(None)
        }

        fn active(&self, _: usize) -> Result<Vec<Alert>, StorageError> {
            Ok(Vec::new())
        }
    }

    fn generator_with(store: Arc<InMemoryStore>, alerts: Arc<dyn AlertStore>) -> AlertGenerator {
        let config = EngineConfig::default();
        AlertGenerator::new(
            store,
            alerts,
            Arc::new(OutlierScorer::new(OutlierConfig::default())),
            ThresholdEngine::new(config.thresholds),
            config.alerts.ml_parameters,
        )
    }

    fn calm_history(sensor: &str, n: usize) -> Vec<Reading> {
        let t0 = Utc::now() - Duration::minutes(n as i64);
        (0..n)
            .map(|i| {
                let value = 75.0 + if i % 2 == 0 { 0.2 } else { -0.2 };
                Reading::new(sensor, "production_line", "temperature", value, t0 + Duration::minutes(i as i64))
            })
            .collect()
    }

    #[test]
    fn test_quiet_reading_saves_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let generator = generator_with(store.clone(), store.clone());
        let reading = Reading::new("wh_hum_001", "warehouse", "humidity", 40.0, Utc::now());
        assert!(generator.process(&reading).unwrap().is_empty());
        assert!(store.all_alerts().is_empty());
    }

    #[test]
    fn test_threshold_and_ml_alert_in_one_batch() {
        let store = Arc::new(InMemoryStore::with_readings(calm_history("pl_temp_001", 40)));
        let generator = generator_with(store.clone(), store.clone());

        let reading = Reading::new("pl_temp_001", "production_line", "temperature", 140.0, Utc::now());
        let alerts = generator.process(&reading).unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].alert_type, AlertType::Threshold);
        assert_eq!(alerts[1].alert_type, AlertType::MlAnomaly);
        assert_eq!(alerts[1].severity, AlertSeverity::High);
        assert_eq!(alerts[1].threshold, None);
        assert_eq!(alerts[1].message, "ML detected an anomaly in Temperature: 140");
        assert_eq!(generator.active_alerts(10).unwrap().len(), 2);
    }

    #[test]
    fn test_parameter_outside_allow_list_is_not_scored() {
        let history: Vec<Reading> = calm_history("wh_stock_001", 40)
            .into_iter()
            .map(|mut r| {
                r.sensor_type = "warehouse".into();
                r.parameter = "stock_level".into();
                r.value += 5000.0;
                r
            })
            .collect();
        let store = Arc::new(InMemoryStore::with_readings(history));
        let generator = generator_with(store.clone(), store.clone());

        // Far from history but inside the rule bounds.
        let reading = Reading::new("wh_stock_001", "warehouse", "stock_level", 11000.0, Utc::now());
        assert!(generator.process(&reading).unwrap().is_empty());
    }

    #[test]
    fn test_save_failure_propagates() {
        let store = Arc::new(InMemoryStore::new());
        let generator = generator_with(store, Arc::new(BrokenAlertStore));
        let reading = Reading::new("pl_temp_001", "production_line", "temperature", 95.0, Utc::now());
        assert!(matches!(generator.process(&reading), Err(EngineError::Storage(_))));
    }

    #[test]
    fn test_resolve_removes_from_active() {
        let store = Arc::new(InMemoryStore::new());
        let generator = generator_with(store.clone(), store);
        let reading = Reading::new("pl_temp_001", "production_line", "temperature", 95.0, Utc::now());
        let saved = generator.process(&reading).unwrap();
        let resolved = generator.resolve(saved[0].id).unwrap().unwrap();
        assert!(resolved.is_resolved);
        assert!(generator.active_alerts(10).unwrap().is_empty());
        assert!(generator.resolve(999).unwrap().is_none());
    }
}

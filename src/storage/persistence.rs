//! Store traits: pluggable persistence backends
//!
//! The engine consumes readings and produces alerts and model checkpoints
//! through these traits so backends can be swapped without touching the
//! detectors:
//! - `InMemoryStore`: in-memory store for tests and ephemeral runs
//! - `SledStore`: embedded sled database for single-process deployments

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::ml_engine::checkpoint::ReconstructorCheckpoint;
use crate::types::{Alert, NewAlert, Reading};

use super::StorageError;

/// Time-ordered reading query interface.
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across concurrent requests.
pub trait ReadingStore: Send + Sync {
    /// Readings of `sensor_id` (optionally one parameter) with
    /// `timestamp >= since`, ordered by timestamp ascending.
    fn query(
        &self,
        sensor_id: &str,
        parameter: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StorageError>;

    /// Append one reading.
    fn insert(&self, reading: &Reading) -> Result<(), StorageError>;
}

/// Alert persistence.
pub trait AlertStore: Send + Sync {
    /// Append a batch: assigns identity, `is_resolved = false`, `created_at = now`.
    fn save(&self, alerts: Vec<NewAlert>) -> Result<Vec<Alert>, StorageError>;

    /// Operator resolution. `None` when the id is unknown.
    fn resolve(&self, alert_id: u64) -> Result<Option<Alert>, StorageError>;

    /// Unresolved alerts, newest first.
    fn active(&self, limit: usize) -> Result<Vec<Alert>, StorageError>;
}

/// Durable storage for Window Reconstructor handles.
pub trait ModelStore: Send + Sync {
    fn save_checkpoint(&self, key: &str, checkpoint: &ReconstructorCheckpoint) -> Result<(), StorageError>;

    fn load_checkpoint(&self, key: &str) -> Result<Option<ReconstructorCheckpoint>, StorageError>;
}

/// In-memory persistence for testing and ephemeral deployments
///
/// Thread-safe via `RwLock`. Not durable; data is lost on restart.
#[derive(Default)]
pub struct InMemoryStore {
    readings: RwLock<Vec<Reading>>,
    alerts: RwLock<Vec<Alert>>,
    models: RwLock<HashMap<String, ReconstructorCheckpoint>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with readings pre-loaded.
    pub fn with_readings(readings: impl IntoIterator<Item = Reading>) -> Self {
        Self {
            readings: RwLock::new(readings.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn reading_count(&self) -> usize {
        self.readings.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Every alert, resolved or not, oldest first.
    pub fn all_alerts(&self) -> Vec<Alert> {
        self.alerts.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Backend(e.to_string())
}

impl ReadingStore for InMemoryStore {
    fn query(
        &self,
        sensor_id: &str,
        parameter: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StorageError> {
        let store = self.readings.read().map_err(poisoned)?;
        let mut matched: Vec<Reading> = store
            .iter()
            .filter(|r| r.sensor_id == sensor_id && r.timestamp >= since)
            .filter(|r| parameter.map_or(true, |p| r.parameter == p))
            .cloned()
            .collect();
        // Stable: equal timestamps keep insertion order
        matched.sort_by_key(|r| r.timestamp);
        Ok(matched)
    }

    fn insert(&self, reading: &Reading) -> Result<(), StorageError> {
        self.readings.write().map_err(poisoned)?.push(reading.clone());
        Ok(())
    }
}

impl AlertStore for InMemoryStore {
    fn save(&self, alerts: Vec<NewAlert>) -> Result<Vec<Alert>, StorageError> {
        let mut store = self.alerts.write().map_err(poisoned)?;
        let now = Utc::now();
        let mut next_id = store.last().map_or(1, |a| a.id + 1);

        let saved: Vec<Alert> = alerts
            .into_iter()
            .map(|draft| {
                let alert = Alert::from_new(next_id, draft, now);
                next_id += 1;
                alert
            })
            .collect();

        store.extend(saved.iter().cloned());
        Ok(saved)
    }

    fn resolve(&self, alert_id: u64) -> Result<Option<Alert>, StorageError> {
        let mut store = self.alerts.write().map_err(poisoned)?;
        Ok(store.iter_mut().find(|a| a.id == alert_id).map(|alert| {
            alert.resolve(Utc::now());
            alert.clone()
        }))
    }

    fn active(&self, limit: usize) -> Result<Vec<Alert>, StorageError> {
        let store = self.alerts.read().map_err(poisoned)?;
        Ok(store
            .iter()
            .rev()
            .filter(|a| !a.is_resolved)
            .take(limit)
            .cloned()
            .collect())
    }
}

impl ModelStore for InMemoryStore {
    fn save_checkpoint(&self, key: &str, checkpoint: &ReconstructorCheckpoint) -> Result<(), StorageError> {
        self.models
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), checkpoint.clone());
        Ok(())
    }

    fn load_checkpoint(&self, key: &str) -> Result<Option<ReconstructorCheckpoint>, StorageError> {
        Ok(self.models.read().map_err(poisoned)?.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlertSeverity, AlertType};
    use chrono::Duration;

    fn reading(sensor: &str, parameter: &str, value: f64, at: DateTime<Utc>) -> Reading {
        Reading::new(sensor, "warehouse", parameter, value, at)
    }

    fn draft(sensor: &str) -> NewAlert {
        NewAlert {
            sensor_id: sensor.to_string(),
            sensor_type: "warehouse".to_string(),
            alert_type: AlertType::Threshold,
            severity: AlertSeverity::Medium,
            message: "test".to_string(),
            value: 1.0,
            threshold: Some(0.5),
        }
    }

    #[test]
    fn test_query_filters_and_orders() {
        let t0 = Utc::now() - Duration::hours(5);
        let store = InMemoryStore::with_readings(vec![
            reading("s1", "humidity", 3.0, t0 + Duration::hours(3)),
            reading("s1", "humidity", 1.0, t0 + Duration::hours(1)),
            reading("s1", "temperature", 9.0, t0 + Duration::hours(2)),
            reading("s2", "humidity", 7.0, t0 + Duration::hours(2)),
            reading("s1", "humidity", 0.0, t0 - Duration::hours(1)),
        ]);
        assert_eq!(store.reading_count(), 5);

        let rows = store.query("s1", Some("humidity"), t0).unwrap();
        let values: Vec<f64> = rows.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![1.0, 3.0]);

        let all = store.query("s1", None, t0).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_alert_lifecycle() {
        let store = InMemoryStore::new();
        let saved = store.save(vec![draft("s1"), draft("s2")]).unwrap();
        assert_eq!(saved.len(), 2);
        assert_ne!(saved[0].id, saved[1].id);
        assert!(saved.iter().all(|a| !a.is_resolved && a.resolved_at.is_none()));

        let resolved = store.resolve(saved[0].id).unwrap().unwrap();
        assert!(resolved.is_resolved);
        assert!(resolved.resolved_at.is_some());

        let active = store.active(10).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].sensor_id, "s2");

        assert!(store.resolve(9999).unwrap().is_none());
    }
}

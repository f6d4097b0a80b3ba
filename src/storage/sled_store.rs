//! Sled-backed store
//!
//! Three trees in one database:
//! - `readings`: `{sensor_id}\0{timestamp_be}{seq_be}` -> JSON `Reading`
//! - `alerts`:   `{id_be}` -> JSON `Alert`
//! - `models`:   `{model_key}` -> JSON `ReconstructorCheckpoint`
//!
//! Reading keys sort by sensor then time, so a query is a single range scan.

use chrono::{DateTime, Utc};
use sled::{Db, Tree};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::ml_engine::checkpoint::ReconstructorCheckpoint;
use crate::types::{Alert, NewAlert, Reading};

use super::persistence::{AlertStore, ModelStore, ReadingStore};
use super::StorageError;

const READINGS_TREE: &str = "readings";
const ALERTS_TREE: &str = "alerts";
const MODELS_TREE: &str = "models";

/// Sensor id / timestamp separator. Sensor ids never contain NUL.
const KEY_SEPARATOR: u8 = 0x00;

/// Embedded database implementing all three store traits.
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    readings: Tree,
    alerts: Tree,
    models: Tree,
}

impl SledStore {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)?;
        info!(path = %path_ref.display(), "Telemetry store opened");
        Self::from_db(db)
    }

    /// Open a temporary database, removed on drop (for testing)
    pub fn open_temp() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        Ok(Self {
            readings: db.open_tree(READINGS_TREE)?,
            alerts: db.open_tree(ALERTS_TREE)?,
            models: db.open_tree(MODELS_TREE)?,
            db,
        })
    }

    pub fn reading_count(&self) -> usize {
        self.readings.len()
    }

    /// Flush all trees to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    fn sensor_prefix(sensor_id: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(sensor_id.len() + 1);
        prefix.extend_from_slice(sensor_id.as_bytes());
        prefix.push(KEY_SEPARATOR);
        prefix
    }

    fn reading_key(sensor_id: &str, timestamp: DateTime<Utc>, seq: u64) -> Vec<u8> {
        let mut key = Self::sensor_prefix(sensor_id);
        key.extend_from_slice(&encode_timestamp(timestamp));
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }
}

/// Order-preserving encoding of a signed nanosecond timestamp.
///
/// Flipping the sign bit maps i64 order onto u64 order, so pre-1970
/// timestamps still sort before later ones.
fn encode_timestamp(timestamp: DateTime<Utc>) -> [u8; 8] {
    let nanos = timestamp
        .timestamp_nanos_opt()
        .unwrap_or_else(|| timestamp.timestamp().saturating_mul(1_000_000_000));
    ((nanos as u64) ^ (1 << 63)).to_be_bytes()
}

impl ReadingStore for SledStore {
    fn query(
        &self,
        sensor_id: &str,
        parameter: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StorageError> {
        let mut start = Self::sensor_prefix(sensor_id);
        start.extend_from_slice(&encode_timestamp(since));
        let mut end = Self::sensor_prefix(sensor_id);
        end.extend_from_slice(&[0xFF; 16]);

        let mut readings = Vec::new();
        for item in self.readings.range(start..=end) {
            let (_key, value) = item?;
            match serde_json::from_slice::<Reading>(&value) {
                Ok(reading) => {
                    if parameter.map_or(true, |p| reading.parameter == p) {
                        readings.push(reading);
                    }
                }
                Err(e) => {
                    warn!(sensor_id = %sensor_id, error = %e, "Skipping undecodable reading");
                }
            }
        }

        debug!(sensor_id = %sensor_id, count = readings.len(), "Queried readings");
        Ok(readings)
    }

    fn insert(&self, reading: &Reading) -> Result<(), StorageError> {
        // generate_id keeps keys unique when timestamps collide
        let seq = self.db.generate_id()?;
        let key = Self::reading_key(&reading.sensor_id, reading.timestamp, seq);
        let value = serde_json::to_vec(reading)?;
        self.readings.insert(key, value)?;
        Ok(())
    }
}

impl AlertStore for SledStore {
    fn save(&self, alerts: Vec<NewAlert>) -> Result<Vec<Alert>, StorageError> {
        let now = Utc::now();
        let mut saved = Vec::with_capacity(alerts.len());
        let mut batch = sled::Batch::default();

        for draft in alerts {
            // Ids start at 1 so they read naturally in the CLI
            let id = self.db.generate_id()? + 1;
            let alert = Alert::from_new(id, draft, now);
            batch.insert(id.to_be_bytes().to_vec(), serde_json::to_vec(&alert)?);
            saved.push(alert);
        }

        self.alerts.apply_batch(batch)?;
        self.alerts.flush()?;
        Ok(saved)
    }

    fn resolve(&self, alert_id: u64) -> Result<Option<Alert>, StorageError> {
        let key = alert_id.to_be_bytes();
        let Some(value) = self.alerts.get(key)? else {
            return Ok(None);
        };

        let mut alert: Alert = serde_json::from_slice(&value)?;
        alert.resolve(Utc::now());
        self.alerts.insert(key, serde_json::to_vec(&alert)?)?;
        self.alerts.flush()?;
        Ok(Some(alert))
    }

    fn active(&self, limit: usize) -> Result<Vec<Alert>, StorageError> {
        let mut active = Vec::new();

        // Ids are monotonic, so reverse key order is newest first
        for item in self.alerts.iter().rev() {
            if active.len() >= limit {
                break;
            }
            let (_key, value) = item?;
            match serde_json::from_slice::<Alert>(&value) {
                Ok(alert) if !alert.is_resolved => active.push(alert),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Skipping undecodable alert"),
            }
        }

        Ok(active)
    }
}

impl ModelStore for SledStore {
    fn save_checkpoint(&self, key: &str, checkpoint: &ReconstructorCheckpoint) -> Result<(), StorageError> {
        let value = serde_json::to_vec(checkpoint)?;
        self.models.insert(key.as_bytes(), value)?;
        self.models.flush()?;
        debug!(key = %key, "Stored reconstructor checkpoint");
        Ok(())
    }

    fn load_checkpoint(&self, key: &str) -> Result<Option<ReconstructorCheckpoint>, StorageError> {
        match self.models.get(key.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }
}

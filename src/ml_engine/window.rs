//! Training-Window Extractor
//!
//! Turns the reading stream of one model key into a dense sample set.
//! Gaps are left as they are: no resampling, no interpolation. Non-finite
//! values are dropped before the minimum-count check.

use chrono::{DateTime, Duration, Utc};

use crate::config::defaults;
use crate::storage::{ReadingStore, StorageError};
use crate::types::{ModelKey, Reading};

/// Finite values of one key, oldest first, with their timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    pub values: Vec<f64>,
    pub timestamps: Vec<DateTime<Utc>>,
}

impl SampleSet {
    pub fn from_readings(readings: &[Reading]) -> Self {
        let mut set = SampleSet::default();
        for reading in readings.iter().filter(|r| r.value.is_finite()) {
            set.values.push(reading.value);
            set.timestamps.push(reading.timestamp);
        }
        set
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(timestamp, value)` pairs, the forecaster's input shape.
    pub fn series(&self) -> Vec<(DateTime<Utc>, f64)> {
        self.timestamps.iter().copied().zip(self.values.iter().copied()).collect()
    }
}

/// `hours` as a lookback, saturating at `Duration::MAX`.
pub fn lookback_hours(hours: u64) -> Duration {
    i64::try_from(hours)
        .ok()
        .and_then(Duration::try_hours)
        .unwrap_or(Duration::MAX)
}

/// `days` as a lookback, saturating at `Duration::MAX`.
pub fn lookback_days(days: u64) -> Duration {
    i64::try_from(days)
        .ok()
        .and_then(Duration::try_days)
        .unwrap_or(Duration::MAX)
}

/// Start of a lookback ending at `now`. Lookbacks reaching past the
/// earliest representable instant start there instead.
pub fn since(now: DateTime<Utc>, lookback: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(lookback).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Extraction result: enough samples to train on, or how far short we are.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingWindow {
    Ready(SampleSet),
    InsufficientData { available: usize, required: usize },
}

/// Side-effect-free reader over a [`ReadingStore`].
#[derive(Debug, Clone, Copy)]
pub struct WindowExtractor {
    min_samples: usize,
}

impl Default for WindowExtractor {
    fn default() -> Self {
        Self::new(defaults::MIN_TRAINING_SAMPLES)
    }
}

impl WindowExtractor {
    pub fn new(min_samples: usize) -> Self {
        Self { min_samples }
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Samples of `key` from the last `lookback`.
    pub fn extract(
        &self,
        store: &dyn ReadingStore,
        key: &ModelKey,
        lookback: Duration,
    ) -> Result<TrainingWindow, StorageError> {
        self.extract_since(store, key, since(Utc::now(), lookback))
    }

    pub fn extract_since(
        &self,
        store: &dyn ReadingStore,
        key: &ModelKey,
        since: DateTime<Utc>,
    ) -> Result<TrainingWindow, StorageError> {
        let readings = store.query(key.sensor_id(), key.parameter(), since)?;
        Ok(self.window_from(&readings))
    }

    /// Apply the minimum-count rule to already-fetched readings.
    pub fn window_from(&self, readings: &[Reading]) -> TrainingWindow {
        let samples = SampleSet::from_readings(readings);
        if samples.len() < self.min_samples {
            TrainingWindow::InsufficientData {
                available: samples.len(),
                required: self.min_samples,
            }
        } else {
            TrainingWindow::Ready(samples)
        }
    }
}

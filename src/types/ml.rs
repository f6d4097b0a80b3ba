//! ML Engine result types: tagged outcomes, forecasts and detections
//!
//! "Not enough signal yet" is never an error: every component returns one of
//! these enums so callers can tell a quiet sensor from a broken one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a training request.
#[derive(Debug, Clone)]
pub enum TrainOutcome<H> {
    Trained(H),
    InsufficientData { available: usize, required: usize },
}

impl<H> TrainOutcome<H> {
    pub fn is_trained(&self) -> bool {
        matches!(self, TrainOutcome::Trained(_))
    }

    pub fn handle(self) -> Option<H> {
        match self {
            TrainOutcome::Trained(h) => Some(h),
            TrainOutcome::InsufficientData { .. } => None,
        }
    }
}

/// Outcome of a recent-window detection pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Detection<T> {
    Completed { anomalies: Vec<T> },
    InsufficientData { available: usize, required: usize },
}

impl<T> Detection<T> {
    pub fn anomalies(&self) -> &[T] {
        match self {
            Detection::Completed { anomalies } => anomalies,
            Detection::InsufficientData { .. } => &[],
        }
    }
}

/// A reading flagged by the Outlier Scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierAnomaly {
    pub sensor_id: String,
    pub parameter: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Last reading of a window flagged by the Window Reconstructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionAnomaly {
    pub sensor_id: String,
    pub parameter: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub reconstruction_error: f64,
}

/// Result of scoring one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowScore {
    pub is_anomaly: bool,
    pub error: f64,
}

impl WindowScore {
    /// Returned when no handle can be found or loaded.
    pub const UNAVAILABLE: WindowScore = WindowScore {
        is_anomaly: false,
        error: 0.0,
    };
}

/// One forecast step. Ephemeral, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    /// Additive trend + daily/weekly seasonality
    Seasonal,
    /// Ordinary least squares on elapsed hours
    LinearFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub method: ForecastMethod,
    pub horizon_hours: usize,
    /// Last observed value of the history the forecast was built from
    pub current_value: f64,
    pub points: Vec<ForecastPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastOutcome {
    Forecast(Forecast),
    InsufficientData { available: usize, required: usize },
}

impl ForecastOutcome {
    pub fn forecast(&self) -> Option<&Forecast> {
        match self {
            ForecastOutcome::Forecast(f) => Some(f),
            ForecastOutcome::InsufficientData { .. } => None,
        }
    }
}

/// Per-key primary-model state of the Trajectory Forecaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastKeyState {
    Untried,
    Trained,
    FallbackOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortageRisk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockTrend {
    Increasing,
    Decreasing,
}

/// Projected stock level for a warehouse sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockOutlook {
    pub forecast: f64,
    pub current: f64,
    pub days_ahead: u32,
    pub shortage_risk: ShortageRisk,
    pub trend: StockTrend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StockOutlookOutcome {
    Outlook(StockOutlook),
    InsufficientData { available: usize, required: usize },
}

/// Summary of a Window Reconstructor training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs: usize,
    pub initial_loss: f64,
    pub final_loss: f64,
    pub epoch_losses: Vec<f64>,
    pub data_points: usize,
    pub windows: usize,
    pub window_size: usize,
    /// False when the durable save failed; the in-memory handle is still live.
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconstructorTraining {
    Trained(TrainingReport),
    InsufficientData { available: usize, required: usize },
    InsufficientWindows { available: usize, required: usize },
}

impl ReconstructorTraining {
    pub fn report(&self) -> Option<&TrainingReport> {
        match self {
            ReconstructorTraining::Trained(r) => Some(r),
            _ => None,
        }
    }
}

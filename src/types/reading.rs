//! Telemetry readings and model keys

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Known sensor categories.
pub mod sensor_types {
    pub const RAW_MATERIAL: &str = "raw_material";
    pub const PRODUCTION_LINE: &str = "production_line";
    pub const WAREHOUSE: &str = "warehouse";
}

/// Known parameter names.
pub mod parameters {
    pub const TEMPERATURE: &str = "temperature";
    pub const HUMIDITY: &str = "humidity";
    pub const QUANTITY: &str = "quantity";
    pub const VIBRATION: &str = "vibration";
    pub const PRODUCTION_SPEED: &str = "production_speed";
    pub const DEFECT_RATE: &str = "defect_rate";
    pub const PRESSURE: &str = "pressure";
    pub const STOCK_LEVEL: &str = "stock_level";

    /// Human-readable label used in alert messages.
    pub fn label(parameter: &str) -> &str {
        match parameter {
            TEMPERATURE => "Temperature",
            HUMIDITY => "Humidity",
            QUANTITY => "Quantity",
            VIBRATION => "Vibration",
            PRODUCTION_SPEED => "Production speed",
            DEFECT_RATE => "Defect rate",
            PRESSURE => "Pressure",
            STOCK_LEVEL => "Stock level",
            other => other,
        }
    }
}

/// One telemetry sample. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    /// Sensor category (`raw_material`, `production_line`, `warehouse`)
    pub sensor_type: String,
    pub parameter: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    /// Ground-truth flag set by simulators; never read by the detectors.
    #[serde(default)]
    pub is_anomaly: bool,
}

impl Reading {
    pub fn new(
        sensor_id: impl Into<String>,
        sensor_type: impl Into<String>,
        parameter: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            sensor_type: sensor_type.into(),
            parameter: parameter.into(),
            value,
            unit: String::new(),
            timestamp,
            is_anomaly: false,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Registry key for a trained model: a sensor, optionally narrowed to one parameter.
///
/// String form is `sensor_id` or `sensor_id:parameter`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    sensor_id: String,
    parameter: Option<String>,
}

/// Rejected key shapes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("sensor id must not be empty")]
    EmptySensorId,
    #[error("parameter must not be empty")]
    EmptyParameter,
    #[error("key component contains reserved ':' separator: {0}")]
    ReservedSeparator(String),
    #[error("model key {0} requires a parameter")]
    MissingParameter(String),
}

impl ModelKey {
    /// Per-sensor key (Outlier Scorer).
    pub fn sensor(sensor_id: &str) -> Result<Self, KeyError> {
        Self::validate(sensor_id, KeyError::EmptySensorId)?;
        Ok(Self {
            sensor_id: sensor_id.to_string(),
            parameter: None,
        })
    }

    /// Per (sensor, parameter) key (forecaster, reconstructor).
    pub fn series(sensor_id: &str, parameter: &str) -> Result<Self, KeyError> {
        Self::validate(sensor_id, KeyError::EmptySensorId)?;
        Self::validate(parameter, KeyError::EmptyParameter)?;
        Ok(Self {
            sensor_id: sensor_id.to_string(),
            parameter: Some(parameter.to_string()),
        })
    }

    fn validate(part: &str, empty: KeyError) -> Result<(), KeyError> {
        if part.is_empty() {
            return Err(empty);
        }
        if part.contains(':') {
            return Err(KeyError::ReservedSeparator(part.to_string()));
        }
        Ok(())
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn parameter(&self) -> Option<&str> {
        self.parameter.as_deref()
    }

    /// Parameter for keys that must carry one.
    pub fn require_parameter(&self) -> Result<&str, KeyError> {
        self.parameter
            .as_deref()
            .ok_or_else(|| KeyError::MissingParameter(self.to_string()))
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parameter {
            Some(p) => write!(f, "{}:{}", self.sensor_id, p),
            None => write!(f, "{}", self.sensor_id),
        }
    }
}

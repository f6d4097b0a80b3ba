//! Static threshold rules and severity escalation lists

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::reading::{parameters, sensor_types};

/// Static bounds for one (sensor_type, parameter) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ThresholdRule {
    pub const fn range(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub const fn max_only(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }
}

/// `sensor_type -> parameter -> rule`
pub type ThresholdTable = HashMap<String, HashMap<String, ThresholdRule>>;

/// Parameters whose *min* violation escalates to high severity (capacity / stock).
pub const MIN_ESCALATION: &[&str] = &[parameters::QUANTITY, parameters::STOCK_LEVEL];

/// Parameters whose *max* violation escalates to high severity (safety).
pub const MAX_ESCALATION: &[&str] = &[parameters::TEMPERATURE, parameters::DEFECT_RATE];

/// Parameters that get outlier scoring on the alert path.
pub const DEFAULT_ML_PARAMETERS: &[&str] = &[
    parameters::TEMPERATURE,
    parameters::VIBRATION,
    parameters::PRODUCTION_SPEED,
];

/// Built-in rule table for the three plant categories.
pub fn default_threshold_table() -> ThresholdTable {
    let raw_material = [
        (parameters::TEMPERATURE, ThresholdRule::range(15.0, 25.0)),
        (parameters::HUMIDITY, ThresholdRule::range(35.0, 55.0)),
        (parameters::QUANTITY, ThresholdRule::range(1000.0, 10000.0)),
        (parameters::VIBRATION, ThresholdRule::max_only(1.0)),
    ];
    let production_line = [
        (parameters::TEMPERATURE, ThresholdRule::range(60.0, 90.0)),
        (parameters::VIBRATION, ThresholdRule::max_only(5.0)),
        (parameters::PRODUCTION_SPEED, ThresholdRule::range(80.0, 120.0)),
        (parameters::DEFECT_RATE, ThresholdRule::max_only(5.0)),
        (parameters::PRESSURE, ThresholdRule::range(1.0, 2.0)),
    ];
    let warehouse = [
        (parameters::TEMPERATURE, ThresholdRule::range(15.0, 22.0)),
        (parameters::HUMIDITY, ThresholdRule::range(30.0, 50.0)),
        (parameters::STOCK_LEVEL, ThresholdRule::range(2000.0, 12000.0)),
        (parameters::VIBRATION, ThresholdRule::max_only(0.5)),
    ];

    let to_map = |rules: &[(&str, ThresholdRule)]| -> HashMap<String, ThresholdRule> {
        rules.iter().map(|(p, r)| ((*p).to_string(), *r)).collect()
    };

    let mut table = ThresholdTable::new();
    table.insert(sensor_types::RAW_MATERIAL.to_string(), to_map(&raw_material));
    table.insert(sensor_types::PRODUCTION_LINE.to_string(), to_map(&production_line));
    table.insert(sensor_types::WAREHOUSE.to_string(), to_map(&warehouse));
    table
}

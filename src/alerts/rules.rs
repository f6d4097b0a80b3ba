//! Threshold Rule Engine
//!
//! Static `sensor_type -> parameter -> {min?, max?}` table. Bounds are strict:
//! a value equal to a bound never alerts. The min bound is checked first so
//! a misconfigured rule (min above max) still yields one deterministic alert.

use crate::types::{
    parameters, AlertSeverity, AlertType, NewAlert, Reading, ThresholdRule, ThresholdTable,
    MAX_ESCALATION, MIN_ESCALATION,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Min,
    Max,
}

/// Evaluates readings against a rule table that never changes after construction.
#[derive(Debug, Clone)]
pub struct ThresholdEngine {
    table: ThresholdTable,
}

impl ThresholdEngine {
    pub fn new(table: ThresholdTable) -> Self {
        Self { table }
    }

    pub fn rule(&self, sensor_type: &str, parameter: &str) -> Option<&ThresholdRule> {
        self.table.get(sensor_type)?.get(parameter)
    }

    /// Threshold alert for `reading`, if any. No rule means no alert.
    pub fn evaluate(&self, reading: &Reading) -> Option<NewAlert> {
        let rule = self.rule(&reading.sensor_type, &reading.parameter)?;
        let value = reading.value;

        let (bound, limit) = match (rule.min, rule.max) {
            (Some(min), _) if value < min => (Bound::Min, min),
            (_, Some(max)) if value > max => (Bound::Max, max),
            _ => return None,
        };

        let label = parameters::label(&reading.parameter);
        let message = match bound {
            Bound::Min => format!("{label} below minimum threshold: {value} < {limit}"),
            Bound::Max => format!("{label} above maximum threshold: {value} > {limit}"),
        };

        Some(NewAlert {
            sensor_id: reading.sensor_id.clone(),
            sensor_type: reading.sensor_type.clone(),
            alert_type: AlertType::Threshold,
            severity: severity(bound, &reading.parameter),
            message,
            value,
            threshold: Some(limit),
        })
    }
}

fn severity(bound: Bound, parameter: &str) -> AlertSeverity {
    let escalating = match bound {
        Bound::Min => MIN_ESCALATION,
        Bound::Max => MAX_ESCALATION,
    };
    if escalating.contains(&parameter) {
        AlertSeverity::High
    } else {
        AlertSeverity::Medium
    }
}

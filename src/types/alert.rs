//! Alert types: AlertType, AlertSeverity, NewAlert, Alert

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which check produced the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Static min/max rule violation
    Threshold,
    /// Outlier Scorer flagged the value
    MlAnomaly,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::Threshold => write!(f, "threshold"),
            AlertType::MlAnomaly => write!(f, "ml_anomaly"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Low => write!(f, "low"),
            AlertSeverity::Medium => write!(f, "medium"),
            AlertSeverity::High => write!(f, "high"),
        }
    }
}

/// Alert produced by the generator, before the store assigns identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub sensor_id: String,
    pub sensor_type: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub value: f64,
    /// Bound that was crossed (threshold alerts only)
    pub threshold: Option<f64>,
}

/// Persisted alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    pub sensor_id: String,
    pub sensor_type: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub value: f64,
    pub threshold: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub is_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Materialise a draft as a fresh, unresolved alert.
    pub fn from_new(id: u64, draft: NewAlert, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            sensor_id: draft.sensor_id,
            sensor_type: draft.sensor_type,
            alert_type: draft.alert_type,
            severity: draft.severity,
            message: draft.message,
            value: draft.value,
            threshold: draft.threshold,
            created_at,
            is_resolved: false,
            resolved_at: None,
        }
    }

    /// Operator resolution. Idempotent: the first resolution time is kept.
    pub fn resolve(&mut self, at: DateTime<Utc>) {
        if !self.is_resolved {
            self.is_resolved = true;
            self.resolved_at = Some(at);
        }
    }
}

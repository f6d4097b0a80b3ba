//! Alert pipeline integration tests
//!
//! Readings flow through `TelemetryEngine::ingest`: store, threshold rules,
//! outlier scoring on the allow-listed parameters, one persisted batch.

use chrono::{Duration, Utc};
use plantwatch::simulation::{find_profile, ReadingSimulator};
use plantwatch::types::{AlertSeverity, AlertType, Detection, Reading};
use plantwatch::{EngineConfig, TelemetryEngine};

fn pl_temperature(value: f64) -> Reading {
    Reading::new("pl_temp_001", "production_line", "temperature", value, Utc::now()).with_unit("°C")
}

// ============================================================================
// Threshold path
// ============================================================================

#[test]
fn hot_production_line_reading_yields_single_high_threshold_alert() {
    let engine = TelemetryEngine::in_memory(EngineConfig::default());

    let alerts = engine.ingest(&pl_temperature(95.0)).unwrap();

    assert_eq!(alerts.len(), 1, "no prior model, so no ml_anomaly alert");
    let alert = &alerts[0];
    assert_eq!(alert.alert_type, AlertType::Threshold);
    assert_eq!(alert.severity, AlertSeverity::High);
    assert_eq!(alert.threshold, Some(90.0));
    assert_eq!(alert.value, 95.0);
    assert!(!alert.is_resolved);
    assert!(alert.resolved_at.is_none());
}

#[test]
fn readings_on_the_bound_never_alert() {
    let engine = TelemetryEngine::in_memory(EngineConfig::default());
    assert!(engine.ingest(&pl_temperature(90.0)).unwrap().is_empty());
    assert!(engine.ingest(&pl_temperature(60.0)).unwrap().is_empty());
    assert_eq!(engine.ingest(&pl_temperature(59.99)).unwrap().len(), 1);
}

#[test]
fn cold_humidity_is_medium_severity() {
    let engine = TelemetryEngine::in_memory(EngineConfig::default());
    let reading = Reading::new("wh_humidity_001", "warehouse", "humidity", 25.0, Utc::now());
    let alerts = engine.ingest(&reading).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::Medium);
    assert_eq!(alerts[0].threshold, Some(30.0));
}

// ============================================================================
// Outlier path
// ============================================================================

#[test]
fn spike_after_calm_history_raises_both_alerts() {
    let engine = TelemetryEngine::in_memory(EngineConfig::default());
    let profile = find_profile("pl_temp_001").unwrap();
    let mut sim = ReadingSimulator::new(11).with_anomaly_prob(0.0);

    let start = Utc::now() - Duration::hours(2);
    for reading in sim.series(profile, start, Duration::minutes(2), 50) {
        engine.ingest(&reading).unwrap();
    }

    // base + 10 * range: far outside anything seen and above the rule max
    let alerts = engine.ingest(&pl_temperature(175.0)).unwrap();
    let types: Vec<AlertType> = alerts.iter().map(|a| a.alert_type).collect();
    assert_eq!(types, vec![AlertType::Threshold, AlertType::MlAnomaly]);
    assert!(alerts.iter().all(|a| a.severity == AlertSeverity::High));
    assert_ne!(alerts[0].id, alerts[1].id);
}

#[test]
fn pressure_is_never_scored() {
    let engine = TelemetryEngine::in_memory(EngineConfig::default());
    let start = Utc::now() - Duration::hours(1);
    for i in 0..30 {
        let reading = Reading::new(
            "pl_pressure_001",
            "production_line",
            "pressure",
            1.5,
            start + Duration::minutes(i),
        );
        engine.ingest(&reading).unwrap();
    }
    let reading = Reading::new("pl_pressure_001", "production_line", "pressure", 1.9, Utc::now());
    assert!(engine.ingest(&reading).unwrap().is_empty());
    assert!(engine.outlier().handle(&plantwatch::ModelKey::sensor("pl_pressure_001").unwrap()).is_none());
}

// ============================================================================
// Alert lifecycle
// ============================================================================

#[test]
fn active_alerts_newest_first_and_resolution() {
    let engine = TelemetryEngine::in_memory(EngineConfig::default());
    let first = engine.ingest(&pl_temperature(95.0)).unwrap().remove(0);
    let second = engine.ingest(&pl_temperature(97.0)).unwrap().remove(0);

    let active = engine.alerts().active_alerts(10).unwrap();
    assert_eq!(active.iter().map(|a| a.id).collect::<Vec<_>>(), vec![second.id, first.id]);

    let resolved = engine.alerts().resolve(first.id).unwrap().unwrap();
    assert!(resolved.is_resolved);
    assert!(resolved.resolved_at.is_some());

    let active = engine.alerts().active_alerts(10).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second.id);
}

#[test]
fn sled_engine_keeps_alerts_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let engine = TelemetryEngine::open_at(EngineConfig::default(), dir.path()).unwrap();
        engine.ingest(&pl_temperature(99.0)).unwrap()[0].id
    };

    let engine = TelemetryEngine::open_at(EngineConfig::default(), dir.path()).unwrap();
    let active = engine.alerts().active_alerts(5).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, id);
    assert_eq!(active[0].value, 99.0);
}

// ============================================================================
// Lookback limits
// ============================================================================

#[test]
fn oversized_lookbacks_scan_all_history() {
    let mut config = EngineConfig::default();
    config.forecast.history_hours = u64::MAX;
    config.forecast.stock_history_days = u64::MAX;
    config.reconstruction.history_hours = u64::MAX;
    let engine = TelemetryEngine::in_memory(config);

    let profile = find_profile("pl_temp_001").unwrap();
    let mut sim = ReadingSimulator::new(5).with_anomaly_prob(0.0);
    let start = Utc::now() - Duration::hours(3);
    for reading in sim.series(profile, start, Duration::minutes(3), 50) {
        engine.ingest(&reading).unwrap();
    }

    for hours in [1 << 50, u64::MAX] {
        let detection = engine.detect_outliers("pl_temp_001", hours).unwrap();
        assert!(matches!(detection, Detection::Completed { .. }));

        let windows = engine
            .detect_windows("pl_temp_001", "temperature", hours, 10, None)
            .unwrap();
        assert!(matches!(windows, Detection::Completed { .. }));
    }

    assert!(engine.forecast("pl_temp_001", "temperature", 4).unwrap().forecast().is_some());
    assert!(engine.stock_outlook("wh_stock_001", 7).is_ok());
}

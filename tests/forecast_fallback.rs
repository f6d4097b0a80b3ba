//! Trajectory Forecaster integration tests: linear determinism and
//! permanent demotion of the primary method.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use plantwatch::config::ForecastConfig;
use plantwatch::ml_engine::{linear_forecast, FittedForecast, ForecastError, ForecastModel};
use plantwatch::storage::InMemoryStore;
use plantwatch::types::{ForecastKeyState, ForecastMethod, ForecastOutcome, ForecastPoint, ModelKey, Reading};
use plantwatch::TrajectoryForecaster;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 6, 0, 0).unwrap()
}

fn hourly_ramp(n: usize) -> Vec<(DateTime<Utc>, f64)> {
    (0..n).map(|i| (t0() + Duration::hours(i as i64), 50.0 + i as f64)).collect()
}

fn key() -> ModelKey {
    ModelKey::series("pl_temp_001", "temperature").unwrap()
}

/// Primary whose fit (or predict) always fails, counting invocations.
struct Flaky {
    fits: Arc<AtomicUsize>,
    predicts: Arc<AtomicUsize>,
    fail_fit: bool,
}

struct FlakyFit {
    predicts: Arc<AtomicUsize>,
}

impl ForecastModel for Flaky {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::Seasonal
    }

    fn fit(&self, _history: &[(DateTime<Utc>, f64)]) -> Result<Box<dyn FittedForecast>, ForecastError> {
        self.fits.fetch_add(1, Ordering::SeqCst);
        if self.fail_fit {
            Err(ForecastError::Fit("optimizer diverged".into()))
        } else {
            Ok(Box::new(FlakyFit {
                predicts: Arc::clone(&self.predicts),
            }))
        }
    }
}

impl FittedForecast for FlakyFit {
    fn predict(&self, _last: DateTime<Utc>, _horizon: usize) -> Result<Vec<ForecastPoint>, ForecastError> {
        self.predicts.fetch_add(1, Ordering::SeqCst);
        Err(ForecastError::Inference("NaN in trend".into()))
    }
}

fn flaky(fail_fit: bool) -> (TrajectoryForecaster, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let fits = Arc::new(AtomicUsize::new(0));
    let predicts = Arc::new(AtomicUsize::new(0));
    let forecaster = TrajectoryForecaster::with_primary(
        ForecastConfig::default(),
        Box::new(Flaky {
            fits: Arc::clone(&fits),
            predicts: Arc::clone(&predicts),
            fail_fit,
        }),
    );
    (forecaster, fits, predicts)
}

// ============================================================================
// Linear fallback determinism
// ============================================================================

#[test]
fn two_points_extrapolate_along_their_slope() {
    let history = vec![(t0(), 10.0), (t0() + Duration::hours(4), 18.0)];
    let forecast = linear_forecast(&history, 3).unwrap();
    assert_eq!(forecast.method, ForecastMethod::LinearFallback);
    assert_eq!(forecast.current_value, 18.0);

    let values: Vec<f64> = forecast.points.iter().map(|p| p.value).collect();
    for (got, want) in values.iter().zip([20.0, 22.0, 24.0]) {
        assert!((got - want).abs() < 1e-9, "got {got}, want {want}");
    }
    assert_eq!(forecast.points[0].timestamp, t0() + Duration::hours(5));
}

#[test]
fn equal_timestamps_forecast_the_last_value() {
    let history = vec![(t0(), 3.0), (t0(), 7.0)];
    let forecast = linear_forecast(&history, 4).unwrap();
    assert!(forecast.points.iter().all(|p| p.value == 7.0));
}

// ============================================================================
// Demotion
// ============================================================================

#[test]
fn fit_failure_is_remembered_forever() {
    let (forecaster, fits, _) = flaky(true);
    let history = hourly_ramp(48);

    for _ in 0..4 {
        let outcome = forecaster.forecast(&key(), &history, 6).unwrap();
        assert_eq!(outcome.forecast().unwrap().method, ForecastMethod::LinearFallback);
    }
    assert_eq!(fits.load(Ordering::SeqCst), 1);
    assert_eq!(forecaster.state(&key()), ForecastKeyState::FallbackOnly);
}

#[test]
fn inference_failure_demotes_like_fit_failure() {
    let (forecaster, fits, predicts) = flaky(false);
    let history = hourly_ramp(48);

    let first = forecaster.forecast(&key(), &history, 6).unwrap();
    let points = &first.forecast().unwrap().points;
    assert_eq!(points.len(), 6);
    assert!((points[0].value - 98.0).abs() < 1e-9);

    for _ in 0..3 {
        forecaster.forecast(&key(), &history, 6).unwrap();
    }
    assert_eq!(fits.load(Ordering::SeqCst), 1);
    assert_eq!(predicts.load(Ordering::SeqCst), 1);
    assert_eq!(forecaster.state(&key()), ForecastKeyState::FallbackOnly);
}

#[test]
fn demotion_is_per_key() {
    let (forecaster, fits, _) = flaky(true);
    let other = ModelKey::series("pl_temp_002", "temperature").unwrap();
    forecaster.forecast(&key(), &hourly_ramp(30), 2).unwrap();
    assert_eq!(forecaster.state(&other), ForecastKeyState::Untried);
    forecaster.forecast(&other, &hourly_ramp(30), 2).unwrap();
    assert_eq!(fits.load(Ordering::SeqCst), 2);
}

#[test]
fn short_history_never_invokes_the_primary() {
    let (forecaster, fits, _) = flaky(true);
    let outcome = forecaster.forecast(&key(), &hourly_ramp(23), 6).unwrap();
    assert_eq!(
        outcome,
        ForecastOutcome::InsufficientData { available: 23, required: 24 }
    );
    assert_eq!(fits.load(Ordering::SeqCst), 0);
    assert_eq!(forecaster.state(&key()), ForecastKeyState::Untried);
}

// ============================================================================
// Store-backed forecasting
// ============================================================================

#[test]
fn forecast_recent_reads_the_store() {
    let start = Utc::now() - Duration::hours(36);
    let store = InMemoryStore::with_readings((0..36).map(|h| {
        Reading::new("pl_temp_001", "production_line", "temperature", 70.0, start + Duration::hours(h))
    }));
    let forecaster = TrajectoryForecaster::new(ForecastConfig {
        seasonal_enabled: false,
        ..ForecastConfig::default()
    });

    let outcome = forecaster.forecast_recent(&store, &key(), 12, 168).unwrap();
    let forecast = outcome.forecast().unwrap();
    assert_eq!(forecast.points.len(), 12);
    assert!(forecast.points.iter().all(|p| (p.value - 70.0).abs() < 1e-9));
}

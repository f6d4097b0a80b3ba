//! Additive seasonal model: trend + daily + weekly Fourier terms
//!
//! `y(t) = b0 + b1·t/span + Σ_k [a_k sin(2πkt/24) + c_k cos(2πkt/24)]
//!                        + Σ_k [d_k sin(2πkt/168) + e_k cos(2πkt/168)]`
//!
//! Coefficients come from ridge-regularised least squares solved through a
//! Cholesky factorisation of the normal equations. The interval is
//! `± z·σ` with `z` the two-sided normal quantile for `interval_width`.

use chrono::{DateTime, Duration, Utc};
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;

use crate::config::ForecastConfig;
use crate::types::{ForecastMethod, ForecastPoint};

use super::{FittedForecast, ForecastError, ForecastModel};

const DAILY_PERIOD_HOURS: f64 = 24.0;
const WEEKLY_PERIOD_HOURS: f64 = 168.0;

/// Ridge penalty on every coefficient except the intercept.
const RIDGE_PENALTY: f64 = 1e-4;

/// Seasonal fitter. Stateless; each `fit` yields an independent model.
#[derive(Debug, Clone, Copy)]
pub struct SeasonalForecaster {
    daily_order: usize,
    weekly_order: usize,
    interval_width: f64,
}

impl SeasonalForecaster {
    pub fn new(daily_order: usize, weekly_order: usize, interval_width: f64) -> Self {
        Self {
            daily_order,
            weekly_order,
            interval_width,
        }
    }

    pub fn from_config(config: &ForecastConfig) -> Self {
        Self::new(config.daily_order, config.weekly_order, config.interval_width)
    }

    fn n_features(&self) -> usize {
        2 + 2 * (self.daily_order + self.weekly_order)
    }
}

/// Design row for `hours` since the model origin.
fn features(hours: f64, span: f64, daily_order: usize, weekly_order: usize) -> Vec<f64> {
    let mut row = Vec::with_capacity(2 + 2 * (daily_order + weekly_order));
    row.push(1.0);
    row.push(hours / span);
    for (period, order) in [(DAILY_PERIOD_HOURS, daily_order), (WEEKLY_PERIOD_HOURS, weekly_order)] {
        for k in 1..=order {
            let angle = 2.0 * PI * k as f64 * hours / period;
            row.push(angle.sin());
            row.push(angle.cos());
        }
    }
    row
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 3_600_000.0
}

/// Solve `A x = b` for symmetric positive-definite `A` (row-major `p × p`).
fn cholesky_solve(a: &[f64], b: &[f64], p: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; p * p];
    for i in 0..p {
        for j in 0..=i {
            let mut sum = a[i * p + j];
            for k in 0..j {
                sum -= l[i * p + k] * l[j * p + k];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i * p + i] = sum.sqrt();
            } else {
                l[i * p + j] = sum / l[j * p + j];
            }
        }
    }

    // L y = b
    let mut y = vec![0.0; p];
    for i in 0..p {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[i * p + k] * y[k];
        }
        y[i] = sum / l[i * p + i];
    }

    // Lᵀ x = y
    let mut x = vec![0.0; p];
    for i in (0..p).rev() {
        let mut sum = y[i];
        for k in (i + 1)..p {
            sum -= l[k * p + i] * x[k];
        }
        x[i] = sum / l[i * p + i];
    }
    Some(x)
}

impl ForecastModel for SeasonalForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::Seasonal
    }

    fn fit(&self, history: &[(DateTime<Utc>, f64)]) -> Result<Box<dyn FittedForecast>, ForecastError> {
        let p = self.n_features();
        if history.len() <= p {
            return Err(ForecastError::InsufficientHistory {
                available: history.len(),
                required: p + 1,
            });
        }

        let origin = history[0].0;
        let span = hours_between(origin, history[history.len() - 1].0);
        if span <= 0.0 {
            return Err(ForecastError::Fit("history spans zero time".into()));
        }

        let mut xtx = vec![0.0; p * p];
        let mut xty = vec![0.0; p];
        let rows: Vec<Vec<f64>> = history
            .iter()
            .map(|(ts, _)| features(hours_between(origin, *ts), span, self.daily_order, self.weekly_order))
            .collect();

        for (row, (_, y)) in rows.iter().zip(history) {
            for i in 0..p {
                xty[i] += row[i] * y;
                for j in 0..p {
                    xtx[i * p + j] += row[i] * row[j];
                }
            }
        }
        for i in 1..p {
            xtx[i * p + i] += RIDGE_PENALTY * history.len() as f64;
        }

        let coefficients = cholesky_solve(&xtx, &xty, p)
            .ok_or_else(|| ForecastError::Fit("normal equations are singular".into()))?;
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ForecastError::Fit("non-finite coefficients".into()));
        }

        let ssr: f64 = rows
            .iter()
            .zip(history)
            .map(|(row, (_, y))| {
                let fitted: f64 = row.iter().zip(&coefficients).map(|(x, c)| x * c).sum();
                (y - fitted).powi(2)
            })
            .sum();
        let sigma = (ssr / (history.len() - p) as f64).sqrt();

        let z = Normal::new(0.0, 1.0)
            .map_err(|e| ForecastError::Fit(e.to_string()))?
            .inverse_cdf(0.5 + self.interval_width / 2.0);

        Ok(Box::new(SeasonalFit {
            origin,
            span,
            daily_order: self.daily_order,
            weekly_order: self.weekly_order,
            coefficients,
            half_width: z * sigma,
        }))
    }
}

/// A fitted seasonal model. Evaluates at any timestamp, so later calls with
/// newer history forecast from their own last point.
#[derive(Debug, Clone)]
pub struct SeasonalFit {
    origin: DateTime<Utc>,
    span: f64,
    daily_order: usize,
    weekly_order: usize,
    coefficients: Vec<f64>,
    half_width: f64,
}

impl SeasonalFit {
    fn value_at(&self, ts: DateTime<Utc>) -> f64 {
        let row = features(hours_between(self.origin, ts), self.span, self.daily_order, self.weekly_order);
        row.iter().zip(&self.coefficients).map(|(x, c)| x * c).sum()
    }
}

impl FittedForecast for SeasonalFit {
    fn predict(&self, last: DateTime<Utc>, horizon: usize) -> Result<Vec<ForecastPoint>, ForecastError> {
        (1..=horizon)
            .map(|h| {
                let timestamp = last + Duration::hours(h as i64);
                let value = self.value_at(timestamp);
                if !value.is_finite() || !self.half_width.is_finite() {
                    return Err(ForecastError::Inference(format!(
                        "non-finite forecast at {timestamp}"
                    )));
                }
                Ok(ForecastPoint {
                    timestamp,
                    value,
                    lower_bound: value - self.half_width,
                    upper_bound: value + self.half_width,
                })
            })
            .collect()
    }
}

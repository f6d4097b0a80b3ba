//! Deterministic least-squares trend models
//!
//! - `LinearForecaster`: value against elapsed hours, the forecaster's
//!   fallback method. Band is `±2σ` of the residuals (population std).
//! - `stock_outlook_from`: value against elapsed days for stock sensors.

use chrono::{DateTime, Duration, Utc};

use crate::types::{
    ForecastMethod, ForecastPoint, ShortageRisk, StockOutlook, StockOutlookOutcome, StockTrend,
};

use super::{FittedForecast, ForecastError, ForecastModel};

/// Below this fraction of the current stock the outlook is high risk.
const HIGH_RISK_FRACTION: f64 = 0.2;
/// Below this fraction of the current stock the outlook is medium risk.
const MEDIUM_RISK_FRACTION: f64 = 0.4;

/// Ordinary least squares `y = slope * x + intercept`.
///
/// When every `x` is equal the slope is 0 and the intercept is the last `y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeastSquares {
    pub slope: f64,
    pub intercept: f64,
}

impl LeastSquares {
    pub fn fit(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let n = xs.len().min(ys.len());
        if n == 0 {
            return None;
        }
        let nf = n as f64;
        let sum_x: f64 = xs[..n].iter().sum();
        let sum_y: f64 = ys[..n].iter().sum();
        let sum_xy: f64 = xs[..n].iter().zip(&ys[..n]).map(|(x, y)| x * y).sum();
        let sum_x2: f64 = xs[..n].iter().map(|x| x * x).sum();

        let denom = nf * sum_x2 - sum_x * sum_x;
        if denom.abs() < f64::EPSILON * nf * sum_x2.max(1.0) {
            return Some(Self {
                slope: 0.0,
                intercept: ys[n - 1],
            });
        }

        let slope = (nf * sum_xy - sum_x * sum_y) / denom;
        Some(Self {
            slope,
            intercept: (sum_y - slope * sum_x) / nf,
        })
    }

    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 3_600_000.0
}

/// Linear trend over elapsed hours.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearForecaster;

/// A fitted trend line and its residual spread.
#[derive(Debug, Clone)]
pub struct LinearTrend {
    origin: DateTime<Utc>,
    line: LeastSquares,
    residual_std: f64,
}

impl LinearTrend {
    pub fn slope_per_hour(&self) -> f64 {
        self.line.slope
    }

    pub fn residual_std(&self) -> f64 {
        self.residual_std
    }
}

impl ForecastModel for LinearForecaster {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::LinearFallback
    }

    fn fit(&self, history: &[(DateTime<Utc>, f64)]) -> Result<Box<dyn FittedForecast>, ForecastError> {
        Ok(Box::new(LinearTrend::fit(history)?))
    }
}

impl LinearTrend {
    pub fn fit(history: &[(DateTime<Utc>, f64)]) -> Result<Self, ForecastError> {
        if history.len() < 2 {
            return Err(ForecastError::InsufficientHistory {
                available: history.len(),
                required: 2,
            });
        }

        let origin = history[0].0;
        let xs: Vec<f64> = history.iter().map(|(ts, _)| hours_between(origin, *ts)).collect();
        let ys: Vec<f64> = history.iter().map(|(_, v)| *v).collect();
        let line = LeastSquares::fit(&xs, &ys).ok_or_else(|| ForecastError::Fit("empty history".into()))?;

        let residuals: Vec<f64> = xs.iter().zip(&ys).map(|(x, y)| y - line.at(*x)).collect();
        let residual_std = if residuals.len() > 1 {
            let mean = residuals.iter().sum::<f64>() / residuals.len() as f64;
            (residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / residuals.len() as f64).sqrt()
        } else {
            (ys[ys.len() - 1] * 0.1).abs()
        };

        Ok(Self {
            origin,
            line,
            residual_std,
        })
    }
}

impl FittedForecast for LinearTrend {
    fn predict(&self, last: DateTime<Utc>, horizon: usize) -> Result<Vec<ForecastPoint>, ForecastError> {
        let last_hours = hours_between(self.origin, last);
        Ok((1..=horizon)
            .map(|h| {
                let value = self.line.at(last_hours + h as f64);
                ForecastPoint {
                    timestamp: last + Duration::hours(h as i64),
                    value,
                    lower_bound: value - 2.0 * self.residual_std,
                    upper_bound: value + 2.0 * self.residual_std,
                }
            })
            .collect())
    }
}

/// Stock projection `days_ahead` past the last reading.
///
/// `history` is `(timestamp, stock_level)` ascending.
pub fn stock_outlook_from(
    history: &[(DateTime<Utc>, f64)],
    days_ahead: u32,
    min_points: usize,
) -> StockOutlookOutcome {
    if history.len() < min_points.max(1) {
        return StockOutlookOutcome::InsufficientData {
            available: history.len(),
            required: min_points.max(1),
        };
    }

    let origin = history[0].0;
    let xs: Vec<f64> = history
        .iter()
        .map(|(ts, _)| hours_between(origin, *ts) / 24.0)
        .collect();
    let ys: Vec<f64> = history.iter().map(|(_, v)| *v).collect();
    let Some(line) = LeastSquares::fit(&xs, &ys) else {
        return StockOutlookOutcome::InsufficientData {
            available: 0,
            required: min_points.max(1),
        };
    };

    let current = ys[ys.len() - 1];
    let forecast = line.at(xs[xs.len() - 1] + f64::from(days_ahead));
    let shortage_risk = if forecast < current * HIGH_RISK_FRACTION {
        ShortageRisk::High
    } else if forecast < current * MEDIUM_RISK_FRACTION {
        ShortageRisk::Medium
    } else {
        ShortageRisk::Low
    };

    StockOutlookOutcome::Outlook(StockOutlook {
        forecast,
        current,
        days_ahead,
        shortage_risk,
        trend: if line.slope < 0.0 {
            StockTrend::Decreasing
        } else {
            StockTrend::Increasing
        },
    })
}

//! Value scalers fitted once at training time
//!
//! A scaler is stored inside the handle it was fitted for; the two are
//! never swapped independently.

use serde::{Deserialize, Serialize};

/// Floor below which a spread is treated as zero.
const MIN_SPREAD: f64 = 1e-8;

/// Zero-mean, unit-variance scaling (population variance).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: f64,
    std: f64,
}

impl StandardScaler {
    /// Fit on `values`. A constant series scales with std 1.0.
    pub fn fit(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self { mean: 0.0, std: 1.0 };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        Self {
            mean,
            std: if std < MIN_SPREAD { 1.0 } else { std },
        }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std(&self) -> f64 {
        self.std
    }
}

/// Maps the fitted range onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: f64,
    max: f64,
}

impl MinMaxScaler {
    /// Fit on `values`. Empty input yields the identity on `[0, 1]`.
    pub fn fit(values: &[f64]) -> Self {
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        if min.is_finite() && max.is_finite() {
            Self { min, max }
        } else {
            Self { min: 0.0, max: 1.0 }
        }
    }

    /// Scale one value. Values outside the fitted range land outside `[0, 1]`.
    ///
    /// A flat fit scales by 1.0, so departures from the constant still show.
    pub fn transform(&self, value: f64) -> f64 {
        let range = self.max - self.min;
        if range < MIN_SPREAD {
            value - self.min
        } else {
            (value - self.min) / range
        }
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| self.transform(*v)).collect()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_scaler_population_std() {
        let scaler = StandardScaler::fit(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((scaler.mean() - 5.0).abs() < 1e-12);
        assert!((scaler.std() - 2.0).abs() < 1e-12);
        assert!((scaler.transform(9.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_series_does_not_divide_by_zero() {
        let scaler = StandardScaler::fit(&[3.0; 10]);
        assert_eq!(scaler.transform(4.0), 1.0);

        let mm = MinMaxScaler::fit(&[3.0; 10]);
        assert_eq!(mm.transform(3.0), 0.0);
        assert_eq!(mm.transform(100.0), 97.0);
        assert_eq!(mm.transform(1.0), -2.0);
    }

    #[test]
    fn test_min_max_range() {
        let mm = MinMaxScaler::fit(&[10.0, 20.0, 15.0]);
        assert_eq!(mm.transform_all(&[10.0, 15.0, 20.0, 30.0]), vec![0.0, 0.5, 1.0, 2.0]);
    }
}

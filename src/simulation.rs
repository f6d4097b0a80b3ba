//! Synthetic plant telemetry
//!
//! Gaussian noise around a per-sensor base value (`σ = 0.3·range`) with
//! occasional injected anomalies: a spike to `base + 2·range` or a drop to
//! `base - 1.5·range`, equally likely. Values are clamped at zero and rounded
//! to two decimals. Seeded, so a run is reproducible.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::types::{parameters, sensor_types, Reading};

/// Default probability that a generated value is an injected anomaly.
pub const DEFAULT_ANOMALY_PROB: f64 = 0.05;

/// One simulated sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorProfile {
    pub sensor_id: &'static str,
    pub sensor_type: &'static str,
    pub parameter: &'static str,
    pub base: f64,
    pub range: f64,
    pub unit: &'static str,
}

const fn profile(
    sensor_id: &'static str,
    sensor_type: &'static str,
    parameter: &'static str,
    base: f64,
    range: f64,
    unit: &'static str,
) -> SensorProfile {
    SensorProfile {
        sensor_id,
        sensor_type,
        parameter,
        base,
        range,
        unit,
    }
}

/// The reference plant: four raw-material, five production-line and four
/// warehouse sensors.
pub const PLANT_SENSORS: &[SensorProfile] = &[
    profile("rm_temp_001", sensor_types::RAW_MATERIAL, parameters::TEMPERATURE, 20.0, 5.0, "°C"),
    profile("rm_humidity_001", sensor_types::RAW_MATERIAL, parameters::HUMIDITY, 45.0, 10.0, "%"),
    profile("rm_quantity_001", sensor_types::RAW_MATERIAL, parameters::QUANTITY, 5000.0, 500.0, "kg"),
    profile("rm_vibration_001", sensor_types::RAW_MATERIAL, parameters::VIBRATION, 0.5, 0.3, "mm/s"),
    profile("pl_temp_001", sensor_types::PRODUCTION_LINE, parameters::TEMPERATURE, 75.0, 10.0, "°C"),
    profile("pl_vibration_001", sensor_types::PRODUCTION_LINE, parameters::VIBRATION, 2.5, 1.0, "mm/s"),
    profile("pl_speed_001", sensor_types::PRODUCTION_LINE, parameters::PRODUCTION_SPEED, 100.0, 15.0, "units/min"),
    profile("pl_defect_001", sensor_types::PRODUCTION_LINE, parameters::DEFECT_RATE, 2.0, 1.5, "%"),
    profile("pl_pressure_001", sensor_types::PRODUCTION_LINE, parameters::PRESSURE, 1.5, 0.3, "bar"),
    profile("wh_temp_001", sensor_types::WAREHOUSE, parameters::TEMPERATURE, 18.0, 3.0, "°C"),
    profile("wh_humidity_001", sensor_types::WAREHOUSE, parameters::HUMIDITY, 40.0, 8.0, "%"),
    profile("wh_stock_001", sensor_types::WAREHOUSE, parameters::STOCK_LEVEL, 8000.0, 1000.0, "units"),
    profile("wh_vibration_001", sensor_types::WAREHOUSE, parameters::VIBRATION, 0.2, 0.1, "mm/s"),
];

pub fn find_profile(sensor_id: &str) -> Option<&'static SensorProfile> {
    PLANT_SENSORS.iter().find(|p| p.sensor_id == sensor_id)
}

pub struct ReadingSimulator {
    rng: StdRng,
    anomaly_prob: f64,
}

impl ReadingSimulator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            anomaly_prob: DEFAULT_ANOMALY_PROB,
        }
    }

    /// Override the injected anomaly rate (clamped to `[0, 1]`).
    pub fn with_anomaly_prob(mut self, anomaly_prob: f64) -> Self {
        self.anomaly_prob = anomaly_prob.clamp(0.0, 1.0);
        self
    }

    /// One value for `profile` and whether it was injected as an anomaly.
    pub fn generate_value(&mut self, profile: &SensorProfile) -> (f64, bool) {
        let noise: f64 = self.rng.sample::<f64, _>(StandardNormal) * profile.range * 0.3;
        let mut value = profile.base + noise;

        let is_anomaly = self.rng.gen::<f64>() < self.anomaly_prob;
        if is_anomaly {
            value = if self.rng.gen_bool(0.5) {
                profile.base + profile.range * 2.0
            } else {
                profile.base - profile.range * 1.5
            };
        }

        (round2(value.max(0.0)), is_anomaly)
    }

    pub fn reading(&mut self, profile: &SensorProfile, timestamp: DateTime<Utc>) -> Reading {
        let (value, is_anomaly) = self.generate_value(profile);
        let mut reading = Reading::new(
            profile.sensor_id,
            profile.sensor_type,
            profile.parameter,
            value,
            timestamp,
        )
        .with_unit(profile.unit);
        reading.is_anomaly = is_anomaly;
        reading
    }

    /// One reading from every sensor of `sensor_type`.
    pub fn tick_category(&mut self, sensor_type: &str, timestamp: DateTime<Utc>) -> Vec<Reading> {
        PLANT_SENSORS
            .iter()
            .filter(|p| p.sensor_type == sensor_type)
            .map(|p| self.reading(p, timestamp))
            .collect()
    }

    /// One reading from every plant sensor.
    pub fn tick(&mut self, timestamp: DateTime<Utc>) -> Vec<Reading> {
        PLANT_SENSORS.iter().map(|p| self.reading(p, timestamp)).collect()
    }

    /// `count` evenly spaced readings for one sensor, oldest first.
    pub fn series(
        &mut self,
        profile: &SensorProfile,
        start: DateTime<Utc>,
        interval: Duration,
        count: usize,
    ) -> Vec<Reading> {
        (0..count)
            .map(|i| self.reading(profile, start + interval * i as i32))
            .collect()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let now = Utc::now();
        let a = ReadingSimulator::new(7).tick(now);
        let b = ReadingSimulator::new(7).tick(now);
        assert_eq!(a, b);
        assert_eq!(a.len(), 13);
    }

    #[test]
    fn test_forced_anomalies_are_spikes_or_drops() {
        let profile = find_profile("pl_temp_001").unwrap();
        let mut sim = ReadingSimulator::new(1).with_anomaly_prob(1.0);
        for _ in 0..50 {
            let (value, is_anomaly) = sim.generate_value(profile);
            assert!(is_anomaly);
            assert!(value == 95.0 || value == 60.0, "value {value}");
        }
    }

    #[test]
    fn test_values_clamped_and_rounded() {
        let profile = find_profile("wh_vibration_001").unwrap();
        let mut sim = ReadingSimulator::new(3).with_anomaly_prob(0.0);
        for _ in 0..500 {
            let (value, is_anomaly) = sim.generate_value(profile);
            assert!(!is_anomaly);
            assert!(value >= 0.0);
            assert!(((value * 100.0).round() - value * 100.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_category_tick() {
        let mut sim = ReadingSimulator::new(5);
        let readings = sim.tick_category(sensor_types::WAREHOUSE, Utc::now());
        assert_eq!(readings.len(), 4);
        assert!(readings.iter().all(|r| r.sensor_type == "warehouse"));
        assert_eq!(readings[2].unit, "units");
    }
}

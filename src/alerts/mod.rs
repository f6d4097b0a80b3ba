//! Alerting: static threshold rules plus outlier scoring, persisted in batches
//!
//! - `rules`: Threshold Rule Engine (pure, synchronous)
//! - `generator`: Alert Generator (rules + Outlier Scorer -> Alert Store)

pub mod generator;
pub mod rules;

pub use generator::AlertGenerator;
pub use rules::ThresholdEngine;

//! Shared data structures for the telemetry intelligence core
//!
//! - Readings and model keys (input side)
//! - Threshold rules (static configuration)
//! - Alerts (generator output, persisted)
//! - ML outcomes: forecasts, detections, training reports (ephemeral)

mod reading;
mod alert;
// Public so `types::thresholds::MIN_ESCALATION` etc. stay addressable.
pub mod thresholds;
mod ml;

pub use reading::*;
pub use alert::*;
pub use thresholds::*;
pub use ml::*;

//! Window Reconstructor checkpoints.
//!
//! A checkpoint is self-describing: it carries the window size, so a process
//! that never trained the key can rebuild the network without being told the
//! architecture. Stored as JSON by every `ModelStore` backend, and exportable
//! to a standalone file (atomic save/load).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use crate::config::defaults::CHECKPOINT_VERSION;

use super::autoencoder::{Autoencoder, AutoencoderWeights};
use super::scaler::MinMaxScaler;

/// Serialised autoencoder + the scaler it was trained with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructorCheckpoint {
    /// Format version for forward compatibility.
    pub version: u32,
    pub window_size: usize,
    pub encoding_dim: usize,
    pub weights: AutoencoderWeights,
    pub scaler: MinMaxScaler,
    pub trained_at: DateTime<Utc>,
    /// Mean loss of the last training epoch.
    pub final_loss: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("unsupported checkpoint version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("checkpoint weights do not match window size {0}")]
    Shape(usize),
}

impl ReconstructorCheckpoint {
    pub fn capture(
        model: &Autoencoder,
        scaler: MinMaxScaler,
        trained_at: DateTime<Utc>,
        final_loss: f64,
    ) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            window_size: model.window_size(),
            encoding_dim: model.encoding_dim(),
            weights: model.weights().clone(),
            scaler,
            trained_at,
            final_loss,
        }
    }

    /// Rebuild the network. Validates version and layer shapes.
    pub fn restore(&self) -> Result<Autoencoder, CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Version {
                found: self.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        Autoencoder::from_weights(self.window_size, self.weights.clone())
            .filter(|model| model.encoding_dim() == self.encoding_dim)
            .ok_or(CheckpointError::Shape(self.window_size))
    }
}

/// Save a checkpoint to disk atomically (write temp file, then rename).
pub fn save_to_disk(cp: &ReconstructorCheckpoint, path: &Path) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(cp).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    // Write to temp file alongside the target
    let tmp_path = path.with_extension("json.tmp");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a checkpoint from disk.
pub fn load_from_disk(path: &Path) -> io::Result<ReconstructorCheckpoint> {
    let data = std::fs::read(path)?;
    serde_json::from_slice(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint() -> ReconstructorCheckpoint {
        let model = Autoencoder::new(12, 7);
        ReconstructorCheckpoint::capture(&model, MinMaxScaler::fit(&[1.0, 5.0]), Utc::now(), 0.01)
    }

    #[test]
    fn test_restore_gives_identical_reconstruction() {
        let cp = checkpoint();
        let json = serde_json::to_string(&cp).unwrap();
        let restored: ReconstructorCheckpoint = serde_json::from_str(&json).unwrap();

        let window = vec![0.3; 12];
        let a = cp.restore().unwrap().reconstruction_error(&window);
        let b = restored.restore().unwrap().reconstruction_error(&window);
        assert!((a - b).abs() < 1e-12);
        assert_eq!(restored.window_size, 12);
        assert_eq!(restored.encoding_dim, 4);
    }

    #[test]
    fn test_reject_version_and_shape() {
        let mut cp = checkpoint();
        cp.version = 99;
        assert!(matches!(cp.restore(), Err(CheckpointError::Version { found: 99, .. })));

        let mut cp = checkpoint();
        cp.window_size = 10;
        assert!(matches!(cp.restore(), Err(CheckpointError::Shape(10))));
    }

    #[test]
    fn test_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("wh_stock_001-stock_level.json");
        let cp = checkpoint();
        save_to_disk(&cp, &path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = load_from_disk(&path).unwrap();
        assert_eq!(loaded.window_size, cp.window_size);
        assert_eq!(loaded.trained_at, cp.trained_at);
        let window = vec![0.7; 12];
        let a = cp.restore().unwrap().reconstruction_error(&window);
        let b = loaded.restore().unwrap().reconstruction_error(&window);
        assert!((a - b).abs() < 1e-12);
    }
}

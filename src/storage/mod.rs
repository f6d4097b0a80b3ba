//! Persistence for readings, alerts and reconstructor checkpoints
//!
//! Components only see the traits in [`persistence`]; `TelemetryEngine`
//! decides which backend sits behind them.

pub mod persistence;
mod sled_store;

pub use persistence::{AlertStore, InMemoryStore, ModelStore, ReadingStore};
pub use sled_store::SledStore;

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Sled database error
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Backend failure without a richer type (poisoned lock, test double)
    #[error("Storage backend error: {0}")]
    Backend(String),
}

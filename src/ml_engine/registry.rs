//! Injectable, concurrency-safe model registry
//!
//! One entry per model key. Each entry pairs a training mutex with an
//! atomically swappable handle:
//! - readers take a snapshot `Arc<H>` without blocking on training
//! - "check handle exists, else train" runs under the per-key mutex, so two
//!   concurrent requests never train the same key twice
//! - a new handle becomes visible in one pointer swap, never half-built

use arc_swap::ArcSwapOption;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

struct RegistryEntry<H> {
    training: Mutex<()>,
    handle: ArcSwapOption<H>,
}

impl<H> RegistryEntry<H> {
    fn new() -> Self {
        Self {
            training: Mutex::new(()),
            handle: ArcSwapOption::empty(),
        }
    }
}

/// String-keyed map of trained handles.
pub struct ModelRegistry<H> {
    entries: RwLock<HashMap<String, Arc<RegistryEntry<H>>>>,
}

impl<H> Default for ModelRegistry<H> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<H> ModelRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<RegistryEntry<H>> {
        if let Some(entry) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(entry);
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            entries
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(RegistryEntry::new())),
        )
    }

    /// Current handle, if any. Never blocks on training.
    pub fn get(&self, key: &str) -> Option<Arc<H>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .and_then(|entry| entry.handle.load_full())
    }

    /// Publish a handle, replacing any previous one.
    pub fn install(&self, key: &str, handle: Arc<H>) {
        self.entry(key).handle.store(Some(handle));
    }

    /// Run `f` while holding the key's training lock.
    ///
    /// `f` sees the handle current at lock time and returns the handle to
    /// publish (or `None` to leave the entry untouched) plus a result.
    pub fn with_training_lock<R>(
        &self,
        key: &str,
        f: impl FnOnce(Option<Arc<H>>) -> (Option<Arc<H>>, R),
    ) -> R {
        let entry = self.entry(key);
        let _guard = entry.training.lock().unwrap_or_else(PoisonError::into_inner);
        let (replacement, result) = f(entry.handle.load_full());
        if let Some(handle) = replacement {
            entry.handle.store(Some(handle));
        }
        result
    }

    /// Drop the handle for `key`. Returns the removed handle.
    pub fn remove(&self, key: &str) -> Option<Arc<H>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .and_then(|entry| entry.handle.swap(None))
    }

    /// Number of keys holding a handle.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| e.handle.load().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys holding a handle, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, e)| e.handle.load().is_some())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

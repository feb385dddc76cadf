//! Local key-value store.
//!
//! The deliverer is the only writer; readers (console, tests) may query
//! concurrently, so implementations carry their own locking.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Capability the causal deliverer applies writes into.
pub trait KvStore: Send + Sync {
    fn put(&self, key: &str, value: &str);

    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory store behind a reader-writer lock.
#[derive(Debug, Default)]
pub struct MemKv {
    entries: RwLock<HashMap<String, String>>,
}

impl MemKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of all entries, for convergence checks.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries.read().clone()
    }
}

impl KvStore for MemKv {
    fn put(&self, key: &str, value: &str) {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }
}

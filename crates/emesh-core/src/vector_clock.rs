//! Vector clocks for causal delivery.
//!
//! `vc[id]` counts the messages from `id` that the clock's owner has causally
//! observed: delivered, or for its own identity, sent. Absent entries are
//! implicitly zero and entries never decrease.

use crate::node_id::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum number of distinct identities a clock may carry on the wire.
pub const MAX_NODES: usize = 32;

/// A mapping from node identity to a monotonically increasing counter.
///
/// Cloning produces an independent snapshot; later mutation of either copy
/// does not affect the other.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    entries: BTreeMap<NodeId, u64>,
}

impl VectorClock {
    /// Create an empty clock.
    pub fn new() -> Self {
        VectorClock {
            entries: BTreeMap::new(),
        }
    }

    /// Create a clock from `(identity, counter)` pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (NodeId, u64)>) -> Self {
        VectorClock {
            entries: entries.into_iter().collect(),
        }
    }

    /// Counter for `id`, zero when absent.
    pub fn get(&self, id: &str) -> u64 {
        self.entries.get(id).copied().unwrap_or(0)
    }

    /// Raise the entry for `id` to at least `counter`.
    pub fn observe(&mut self, id: NodeId, counter: u64) {
        let entry = self.entries.entry(id).or_insert(0);
        *entry = (*entry).max(counter);
    }

    /// Increment the entry for `id`, returning the new value.
    pub fn increment(&mut self, id: &NodeId) -> u64 {
        let entry = self.entries.entry(id.clone()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Component-wise maximum with another clock.
    pub fn merge(&mut self, other: &VectorClock) {
        for (id, &counter) in &other.entries {
            let current = self.entries.entry(id.clone()).or_insert(0);
            *current = (*current).max(counter);
        }
    }

    /// Create a merged clock without modifying self.
    pub fn merged_with(&self, other: &VectorClock) -> VectorClock {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// True if for every identity, `self[id] >= other[id]`.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        other
            .entries
            .iter()
            .all(|(id, &counter)| self.get(id.as_str()) >= counter)
    }

    /// True if self causally precedes `other`.
    pub fn happened_before(&self, other: &VectorClock) -> bool {
        other.dominates(self) && !self.dominates(other)
    }

    /// Check if two clocks are concurrent (neither dominates the other).
    pub fn is_concurrent_with(&self, other: &VectorClock) -> bool {
        !self.dominates(other) && !other.dominates(self)
    }

    /// Iterate entries in ascending identity order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, u64)> {
        self.entries.iter().map(|(id, &counter)| (id, counter))
    }

    /// Number of identities tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (id, counter)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}:{}", id, counter)?;
        }
        f.write_str("}")
    }
}

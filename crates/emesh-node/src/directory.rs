//! Known peer addresses.
//!
//! Peers enter the directory two ways: statically, as a bare address from
//! configuration, or by address learning when a datagram arrives carrying a
//! sender identity. Once an identity is learned for a static address the
//! anonymous entry is dropped, so every address appears once.

use emesh_core::NodeId;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::net::SocketAddr;

/// One fan-out destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerTarget {
    /// Identity, if learned.
    pub id: Option<NodeId>,
    pub addr: SocketAddr,
}

impl fmt::Display for PeerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} @ {}", id, self.addr),
            None => write!(f, "? @ {}", self.addr),
        }
    }
}

#[derive(Debug, Default)]
pub struct PeerDirectory {
    named: HashMap<NodeId, SocketAddr>,
    anonymous: BTreeSet<SocketAddr>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configured address whose identity is not known yet.
    pub fn add_static(&mut self, addr: SocketAddr) {
        if !self.named.values().any(|known| *known == addr) {
            self.anonymous.insert(addr);
        }
    }

    /// Record that `id` was seen at `addr`.
    ///
    /// Returns `true` if this changed the directory.
    pub fn learn(&mut self, id: NodeId, addr: SocketAddr) -> bool {
        let replaced_anonymous = self.anonymous.remove(&addr);
        let previous = self.named.insert(id, addr);
        replaced_anonymous || previous != Some(addr)
    }

    pub fn address_of(&self, id: &NodeId) -> Option<SocketAddr> {
        self.named.get(id).copied()
    }

    /// Every destination, ordered by address, one entry per address.
    pub fn targets(&self) -> Vec<PeerTarget> {
        let mut by_addr: BTreeMap<SocketAddr, Option<NodeId>> = self
            .anonymous
            .iter()
            .map(|addr| (*addr, None))
            .collect();

        for (id, addr) in &self.named {
            // two identities claiming one address: keep the smaller id
            let slot = by_addr.entry(*addr).or_insert(None);
            if !slot.as_ref().is_some_and(|existing| existing <= id) {
                *slot = Some(id.clone());
            }
        }

        by_addr
            .into_iter()
            .map(|(addr, id)| PeerTarget { id, addr })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.targets().len()
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.anonymous.is_empty()
    }
}

//! EventMesh node
//!
//! A [`BroadcastNode`] is one participant in the mesh. It stamps local writes
//! with its vector clock, fans them out to every known peer over a datagram
//! [`Transport`], and feeds everything it receives into its
//! [`CausalDeliverer`](emesh_delivery::CausalDeliverer).
//!
//! # Modules
//!
//! - [`node`] - broadcast and receive orchestration
//! - [`transport`] - the transport seam and the UDP implementation
//! - [`memory`] - in-process datagram network for tests and simulation
//! - [`registry`] - transport lookup by node identity
//! - [`directory`] - known peer addresses and address learning
//! - [`config`] - node configuration
//! - [`console`] - the `put`/`get` command surface
//! - [`metrics`] - per-node transport metrics
//! - [`error`] - error types

pub mod config;
pub mod console;
pub mod directory;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod node;
pub mod registry;
pub mod transport;

pub use config::{NodeConfig, NodeConfigBuilder};
pub use console::{ConsoleCommand, ParseError};
pub use directory::{PeerDirectory, PeerTarget};
pub use error::{NodeError, Result, TransportError};
pub use memory::{MemoryNetwork, MemoryTransport, ReleaseOrder};
pub use metrics::NodeMetrics;
pub use node::BroadcastNode;
pub use registry::PeerRegistry;
pub use transport::{Datagram, Transport, UdpTransport};

pub use emesh_core::{KvStore, MemKv, NodeId, VectorClock, MAX_NODES};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::NodeConfig;
    pub use crate::error::NodeError;
    pub use crate::node::BroadcastNode;
    pub use crate::transport::Transport;
    pub use emesh_core::{KvStore, MemKv, NodeId};
}

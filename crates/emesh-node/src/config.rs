//! Node configuration.

use emesh_core::NodeId;
use std::net::{Ipv4Addr, SocketAddr};

/// Default UDP listen address.
pub const DEFAULT_BIND: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    9000,
);

/// Largest possible UDP payload.
pub const DEFAULT_RECV_BUFFER: usize = 65536;

/// Configuration for a [`BroadcastNode`](crate::node::BroadcastNode).
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub id: NodeId,
    /// Local UDP address to listen on.
    pub bind_addr: SocketAddr,
    /// Static peers as `host:port`, resolved when the node starts.
    pub peers: Vec<String>,
    /// Receive buffer per datagram, in bytes.
    pub recv_buffer_size: usize,
}

impl NodeConfig {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            bind_addr: DEFAULT_BIND,
            peers: Vec::new(),
            recv_buffer_size: DEFAULT_RECV_BUFFER,
        }
    }

    pub fn builder(id: NodeId) -> NodeConfigBuilder {
        NodeConfigBuilder::new(id)
    }
}

/// Builder for node configuration.
pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn new(id: NodeId) -> Self {
        Self {
            config: NodeConfig::new(id),
        }
    }

    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Add peers from a comma-separated `host:port` list.
    pub fn peers(mut self, list: &str) -> Self {
        self.config.peers.extend(
            list.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from),
        );
        self
    }

    pub fn peer(mut self, addr: impl Into<String>) -> Self {
        self.config.peers.push(addr.into());
        self
    }

    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.config.recv_buffer_size = size;
        self
    }

    pub fn build(self) -> NodeConfig {
        self.config
    }
}

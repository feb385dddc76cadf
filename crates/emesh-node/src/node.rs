//! Broadcast and receive orchestration.

use crate::config::NodeConfig;
use crate::directory::{PeerDirectory, PeerTarget};
use crate::error::{NodeError, Result, TransportError};
use crate::metrics::NodeMetrics;
use crate::registry::PeerRegistry;
use crate::transport::{Datagram, Transport, UdpTransport};
use emesh_core::{KvStore, NodeId, VectorClock};
use emesh_delivery::{CausalDeliverer, DelivererMetrics};
use emesh_protocol::Command;
use parking_lot::{Mutex, RwLock};
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One participant in the mesh.
///
/// Local writes are stamped and self-delivered first, then sent to every
/// known peer. A background task feeds inbound datagrams to the deliverer
/// until the transport is closed or fails.
pub struct BroadcastNode {
    id: NodeId,
    transport: Arc<dyn Transport>,
    registry: PeerRegistry,
    directory: RwLock<PeerDirectory>,
    deliverer: CausalDeliverer,
    metrics: NodeMetrics,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl BroadcastNode {
    /// Bind a UDP socket from `config`, start receiving and dial the
    /// configured peers.
    pub async fn bind(
        config: NodeConfig,
        store: Arc<dyn KvStore>,
        registry: &Registry,
    ) -> Result<Arc<Self>> {
        let transport = UdpTransport::bind(config.bind_addr, config.recv_buffer_size)
            .await
            .map_err(|source| NodeError::Bind {
                addr: config.bind_addr,
                source,
            })?;

        let node = Self::start(config.id, Arc::new(transport), store, registry)?;
        for peer in &config.peers {
            if let Err(e) = node.add_peer(peer).await {
                node.shutdown().await?;
                return Err(e);
            }
        }
        Ok(node)
    }

    /// Start a node over an existing transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        id: NodeId,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KvStore>,
        registry: &Registry,
    ) -> Result<Arc<Self>> {
        let deliverer_metrics = DelivererMetrics::register(registry, &id)?;
        let metrics = NodeMetrics::register(registry, &id)?;

        let node = Arc::new(Self {
            deliverer: CausalDeliverer::new(id.clone(), store, deliverer_metrics),
            registry: PeerRegistry::new(Arc::clone(&transport)),
            directory: RwLock::new(PeerDirectory::new()),
            recv_task: Mutex::new(None),
            id,
            transport,
            metrics,
        });

        let task = tokio::spawn(Self::receive_loop(
            Arc::downgrade(&node),
            Arc::clone(&node.transport),
            node.id.clone(),
        ));
        *node.recv_task.lock() = Some(task);

        info!(node = %node.id, addr = %node.local_addr(), "node started");
        Ok(node)
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        self.deliverer.store()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.store().get(key)
    }

    pub fn clock(&self) -> VectorClock {
        self.deliverer.copy_clock()
    }

    pub fn pending_len(&self) -> usize {
        self.deliverer.pending_len()
    }

    pub fn peers(&self) -> Vec<PeerTarget> {
        self.directory.read().targets()
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn deliverer(&self) -> &CausalDeliverer {
        &self.deliverer
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }

    /// Whether the receive loop is still running.
    pub fn is_receiving(&self) -> bool {
        self.recv_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Add every peer in a comma-separated `host:port` list.
    ///
    /// Empty entries are skipped. Returns the number of peers added.
    pub async fn dial_peers(&self, list: &str) -> Result<usize> {
        let mut added = 0;
        for peer in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            self.add_peer(peer).await?;
            added += 1;
        }
        Ok(added)
    }

    /// Resolve `peer` and add it as a static fan-out target.
    pub async fn add_peer(&self, peer: &str) -> Result<SocketAddr> {
        let invalid = |reason: String| NodeError::InvalidPeer {
            addr: peer.to_string(),
            reason,
        };

        let candidates: Vec<SocketAddr> = tokio::net::lookup_host(peer)
            .await
            .map_err(|e| invalid(e.to_string()))?
            .collect();

        // prefer the address family our socket can reach
        let local_v4 = self.local_addr().is_ipv4();
        let addr = candidates
            .iter()
            .find(|a| a.is_ipv4() == local_v4)
            .or_else(|| candidates.first())
            .copied()
            .ok_or_else(|| invalid("no addresses found".to_string()))?;

        self.directory.write().add_static(addr);
        info!(node = %self.id, peer = %addr, "added static peer");
        Ok(addr)
    }

    /// Write `key = value` locally and broadcast it to every known peer.
    ///
    /// Per-peer send failures are logged and counted; they never fail the
    /// call. Errors are returned only for an invalid key or a clock too
    /// large to encode, in which case nothing was applied or sent.
    pub async fn broadcast_put(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;

        let message = self
            .deliverer
            .originate(Command::put(key, value).to_payload())?;
        debug!(node = %self.id, key, clock = %message.clock(), "originated write");

        let targets = self.directory.read().targets();
        for target in targets {
            let transport = self.registry.route_for(target.id.as_ref());
            match transport.send(target.addr, &message).await {
                Ok(()) => self.metrics.sent.inc(),
                Err(e) => {
                    self.metrics.send_failures.inc();
                    warn!(node = %self.id, peer = %target, error = %e, "send failed");
                }
            }
        }
        Ok(())
    }

    /// Close the transport and wait for the receive loop to exit.
    ///
    /// Messages still waiting on dependencies are discarded.
    pub async fn shutdown(&self) -> Result<()> {
        self.transport.close().await?;

        let task = self.recv_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(node = %self.id, error = %e, "receive task failed");
            }
        }

        let pending = self.deliverer.pending_len();
        info!(node = %self.id, discarded = pending, "node stopped");
        Ok(())
    }

    async fn receive_loop(node: Weak<Self>, transport: Arc<dyn Transport>, id: NodeId) {
        loop {
            match transport.receive().await {
                Ok(datagram) => match node.upgrade() {
                    Some(node) => node.accept(datagram),
                    None => break,
                },
                Err(TransportError::Decode { from, error }) => {
                    if let Some(node) = node.upgrade() {
                        node.metrics.decode_failures.inc();
                    }
                    warn!(node = %id, peer = %from, error = %error, "dropping malformed datagram");
                }
                Err(TransportError::Closed) => {
                    info!(node = %id, "receive loop closed");
                    break;
                }
                Err(e) => {
                    error!(node = %id, error = %e, "receive failed, no longer accepting messages");
                    break;
                }
            }
        }
    }

    fn accept(&self, datagram: Datagram) {
        self.metrics.received.inc();
        let Datagram { message, source } = datagram;

        let sender = message.sender().clone();
        if sender == self.id {
            debug!(node = %self.id, peer = %source, "ignoring loopback datagram");
            return;
        }

        if self.directory.write().learn(sender.clone(), source) {
            info!(node = %self.id, peer = %sender, addr = %source, "learned peer address");
        }
        self.deliverer.submit(message);
    }
}

impl std::fmt::Debug for BroadcastNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastNode")
            .field("id", &self.id)
            .field("addr", &self.local_addr())
            .field("deliverer", &self.deliverer)
            .finish()
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains(':') {
        return Err(NodeError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNetwork;
    use emesh_core::MemKv;

    fn start(network: &MemoryNetwork, name: &str, registry: &Registry) -> Arc<BroadcastNode> {
        BroadcastNode::start(
            NodeId::new(name).unwrap(),
            Arc::new(network.bind()),
            Arc::new(MemKv::new()),
            registry,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("x").is_ok());
        assert!(validate_key("user.name").is_ok());
        assert!(matches!(validate_key(""), Err(NodeError::InvalidKey(_))));
        assert!(matches!(validate_key("a:b"), Err(NodeError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_local_write_without_peers() {
        let network = MemoryNetwork::new();
        let registry = Registry::new();
        let node = start(&network, "A", &registry);

        node.broadcast_put("x", "a:b c").await.unwrap();
        assert_eq!(node.get("x").as_deref(), Some("a:b c"));
        assert_eq!(node.clock().get("A"), 1);
        assert_eq!(node.metrics().sent(), 0);

        node.shutdown().await.unwrap();
        assert!(!node.is_receiving());
    }

    #[tokio::test]
    async fn test_same_id_twice_in_one_registry() {
        let network = MemoryNetwork::new();
        let registry = Registry::new();
        let _a = start(&network, "A", &registry);

        let result = BroadcastNode::start(
            NodeId::new("A").unwrap(),
            Arc::new(network.bind()),
            Arc::new(MemKv::new()),
            &registry,
        );
        assert!(matches!(result, Err(NodeError::Metrics(_))));
    }

    #[tokio::test]
    async fn test_dial_peers() {
        let network = MemoryNetwork::new();
        let registry = Registry::new();
        let node = start(&network, "A", &registry);

        let added = node
            .dial_peers("127.0.0.1:9101, ,127.0.0.1:9102,")
            .await
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(node.peers().len(), 2);

        assert!(matches!(
            node.dial_peers("not an address").await,
            Err(NodeError::InvalidPeer { .. })
        ));
    }
}

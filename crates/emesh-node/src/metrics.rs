//! Per-node transport metrics.

use emesh_core::NodeId;
use prometheus::{IntCounter, Opts, Registry};

#[derive(Clone)]
pub struct NodeMetrics {
    pub(crate) sent: IntCounter,
    pub(crate) send_failures: IntCounter,
    pub(crate) received: IntCounter,
    pub(crate) decode_failures: IntCounter,
}

impl NodeMetrics {
    pub fn new(node: &NodeId) -> prometheus::Result<Self> {
        let counter = |name: &str, help: &str| {
            IntCounter::with_opts(Opts::new(name, help).const_label("node", node.as_str()))
        };

        Ok(Self {
            sent: counter("emesh_datagrams_sent_total", "Datagrams handed to a transport")?,
            send_failures: counter("emesh_send_failures_total", "Per-peer send errors")?,
            received: counter(
                "emesh_datagrams_received_total",
                "Datagrams received and decoded",
            )?,
            decode_failures: counter(
                "emesh_decode_failures_total",
                "Malformed datagrams dropped by the receive loop",
            )?,
        })
    }

    pub fn register(registry: &Registry, node: &NodeId) -> prometheus::Result<Self> {
        let metrics = Self::new(node)?;
        registry.register(Box::new(metrics.sent.clone()))?;
        registry.register(Box::new(metrics.send_failures.clone()))?;
        registry.register(Box::new(metrics.received.clone()))?;
        registry.register(Box::new(metrics.decode_failures.clone()))?;
        Ok(metrics)
    }

    pub fn sent(&self) -> u64 {
        self.sent.get()
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures.get()
    }

    pub fn received(&self) -> u64 {
        self.received.get()
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.get()
    }
}

impl std::fmt::Debug for NodeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMetrics")
            .field("sent", &self.sent())
            .field("send_failures", &self.send_failures())
            .field("received", &self.received())
            .field("decode_failures", &self.decode_failures())
            .finish()
    }
}

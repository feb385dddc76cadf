//! Per-deliverer metrics.
//!
//! Handles are owned by the deliverer instance and registered into a
//! caller-supplied registry with a constant `node` label, so several nodes
//! can share one process without colliding.

use emesh_core::NodeId;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};

const REORDER_BUCKETS: [f64; 7] = [0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0];

#[derive(Clone)]
pub struct DelivererMetrics {
    pub(crate) recv_bytes: IntCounter,
    pub(crate) reorder_depth: Histogram,
    pub(crate) deliver_lag_ms: Histogram,
    pub(crate) delivered: IntCounter,
    pub(crate) discarded: IntCounter,
    pub(crate) pending: IntGauge,
}

impl DelivererMetrics {
    /// Create metric handles without registering them anywhere.
    pub fn new(node: &NodeId) -> prometheus::Result<Self> {
        let node = node.as_str();

        Ok(Self {
            recv_bytes: IntCounter::with_opts(
                Opts::new("emesh_recv_bytes_total", "Total bytes submitted for delivery")
                    .const_label("node", node),
            )?,
            reorder_depth: Histogram::with_opts(
                HistogramOpts::new(
                    "emesh_reorder_depth",
                    "Entries queued behind a message when it was delivered",
                )
                .const_label("node", node)
                .buckets(REORDER_BUCKETS.to_vec()),
            )?,
            deliver_lag_ms: Histogram::with_opts(
                HistogramOpts::new(
                    "emesh_deliver_lag_ms",
                    "Time messages spend in reorder buffer (ms)",
                )
                .const_label("node", node),
            )?,
            delivered: IntCounter::with_opts(
                Opts::new("emesh_delivered_total", "Messages applied in causal order")
                    .const_label("node", node),
            )?,
            discarded: IntCounter::with_opts(
                Opts::new(
                    "emesh_stale_discarded_total",
                    "Already-delivered messages dropped from the reorder buffer",
                )
                .const_label("node", node),
            )?,
            pending: IntGauge::with_opts(
                Opts::new("emesh_pending_messages", "Messages waiting on causal dependencies")
                    .const_label("node", node),
            )?,
        })
    }

    /// Create metric handles and register them into `registry`.
    pub fn register(registry: &Registry, node: &NodeId) -> prometheus::Result<Self> {
        let metrics = Self::new(node)?;
        registry.register(Box::new(metrics.recv_bytes.clone()))?;
        registry.register(Box::new(metrics.reorder_depth.clone()))?;
        registry.register(Box::new(metrics.deliver_lag_ms.clone()))?;
        registry.register(Box::new(metrics.delivered.clone()))?;
        registry.register(Box::new(metrics.discarded.clone()))?;
        registry.register(Box::new(metrics.pending.clone()))?;
        Ok(metrics)
    }

    pub fn recv_bytes(&self) -> u64 {
        self.recv_bytes.get()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.get()
    }

    pub fn discarded(&self) -> u64 {
        self.discarded.get()
    }

    pub fn pending(&self) -> i64 {
        self.pending.get()
    }

    pub fn reorder_samples(&self) -> u64 {
        self.reorder_depth.get_sample_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_nodes_share_a_registry() {
        let registry = Registry::new();
        DelivererMetrics::register(&registry, &NodeId::new("a").unwrap()).unwrap();
        DelivererMetrics::register(&registry, &NodeId::new("b").unwrap()).unwrap();

        let families = registry.gather();
        let names: Vec<_> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"emesh_reorder_depth".to_string()));
        assert!(names.contains(&"emesh_deliver_lag_ms".to_string()));

        let lag = families
            .iter()
            .find(|f| f.get_name() == "emesh_deliver_lag_ms")
            .unwrap();
        assert_eq!(lag.get_metric().len(), 2);
    }

    #[test]
    fn test_same_node_twice_is_rejected() {
        let registry = Registry::new();
        let id = NodeId::new("a").unwrap();
        DelivererMetrics::register(&registry, &id).unwrap();
        assert!(DelivererMetrics::register(&registry, &id).is_err());
    }
}

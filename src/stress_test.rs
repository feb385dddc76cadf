use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use async_stream::stream;
use clap::Args;
use emesh_node::{BroadcastNode, MemKv, MemoryNetwork, NodeId, ReleaseOrder, MAX_NODES};
use futures::stream::{Stream, StreamExt};
use prometheus::Registry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Args, Clone, Debug)]
pub struct StressArgs {
    /// Number of in-process nodes, 1 to 32
    #[arg(long, default_value_t = 5)]
    pub nodes: usize,

    /// Total writes across all nodes
    #[arg(long, default_value_t = 500)]
    pub writes: usize,

    /// Writes issued between network releases
    #[arg(long, default_value_t = 50)]
    pub batch: usize,

    /// Fraction of datagrams dropped, from 0.0 to 1.0
    #[arg(long, default_value_t = 0.0)]
    pub loss: f64,

    /// Seed for write placement, loss and release order
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Seconds to wait for replicas to converge
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,
}

/// Statistics collected during a stress run
#[derive(Clone, Debug)]
pub struct StressTestStats {
    pub num_nodes: usize,
    pub total_writes: usize,
    pub datagrams_sent: u64,
    pub datagrams_dropped: usize,
    pub max_pending: usize,
    pub write_time: Duration,
    pub converge_time: Duration,
    pub converged: bool,
    pub writes_per_second: f64,
}

impl StressTestStats {
    pub fn print(&self) {
        let converged = if self.converged { "yes" } else { "NO" };
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Stress Test Statistics                        ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Nodes:                     {:>30} ║", self.num_nodes);
        println!("║  Writes:                    {:>30} ║", self.total_writes);
        println!("║  Datagrams Sent:            {:>30} ║", self.datagrams_sent);
        println!("║  Datagrams Dropped:         {:>30} ║", self.datagrams_dropped);
        println!("║  Max Pending (any node):    {:>30} ║", self.max_pending);
        println!("║  Write Time:                {:>29}s ║", format!("{:.3}", self.write_time.as_secs_f64()));
        println!("║  Converge Time:             {:>29}s ║", format!("{:.3}", self.converge_time.as_secs_f64()));
        println!("║  Writes/Second:             {:>30.0} ║", self.writes_per_second);
        println!("║  Converged:                 {:>30} ║", converged);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

/// Generator that yields the index of the node issuing each write
fn write_generator(num_nodes: usize, num_writes: usize, seed: u64) -> impl Stream<Item = usize> {
    stream! {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..num_writes {
            yield rng.gen_range(0..num_nodes);
        }
    }
}

struct Replica {
    node: Arc<BroadcastNode>,
    store: Arc<MemKv>,
}

/// Start `num_nodes` nodes that all know each other's addresses.
async fn start_mesh(network: &MemoryNetwork, num_nodes: usize) -> Result<Vec<Replica>> {
    let registry = Registry::new();
    let mut replicas = Vec::with_capacity(num_nodes);
    for i in 0..num_nodes {
        let id = NodeId::new(format!("node-{}", i))?;
        let store = Arc::new(MemKv::new());
        let node = BroadcastNode::start(id, Arc::new(network.bind()), store.clone(), &registry)?;
        replicas.push(Replica { node, store });
    }

    for replica in &replicas {
        for other in &replicas {
            if other.node.id() != replica.node.id() {
                replica
                    .node
                    .add_peer(&other.node.local_addr().to_string())
                    .await?;
            }
        }
    }
    Ok(replicas)
}

/// Every replica has applied every write and agrees on clock and contents.
fn is_converged(replicas: &[Replica], expected: &HashMap<usize, u64>) -> bool {
    let Some(first) = replicas.first() else {
        return true;
    };
    let reference = first.store.snapshot();

    replicas.iter().all(|replica| {
        let clock = replica.node.clock();
        replica.node.pending_len() == 0
            && expected
                .iter()
                .all(|(i, n)| clock.get(replicas[*i].node.id().as_str()) == *n)
            && replica.store.snapshot() == reference
    })
}

pub async fn run(args: StressArgs) -> Result<StressTestStats> {
    ensure!(
        (1..=MAX_NODES).contains(&args.nodes),
        "--nodes must be between 1 and {}, got {}",
        MAX_NODES,
        args.nodes
    );

    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        EventMesh Stress Test (in-memory network)           ║");
    println!(
        "║  Nodes: {} | Writes: {} | Loss: {:.2} | Seed: {}",
        args.nodes, args.writes, args.loss, args.seed
    );
    println!("╚════════════════════════════════════════════════════════════╝");

    let network = MemoryNetwork::with_seed(args.seed);
    network.set_loss_rate(args.loss);
    let replicas = start_mesh(&network, args.nodes)
        .await
        .context("failed to start nodes")?;

    println!("\n[Phase 1/2] Issuing writes...");
    let start = Instant::now();
    let mut expected: HashMap<usize, u64> = HashMap::new();
    let mut max_pending = 0;

    let mut batches = Box::pin(write_generator(args.nodes, args.writes, args.seed).chunks(args.batch.max(1)));
    let mut batch_no = 0u64;
    while let Some(batch) = batches.next().await {
        network.hold();

        let writes = futures::future::join_all(batch.into_iter().map(|i| {
            let seq = expected.entry(i).or_insert(0);
            *seq += 1;
            let key = format!("node-{}-{}", i, seq);
            let node = Arc::clone(&replicas[i].node);
            async move { node.broadcast_put(&key, "v").await }
        }))
        .await;
        for result in writes {
            result?;
        }

        network.release(ReleaseOrder::Shuffled(args.seed.wrapping_add(batch_no)));
        batch_no += 1;
        tokio::task::yield_now().await;

        let pending = replicas.iter().map(|r| r.node.pending_len()).max().unwrap_or(0);
        max_pending = max_pending.max(pending);
    }
    let write_time = start.elapsed();
    println!("[Phase 1/2] ✓ Completed");

    println!("[Phase 2/2] Waiting for convergence...");
    let converge_start = Instant::now();
    let deadline = Duration::from_secs(args.timeout);
    let mut converged = is_converged(&replicas, &expected);
    while !converged && converge_start.elapsed() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
        for replica in &replicas {
            max_pending = max_pending.max(replica.node.pending_len());
        }
        converged = is_converged(&replicas, &expected);
    }
    let converge_time = converge_start.elapsed();
    if converged {
        println!("[Phase 2/2] ✓ Completed");
    } else {
        println!("[Phase 2/2] ✗ Replicas did not converge");
    }

    let datagrams_sent = replicas.iter().map(|r| r.node.metrics().sent()).sum();
    for replica in &replicas {
        replica.node.shutdown().await?;
    }

    Ok(StressTestStats {
        num_nodes: args.nodes,
        total_writes: args.writes,
        datagrams_sent,
        datagrams_dropped: network.dropped_count(),
        max_pending,
        write_time,
        converge_time,
        converged,
        writes_per_second: args.writes as f64 / write_time.as_secs_f64().max(f64::EPSILON),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(nodes: usize, writes: usize, loss: f64) -> StressArgs {
        StressArgs {
            nodes,
            writes,
            batch: 10,
            loss,
            seed: 7,
            timeout: 5,
        }
    }

    #[tokio::test]
    async fn test_lossless_run_converges() {
        let stats = run(args(4, 80, 0.0)).await.unwrap();
        assert!(stats.converged);
        assert_eq!(stats.datagrams_sent, 80 * 3);
        assert_eq!(stats.datagrams_dropped, 0);
    }

    #[tokio::test]
    async fn test_node_count_out_of_range() {
        for nodes in [0, MAX_NODES + 1] {
            let err = run(args(nodes, 5, 0.0)).await.unwrap_err();
            assert!(err.to_string().contains("--nodes"), "{}", err);
        }
    }

    #[tokio::test]
    async fn test_total_loss_does_not_converge() {
        let stats = run(StressArgs {
            timeout: 0,
            ..args(3, 10, 1.0)
        })
        .await
        .unwrap();
        assert!(!stats.converged);
        assert_eq!(stats.datagrams_dropped, 20);
    }
}

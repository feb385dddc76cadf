//! # emesh
//!
//! Runs one EventMesh node with an interactive console, or an in-process
//! stress simulation of many nodes.
//!
//! ```text
//! emesh run --id A --bind 0.0.0.0:9000 --peers 10.0.0.2:9000,10.0.0.3:9000
//! emesh stress --nodes 8 --writes 200
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use clap::{Args, Parser, Subcommand};
use colored::*;
use emesh_node::console::{self, ConsoleCommand, ParseError};
use emesh_node::{BroadcastNode, MemKv, NodeConfig, NodeId};
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod stress_test;

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "emesh")]
#[command(about = "Causal broadcast of key-value writes over UDP")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node with an interactive put/get console
    Run(RunArgs),
    /// Simulate many nodes on an in-memory lossy, reordering network
    Stress(stress_test::StressArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Node identity, at most 16 bytes
    #[arg(long, env = "EMESH_ID")]
    id: String,

    /// UDP address to listen on
    #[arg(long, env = "EMESH_BIND", default_value = "0.0.0.0:9000")]
    bind: SocketAddr,

    /// Comma-separated host:port list of static peers
    #[arg(long, env = "EMESH_PEERS", default_value = "")]
    peers: String,

    /// Address of the Prometheus /metrics endpoint
    #[arg(long, env = "EMESH_METRICS_ADDR", default_value = "0.0.0.0:6060")]
    metrics_addr: SocketAddr,

    /// Do not serve metrics
    #[arg(long)]
    no_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Run(args) => run(args).await,
        Commands::Stress(args) => {
            stress_test::run(args).await?.print();
            Ok(())
        }
    }
}

// ─── Node ──────────────────────────────────────────────────────────────────

async fn run(args: RunArgs) -> Result<()> {
    let id = NodeId::new(args.id.as_str()).with_context(|| format!("invalid node id {:?}", args.id))?;
    let config = NodeConfig::builder(id)
        .bind_addr(args.bind)
        .peers(&args.peers)
        .build();

    let registry = Registry::new();
    let node = BroadcastNode::bind(config, Arc::new(MemKv::new()), &registry)
        .await
        .context("failed to start node")?;

    if !args.no_metrics {
        if let Err(e) = serve_metrics(args.metrics_addr, registry.clone()).await {
            node.shutdown().await.context("shutdown failed")?;
            return Err(e);
        }
    }

    println!(
        "{} node {} listening on {} ({} peers)",
        "▸".bright_yellow(),
        node.id().to_string().bold(),
        node.local_addr(),
        node.peers().len()
    );
    println!("  type {} for commands", "help".bright_cyan());

    let stdin = BufReader::new(tokio::io::stdin());
    serve_until_done(&node, console_loop(&node, stdin)).await
}

/// Wait for the console to finish or ctrl-c, then shut the node down.
///
/// Console failures are logged; the node is shut down either way.
async fn serve_until_done(
    node: &BroadcastNode,
    console: impl Future<Output = Result<()>>,
) -> Result<()> {
    tokio::select! {
        result = console => {
            if let Err(e) = result {
                error!(error = %e, "console failed");
            }
        }
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    node.shutdown().await.context("shutdown failed")?;
    Ok(())
}

/// Read commands until `quit`, or until ctrl-c after end of input.
async fn console_loop<R>(node: &BroadcastNode, input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let command = match ConsoleCommand::parse(&line) {
            Ok(command) => command,
            Err(ParseError::Empty) => continue,
            Err(e) => {
                println!("{} {}", "✗".bright_red().bold(), e);
                continue;
            }
        };

        match console::execute(node, &command).await {
            Ok(output) => println!("{}", output),
            Err(e) => println!("{} {}", "✗".bright_red().bold(), e),
        }
        if command == ConsoleCommand::Quit {
            return Ok(());
        }
    }

    // stdin closed, e.g. running under a supervisor: keep serving
    info!("console input closed, press ctrl-c to stop");
    std::future::pending::<()>().await;
    Ok(())
}

// ─── Metrics ───────────────────────────────────────────────────────────────

/// Bind the metrics listener and serve it in the background.
async fn serve_metrics(addr: SocketAddr, registry: Registry) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics endpoint {}", addr))?;
    info!(addr = %addr, "serving metrics");

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "metrics endpoint stopped");
        }
    });
    Ok(())
}

async fn metrics_handler(State(registry): State<Registry>) -> (StatusCode, String) {
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buf) {
        warn!(error = %e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }
    match String::from_utf8(buf) {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

//! ---
//! c2_section: "01-core-functionality"
//! c2_subsection: "binary"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Binary entrypoint for the scan node daemon."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use r_c2_common::config::{AppConfig, NodeConfig};
use r_c2_common::logging::init_tracing;
use r_c2_core::{NodeRuntime, ScanStateMachine, TimedScan};
use r_c2_metrics::{new_registry, spawn_http_server, NodeMetrics, ProcessMetrics};
use r_c2_msg::{LinkMetricsExporter, MessageLink, PeerIdentity, UdpTransport};
use r_c2_rt::TaskGroup;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

const SERVICE: &str = "r-c2-node";

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("R-C2 node ", env!("CARGO_PKG_VERSION")),
    about = "R-C2 scan node",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the node loop until interrupted")]
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/r-c2.toml"));
    candidates.push(PathBuf::from("configs/example.toml"));

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(&candidates)?;
    let load_duration = load_started.elapsed();
    let config = loaded.config;

    init_tracing(SERVICE, &config.logging)?;
    info!(config_path = %loaded.source.display(), "configuration loaded");

    let registry = new_registry();
    let process_metrics = ProcessMetrics::new(registry.clone(), SERVICE)?;
    process_metrics.observe_config_load(load_duration.as_secs_f64());
    process_metrics.inc_start();
    process_metrics.set_build_info(
        env!("CARGO_PKG_VERSION"),
        if cfg!(debug_assertions) { "debug" } else { "release" },
    );

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_node(config, process_metrics).await,
    }
}

async fn run_node(config: AppConfig, process_metrics: ProcessMetrics) -> Result<()> {
    let registry = process_metrics.registry();
    let metrics_server = if config.metrics.enabled {
        info!(address = %config.metrics.listen, "metrics exporter enabled");
        Some(spawn_http_server(registry.clone(), config.metrics.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let node_metrics = NodeMetrics::new(&registry)?;
    let link_metrics = LinkMetricsExporter::register(&registry)
        .context("failed to register link metrics")?;
    let runtime = build_runtime(&config.node, node_metrics, link_metrics).await?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut tasks = TaskGroup::default();
    tasks.spawn("node-loop", runtime.run(shutdown_rx));

    info!("node running; waiting for termination signal");
    shutdown_signal().await;
    info!("termination signal received; shutting down");
    let _ = shutdown_tx.send(());
    tasks.join().await?;

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    Ok(())
}

async fn build_runtime(
    node: &NodeConfig,
    node_metrics: NodeMetrics,
    link_metrics: LinkMetricsExporter,
) -> Result<NodeRuntime> {
    let transport = UdpTransport::bind(node.bind, node.peer)
        .await
        .with_context(|| format!("failed to bind node socket {}", node.bind))?;
    let link = MessageLink::new(Arc::new(transport)).with_exporter(link_metrics);
    let machine = ScanStateMachine::new(Arc::new(TimedScan::new(node.scan_tick)))
        .with_metrics(node_metrics);
    let identity = PeerIdentity::new(node.system_id, node.component_id);
    Ok(NodeRuntime::new(
        link,
        identity,
        node.heartbeat_interval,
        machine,
    ))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => {
            warn!(?err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use swarm_cluster::config::{DEFAULT_PORT, DEFAULT_WORKDIR, NodeConfig};
use swarm_cluster::membership::types::{NodeRole, NodeStatus};
use swarm_cluster::rpc::handlers::router;
use swarm_cluster::swarm::{Collaborators, Swarm};

/// Runs one swarm node.
#[derive(Parser, Debug)]
#[command(name = "swarm-node", version)]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Hostname other nodes use to reach this one.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Address (`host:port`) of any swarm member to join. Starts a new swarm
    /// when omitted.
    #[arg(long)]
    join: Option<String>,

    #[arg(long, default_value = DEFAULT_WORKDIR)]
    workdir: PathBuf,

    /// worker, client or ephemeral.
    #[arg(long, default_value = "worker")]
    role: NodeRole,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = NodeConfig {
        hostname: args.host,
        port: args.port,
        workdir: args.workdir,
        role: args.role,
        ..NodeConfig::default()
    };
    let collab = Collaborators::http(&config);

    // 1. Membership:
    let swarm = match &args.join {
        Some(addr) => Swarm::join(config, addr, collab).await?,
        None => Swarm::create(config, collab).await?,
    };
    tracing::info!("Node ID: {}", swarm.self_id());

    // 2. Background loops:
    let handles = swarm.start();

    // 3. Stats reporter:
    let stats = swarm.clone();
    let stats_token = swarm.shutdown_token();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = stats_token.cancelled() => break,
                _ = interval.tick() => {}
            }
            let nodes = stats.directory.all();
            let primary = stats.directory.primary_id();
            tracing::info!(
                "Swarm stats: {} nodes, {} queued tasks, {} jobs",
                nodes.len(),
                stats.queue.len(),
                stats.jobs.len()
            );
            for node in nodes {
                tracing::info!(
                    "  - {}{} {} {:?} {} files{}",
                    node.id,
                    if Some(&node.id) == primary.as_ref() { " (primary)" } else { "" },
                    node.connect_addr(),
                    node.role,
                    node.files.len(),
                    if node.status == NodeStatus::Busy { " busy" } else { "" }
                );
            }
        }
    });

    // 4. HTTP server:
    let app = router(swarm.clone());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", swarm.config.port)).await?;
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);
    tracing::info!("Press Ctrl+C to shutdown");

    let shutdown = swarm.shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
            }
            shutdown.cancel();
        })
        .await?;

    leave(&swarm).await;
    for handle in handles {
        let _ = handle.await;
    }
    tracing::info!("Shut down");
    Ok(())
}

/// Tells the primary we are going away. Best effort.
async fn leave(swarm: &Arc<Swarm>) {
    if swarm.directory.is_primary() {
        return;
    }
    let Some(primary) = swarm.directory.primary_node() else {
        return;
    };
    let me = swarm.directory.self_node();
    if let Err(e) = swarm.client_for(&primary).leave_swarm(me).await {
        tracing::warn!("Failed to leave swarm: {}", e);
    }
}

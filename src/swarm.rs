//! Swarm Context
//!
//! [`Swarm`] is the shared state of one node: its view of the membership, the
//! local content store, the task queue, the job pool, the secrets replica and
//! the outbound collaborators. Handlers, background loops and tasks all take
//! an `Arc<Swarm>`.
//!
//! ## Responsibilities
//! - **Bootstrap**: `create` starts a swarm of one, `join` hydrates from an
//!   existing member's snapshot.
//! - **Supervision**: `start` spawns the housekeeping and task drain loops;
//!   every spawned loop observes the shared cancellation token.
//! - **Fan-out**: best-effort delivery of one request to many peers.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::executor::executor::TaskExecutor;
use crate::executor::queue::TaskQueue;
use crate::executor::types::SwarmTask;
use crate::jobs::pool::JobPool;
use crate::jobs::sandbox::{ExecutionSandbox, ProcessSandbox};
use crate::membership::directory::NodeDirectory;
use crate::membership::types::{Node, NodeId};
use crate::rpc::client::NodeClient;
use crate::rpc::protocol::{SwarmRequest, SwarmResponse};
use crate::rpc::transport::{HttpTransport, Transport};
use crate::secrets::store::{FileSecretsStore, SecretsStore};
use crate::secrets::types::SwarmSecrets;
use crate::storage::local::ContentStore;
use crate::storage::sync::{FileFetcher, HttpFetcher};

/// Outbound capabilities a node depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub fetcher: Arc<dyn FileFetcher>,
    pub sandbox: Arc<dyn ExecutionSandbox>,
    pub secrets: Arc<dyn SecretsStore>,
}

impl Collaborators {
    /// HTTP transport and file transfer, local processes, secrets file in the workdir.
    pub fn http(config: &NodeConfig) -> Self {
        Self {
            transport: Arc::new(HttpTransport::new(config.call_timeout())),
            fetcher: Arc::new(HttpFetcher::new()),
            sandbox: Arc::new(ProcessSandbox),
            secrets: Arc::new(FileSecretsStore::new(config.secrets_path())),
        }
    }
}

pub struct Swarm {
    pub config: NodeConfig,
    pub directory: NodeDirectory,
    pub store: ContentStore,
    pub queue: TaskQueue,
    pub jobs: JobPool,
    pub(crate) secrets: Mutex<SwarmSecrets>,
    pub(crate) secrets_store: Arc<dyn SecretsStore>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) fetcher: Arc<dyn FileFetcher>,
    pub(crate) sandbox: Arc<dyn ExecutionSandbox>,
    /// One election at a time.
    pub(crate) failover_gate: Semaphore,
    /// Elections started by this node, for log correlation.
    pub(crate) failover_rounds: AtomicU64,
    shutdown: CancellationToken,
}

impl Swarm {
    async fn build(config: NodeConfig, collab: Collaborators, primary: bool) -> Result<Arc<Self>> {
        tokio::fs::create_dir_all(config.files_dir())
            .await
            .with_context(|| format!("creating {}", config.files_dir().display()))?;
        tokio::fs::create_dir_all(config.scratch_dir()).await?;

        let store = ContentStore::from_config(&config);
        let files = store.files().await?;
        let secrets = collab.secrets.load().await?;

        let mut self_node = Node::new(&config.hostname, config.port, config.role).with_files(files);
        if let Some(id) = &config.node_id {
            self_node.id = NodeId(id.clone());
        }
        let self_id = self_node.id.clone();
        let primary = primary.then(|| self_id.clone());

        tracing::info!(
            node_id = %self_id,
            addr = %self_node.connect_addr(),
            role = ?self_node.role,
            files = self_node.files.len(),
            "Local node initialized"
        );

        Ok(Arc::new(Self {
            directory: NodeDirectory::new(self_node, primary, Vec::new()),
            store,
            queue: TaskQueue::new(),
            jobs: JobPool::new(),
            secrets: Mutex::new(secrets),
            secrets_store: collab.secrets,
            transport: collab.transport,
            fetcher: collab.fetcher,
            sandbox: collab.sandbox,
            failover_gate: Semaphore::new(1),
            failover_rounds: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            config,
        }))
    }

    /// Starts a new swarm with this node as its only member and primary.
    pub async fn create(config: NodeConfig, collab: Collaborators) -> Result<Arc<Self>> {
        let swarm = Self::build(config, collab, true).await?;
        tracing::info!(node_id = %swarm.self_id(), "Created new swarm");
        Ok(swarm)
    }

    /// Joins the swarm that the node at `addr` belongs to.
    pub async fn join(config: NodeConfig, addr: &str, collab: Collaborators) -> Result<Arc<Self>> {
        let swarm = Self::build(config, collab, false).await?;
        let me = swarm.directory.self_node();

        tracing::info!(via = addr, "Joining swarm");
        let snapshot = swarm
            .client(addr)
            .join_swarm(me)
            .await
            .with_context(|| format!("joining swarm via {}", addr))?;

        for node in snapshot.nodes {
            if &node.id != swarm.self_id() {
                swarm.directory.upsert(node);
            }
        }
        swarm.directory.set_primary(snapshot.primary.clone());
        swarm.apply_encoded_secrets(&snapshot.secrets).await?;

        tracing::info!(
            node_id = %swarm.self_id(),
            primary = ?snapshot.primary.as_ref().map(NodeId::as_str),
            nodes = swarm.directory.len(),
            "Joined swarm"
        );
        Ok(swarm)
    }

    /// Spawns the background loops and returns immediately.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let housekeeping = {
            let swarm = self.clone();
            tokio::spawn(async move { swarm.housekeeping_loop().await })
        };
        let executor = TaskExecutor::new(self.clone()).start();
        vec![housekeeping, executor]
    }

    /// Signals every background loop to stop at its next boundary.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn self_id(&self) -> &NodeId {
        self.directory.self_id()
    }

    pub fn client(&self, addr: impl Into<String>) -> NodeClient<'_> {
        NodeClient::new(self.transport.as_ref(), addr)
    }

    pub fn client_for(&self, node: &Node) -> NodeClient<'_> {
        self.client(node.connect_addr())
    }

    pub fn fetcher(&self) -> &dyn FileFetcher {
        self.fetcher.as_ref()
    }

    /// Sends `request` to every target concurrently. Failures are logged per
    /// peer and never abort the fan-out.
    pub async fn send_each(&self, targets: &[Node], request: SwarmRequest) {
        let kind = request.kind();
        let sends = targets.iter().map(|node| {
            let request = request.clone();
            async move {
                let addr = node.connect_addr();
                match self.transport.send(&addr, request).await {
                    Ok(SwarmResponse::Error(e)) => {
                        tracing::warn!(peer = %node.id, %addr, error = %e.message, "{} rejected", kind)
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(peer = %node.id, %addr, error = %e, "{} failed", kind),
                }
            }
        });
        futures::future::join_all(sends).await;
    }

    /// Non-ephemeral peers, optionally excluding some ids.
    pub fn broadcast_targets(&self, exclude: &[&NodeId]) -> Vec<Node> {
        self.directory
            .others()
            .into_iter()
            .filter(|n| !n.is_ephemeral() && !exclude.contains(&&n.id))
            .collect()
    }

    /// Publishes self's current entry: broadcast when primary, otherwise
    /// reported to the primary.
    pub async fn announce_self(&self) -> Result<()> {
        let me = self.directory.refresh_self();
        let request = SwarmRequest::UpdateNode(crate::rpc::protocol::UpdateNodeRequest {
            node: me.clone(),
            sender: Some(me.id.clone()),
        });

        if self.directory.is_primary() {
            let targets = self.broadcast_targets(&[]);
            self.send_each(&targets, request).await;
            return Ok(());
        }

        match self.directory.primary_node() {
            Some(primary) => {
                self.client_for(&primary)
                    .update_node(me.clone(), Some(me.id.clone()))
                    .await
            }
            None => {
                tracing::warn!("No primary known, cannot announce self");
                Ok(())
            }
        }
    }

    /// Enqueues `task` after `delay` unless the node shuts down first.
    pub fn enqueue_after(self: &Arc<Self>, task: SwarmTask, delay: Duration) -> JoinHandle<()> {
        let swarm = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = swarm.shutdown.cancelled() => {
                    tracing::debug!(task_id = task.id(), "Dropping delayed task on shutdown");
                }
                _ = tokio::time::sleep(delay) => {
                    swarm.queue.enqueue(task);
                }
            }
        })
    }
}

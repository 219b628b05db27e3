//! In-process test harness: a [`Transport`] and [`FileFetcher`] that route
//! directly to other [`Swarm`] instances in the same process.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::config::NodeConfig;
use crate::jobs::sandbox::ProcessSandbox;
use crate::membership::types::NodeRole;
use crate::rpc::protocol::{ENDPOINT_STATIC, SwarmRequest, SwarmResponse};
use crate::rpc::transport::Transport;
use crate::secrets::store::FileSecretsStore;
use crate::storage::sync::{ByteStream, FileFetcher};
use crate::swarm::{Collaborators, Swarm};

#[derive(Default)]
pub struct LocalNetwork {
    nodes: Mutex<HashMap<String, Weak<Swarm>>>,
    down: Mutex<HashSet<String>>,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, swarm: &Arc<Swarm>) {
        let addr = swarm.directory.self_node().connect_addr();
        self.nodes
            .lock()
            .unwrap()
            .insert(addr.clone(), Arc::downgrade(swarm));
        self.down.lock().unwrap().remove(&addr);
    }

    /// Makes every call to `addr` fail as if the node had crashed.
    pub fn take_down(&self, addr: &str) {
        self.down.lock().unwrap().insert(addr.to_string());
    }

    pub fn collaborators(self: &Arc<Self>, config: &NodeConfig) -> Collaborators {
        Collaborators {
            transport: self.clone(),
            fetcher: self.clone(),
            sandbox: Arc::new(ProcessSandbox),
            secrets: Arc::new(FileSecretsStore::new(config.secrets_path())),
        }
    }

    fn lookup(&self, addr: &str) -> Result<Arc<Swarm>> {
        if self.down.lock().unwrap().contains(addr) {
            return Err(anyhow!("connection refused: {}", addr));
        }
        self.nodes
            .lock()
            .unwrap()
            .get(addr)
            .and_then(Weak::upgrade)
            .ok_or_else(|| anyhow!("no route to {}", addr))
    }
}

#[async_trait]
impl Transport for LocalNetwork {
    async fn send(&self, addr: &str, request: SwarmRequest) -> Result<SwarmResponse> {
        let target = self.lookup(addr)?;
        // Round-trip through JSON so tests exercise the wire format.
        let request: SwarmRequest = serde_json::from_str(&serde_json::to_string(&request)?)?;
        let response = target.dispatch(request).await;
        Ok(serde_json::from_str(&serde_json::to_string(&response)?)?)
    }
}

#[async_trait]
impl FileFetcher for LocalNetwork {
    async fn fetch(&self, url: &str) -> Result<ByteStream> {
        let rest = url
            .strip_prefix("http://")
            .ok_or_else(|| anyhow!("unsupported url {}", url))?;
        let (addr, path) = rest
            .split_once(ENDPOINT_STATIC)
            .ok_or_else(|| anyhow!("not a static url {}", url))?;
        let target = self.lookup(addr)?;
        let bytes = tokio::fs::read(target.config.workdir.join(path.trim_start_matches('/'))).await?;
        Ok(futures::stream::iter(vec![Ok(Bytes::from(bytes))]).boxed())
    }
}

/// Config with short intervals and a fixed id, rooted in `workdir`.
pub fn test_config(id: &str, hostname: &str, port: u16, workdir: &std::path::Path) -> NodeConfig {
    NodeConfig {
        node_id: Some(id.to_string()),
        hostname: hostname.to_string(),
        port,
        workdir: workdir.to_path_buf(),
        role: NodeRole::Worker,
        housekeeping_interval: Duration::from_millis(100),
        queue_idle_poll: Duration::from_millis(20),
        schedule_retry_delay: Duration::from_millis(100),
        failover_backoff: Duration::from_millis(50),
        lock_backoff_start: Duration::from_millis(5),
        lock_backoff_max: Duration::from_millis(50),
        slow_handler_threshold: Duration::from_secs(5),
        ..NodeConfig::default()
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Starts a new swarm on `net` with `id` as its only member.
pub async fn create_node(net: &Arc<LocalNetwork>, config: NodeConfig) -> Arc<Swarm> {
    let collab = net.collaborators(&config);
    let swarm = Swarm::create(config, collab).await.unwrap();
    net.register(&swarm);
    swarm
}

/// Joins a new node to the swarm `via` belongs to.
pub async fn join_node(net: &Arc<LocalNetwork>, config: NodeConfig, via: &Arc<Swarm>) -> Arc<Swarm> {
    let collab = net.collaborators(&config);
    let addr = via.directory.self_node().connect_addr();
    let swarm = Swarm::join(config, &addr, collab).await.unwrap();
    net.register(&swarm);
    swarm
}

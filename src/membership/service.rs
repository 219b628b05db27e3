//! Membership protocol handlers and the housekeeping loop.
//!
//! State is always applied locally first and then broadcast best-effort.
//! Peers that miss a broadcast catch up through pings, which carry full node
//! snapshots in both directions.

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::types::{Node, NodeId};
use crate::error::SwarmError;
use crate::executor::types::{SwarmTask, SyncSwarmFilesTask};
use crate::rpc::protocol::{RemoveNodesRequest, SwarmRequest, SwarmSnapshot, UpdateNodeRequest};
use crate::swarm::Swarm;

impl Swarm {
    /// Full view handed to joining nodes.
    pub async fn snapshot(&self) -> Result<SwarmSnapshot> {
        let secrets = self.secrets.lock().await.clone();
        Ok(SwarmSnapshot {
            primary: self.directory.primary_id(),
            nodes: self.directory.all(),
            secrets: self.secrets_store.encode(&secrets)?,
        })
    }

    pub async fn handle_join_swarm(self: &Arc<Self>, candidate: Node) -> Result<SwarmSnapshot> {
        let candidate = candidate.seen_now();
        tracing::info!(
            node_id = %candidate.id,
            addr = %candidate.connect_addr(),
            role = ?candidate.role,
            "Node joining"
        );

        if self.directory.is_primary() {
            self.directory.upsert(candidate.clone());
            let targets = self.broadcast_targets(&[&candidate.id]);
            self.send_each(
                &targets,
                SwarmRequest::UpdateNode(UpdateNodeRequest {
                    node: candidate.clone(),
                    sender: Some(self.self_id().clone()),
                }),
            )
            .await;
        } else {
            self.directory.upsert(candidate.clone());
            match self.directory.primary_node() {
                Some(primary) => {
                    self.client_for(&primary)
                        .update_node(candidate.clone(), Some(self.self_id().clone()))
                        .await?;
                }
                None => {
                    tracing::warn!("Join request while no primary is known, starting failover");
                    self.trigger_failover();
                }
            }
        }

        self.snapshot().await
    }

    pub async fn handle_leave_swarm(self: &Arc<Self>, node: Node) -> Result<()> {
        tracing::info!(node_id = %node.id, "Node leaving");

        if self.directory.is_primary() {
            self.directory.remove(&node.id);
            let targets = self.broadcast_targets(&[&node.id]);
            self.send_each(
                &targets,
                SwarmRequest::RemoveNodes(RemoveNodesRequest {
                    sender: Some(self.self_id().clone()),
                    node_ids: vec![node.id.clone()],
                }),
            )
            .await;
            self.handle_lost_workers(&[node.id]).await;
            return Ok(());
        }

        self.directory.remove(&node.id);
        let primary = self.directory.primary_node().ok_or(SwarmError::NoPrimary)?;
        if primary.id != node.id {
            self.client_for(&primary).leave_swarm(node).await?;
        }
        Ok(())
    }

    pub fn handle_heartbeat(&self, node_id: &NodeId) {
        match self.directory.get(node_id) {
            Some(node) => {
                self.directory.upsert(node.seen_now());
            }
            None => tracing::warn!(node_id = %node_id, "Heartbeat from unknown node"),
        }
    }

    /// Liveness probe. Learns the sender if present and answers with self.
    pub fn handle_ping(&self, sender: Option<Node>) -> Node {
        if let Some(sender) = sender
            && &sender.id != self.self_id()
        {
            self.directory.upsert(sender);
        }
        self.directory.refresh_self()
    }

    pub async fn handle_update_node(
        self: &Arc<Self>,
        node: Node,
        sender: Option<NodeId>,
    ) -> Result<()> {
        if &node.id == self.self_id() {
            return Ok(());
        }

        let stored = self.directory.upsert(node.clone());
        if stored != node {
            return Ok(());
        }

        if self.directory.is_primary() {
            let mut exclude = vec![&node.id];
            if let Some(sender) = &sender {
                exclude.push(sender);
            }
            let targets = self.broadcast_targets(&exclude);
            self.send_each(
                &targets,
                SwarmRequest::UpdateNode(UpdateNodeRequest {
                    node: node.clone(),
                    sender: Some(self.self_id().clone()),
                }),
            )
            .await;
        }

        let me = self.directory.self_node();
        if !node.is_ephemeral() && node.hostname != me.hostname && !node.files.is_empty() {
            self.queue
                .enqueue(SwarmTask::SyncSwarmFiles(SyncSwarmFilesTask::create(node)));
        }
        Ok(())
    }

    /// Removes nodes in bulk, as decided by the primary's health check.
    pub async fn handle_remove_nodes(
        self: &Arc<Self>,
        sender: Option<NodeId>,
        node_ids: Vec<NodeId>,
    ) -> Result<()> {
        let mut removed = Vec::new();
        for id in node_ids {
            if self.directory.remove(&id).is_some() {
                removed.push(id);
            }
        }
        if removed.is_empty() {
            return Ok(());
        }

        tracing::info!(
            sender = ?sender.as_ref().map(NodeId::as_str),
            removed = removed.len(),
            "Removed nodes"
        );
        if self.directory.is_primary() {
            self.handle_lost_workers(&removed).await;
        }
        Ok(())
    }

    /// Runs until the node shuts down.
    pub async fn housekeeping_loop(self: Arc<Self>) {
        tracing::info!(
            interval_ms = self.config.housekeeping_interval.as_millis() as u64,
            "Starting housekeeping"
        );
        let token = self.shutdown_token();

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.housekeeping_interval) => {}
            }
            if let Err(e) = self.housekeeping_tick().await {
                tracing::warn!(error = %e, "Housekeeping failed");
            }
        }

        tracing::info!("Housekeeping stopped");
    }

    pub async fn housekeeping_tick(self: &Arc<Self>) -> Result<()> {
        if self.failover_gate.available_permits() == 0 {
            tracing::debug!("Failover in progress, skipping housekeeping");
            return Ok(());
        }

        self.directory.refresh_self();
        self.repair_duplicate_entries().await;

        if self.directory.is_primary() {
            self.refresh_node_list(false).await;
            return Ok(());
        }

        let Some(primary) = self.directory.primary_node() else {
            tracing::warn!("There is no primary, starting failover");
            self.trigger_failover();
            return Ok(());
        };

        let me = self.directory.self_node();
        match self.client_for(&primary).ping(Some(me)).await {
            Ok(updated) => {
                self.directory.upsert(updated);
            }
            Err(e) => {
                tracing::warn!(primary = %primary.id, error = %e, "Failed to ping primary, starting failover");
                self.trigger_failover();
            }
        }
        Ok(())
    }

    /// Collapses entries that share one `host:port` (a restarted node) into
    /// whatever currently answers at that address.
    pub async fn repair_duplicate_entries(&self) {
        let mut by_addr: BTreeMap<String, Vec<Node>> = BTreeMap::new();
        for node in self.directory.all() {
            by_addr.entry(node.connect_addr()).or_default().push(node);
        }

        for (addr, nodes) in by_addr.into_iter().filter(|(_, v)| v.len() > 1) {
            let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
            tracing::warn!(%addr, ?ids, "Found nodes with duplicate address");

            for node in &nodes {
                self.directory.remove(&node.id);
            }

            match self.client(addr.as_str()).ping(None).await {
                Ok(current) => {
                    tracing::info!(%addr, node_id = %current.id, "Resolved duplicate address");
                    self.directory.upsert(current);
                }
                Err(e) => tracing::warn!(%addr, error = %e, "Failed to contact duplicate address"),
            }
        }
    }

    /// Pings peers and evicts those that do not answer. Without `force`, only
    /// peers not seen within the node timeout are pinged.
    ///
    /// Returns whether any node was removed.
    pub async fn refresh_node_list(self: &Arc<Self>, force: bool) -> bool {
        let me = self.directory.self_node();
        let mut removed = Vec::new();

        for node in self.directory.others() {
            if !force && node.ago() < self.config.node_timeout {
                continue;
            }
            match self.client_for(&node).ping(Some(me.clone())).await {
                Ok(updated) => {
                    self.directory.upsert(updated);
                }
                Err(e) => {
                    tracing::warn!(node_id = %node.id, error = %e, "Node unresponsive, removing");
                    self.directory.remove(&node.id);
                    removed.push(node.id);
                }
            }
        }

        if removed.is_empty() {
            return false;
        }

        let targets = self.directory.others();
        self.send_each(
            &targets,
            SwarmRequest::RemoveNodes(RemoveNodesRequest {
                sender: Some(self.self_id().clone()),
                node_ids: removed.clone(),
            }),
        )
        .await;

        if self.directory.is_primary() {
            self.handle_lost_workers(&removed).await;
        }
        true
    }
}

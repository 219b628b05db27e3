//! Failover Election
//!
//! Runs when the primary is unreachable. Every node nominates the live node
//! with the smallest id; since ids are totally ordered, nodes with converged
//! views pick the same primary without a separate voting round.
//!
//! ## Steps
//! 1. Forget the current primary.
//! 2. Ping every peer, evicting (and broadcasting) the unresponsive ones.
//! 3. Nominate the smallest live id.
//! 4. If self is the nominee, ask every peer for its nominee. Any different
//!    answer is a rival: learn it, back off, retry. No rivals means self wins.
//! 5. Otherwise ask the nominee for *its* nominee and adopt the answer.

use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::types::Node;
use crate::error::SwarmError;
use crate::swarm::Swarm;

impl Swarm {
    /// Starts an election in the background. A trigger while one is running
    /// is dropped.
    pub fn trigger_failover(self: &Arc<Self>) {
        let swarm = self.clone();
        tokio::spawn(async move {
            match swarm.failover().await {
                Ok(()) => {}
                Err(e) if matches!(e.downcast_ref(), Some(SwarmError::FailoverInProgress)) => {
                    tracing::debug!("Failover already in progress");
                }
                Err(e) => tracing::error!(error = %e, "Failover failed"),
            }
        });
    }

    /// Elects a new primary. Fails fast with [`SwarmError::FailoverInProgress`]
    /// if another election holds the gate.
    pub async fn failover(self: &Arc<Self>) -> Result<()> {
        let Ok(_permit) = self.failover_gate.try_acquire() else {
            return Err(SwarmError::FailoverInProgress.into());
        };
        let round = self.failover_rounds.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.shutdown_token();
        tracing::info!(round, node_id = %self.self_id(), "Starting failover");

        loop {
            if token.is_cancelled() {
                tracing::info!(round, "Failover aborted by shutdown");
                return Ok(());
            }

            self.directory.set_primary(None);
            self.refresh_node_list(true).await;

            let nominee = self.choose_nominee().await;
            tracing::info!(round, nominee = %nominee.id, "Chose nominee");

            if &nominee.id == self.self_id() {
                let me = self.directory.self_node();
                let mut rivals = Vec::new();
                for node in self.directory.others() {
                    match self.client_for(&node).get_failover_nominee(me.clone()).await {
                        Ok(theirs) if theirs.id != nominee.id => {
                            tracing::info!(round, peer = %node.id, rival = %theirs.id, "Rival nomination");
                            rivals.push(theirs);
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(round, peer = %node.id, error = %e, "Peer did not answer"),
                    }
                }

                if rivals.is_empty() {
                    self.directory.set_primary(Some(self.self_id().clone()));
                    tracing::info!(round, "No rival nominees, this node is now primary");
                    return Ok(());
                }

                for rival in rivals {
                    self.directory.upsert(rival);
                }
                tracing::info!(round, "Rival nominees found, retrying");
            } else {
                let me = self.directory.self_node();
                match self.client_for(&nominee).get_failover_nominee(me).await {
                    Ok(primary) => {
                        tracing::info!(round, primary = %primary.id, "Adopting nominee's choice as primary");
                        let id = primary.id.clone();
                        self.directory.upsert(primary);
                        self.directory.set_primary(Some(id));
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::warn!(round, nominee = %nominee.id, error = %e, "Nominee did not answer, retrying");
                    }
                }
            }

            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(self.config.failover_backoff) => {}
            }
        }
    }

    /// Smallest live id. Unreachable candidates are removed until one answers.
    pub async fn choose_nominee(&self) -> Node {
        loop {
            let Some(nominee) = self.directory.min_node() else {
                tracing::error!(
                    node_id = %self.self_id(),
                    "Node directory is empty although this node is alive, terminating"
                );
                std::process::exit(1);
            };

            if &nominee.id == self.self_id() {
                return nominee;
            }

            match self.client_for(&nominee).ping(None).await {
                Ok(current) => return self.directory.upsert(current),
                Err(e) => {
                    tracing::warn!(nominee = %nominee.id, error = %e, "Nominee unreachable, removing");
                    self.directory.remove(&nominee.id);
                }
            }
        }
    }

    pub async fn handle_get_failover_nominee(&self, sender: Node) -> Node {
        if &sender.id != self.self_id() {
            self.directory.upsert(sender);
        }
        if self.directory.is_primary() {
            return self.directory.self_node();
        }
        self.choose_nominee().await
    }
}

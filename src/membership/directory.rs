//! Node Directory
//!
//! The process-local table of known nodes. One mutex guards the whole table and
//! every critical section is synchronous, so the lock is never held across an
//! `.await`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::types::{Node, NodeId};

pub struct NodeDirectory {
    self_id: NodeId,
    nodes: Mutex<HashMap<NodeId, Node>>,
    primary: Mutex<Option<NodeId>>,
}

impl NodeDirectory {
    pub fn new(self_node: Node, primary: Option<NodeId>, others: Vec<Node>) -> Self {
        let mut nodes: HashMap<NodeId, Node> =
            others.into_iter().map(|n| (n.id.clone(), n)).collect();
        let self_id = self_node.id.clone();
        nodes.insert(self_id.clone(), self_node);

        Self {
            self_id,
            nodes: Mutex::new(nodes),
            primary: Mutex::new(primary),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<NodeId, Node>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn self_id(&self) -> &NodeId {
        &self.self_id
    }

    /// Inserts or replaces `node` unless a strictly newer state is already known.
    ///
    /// Returns the entry that is in the table afterwards. Self is always
    /// accepted, since its own entry is refreshed locally.
    pub fn upsert(&self, node: Node) -> Node {
        let mut nodes = self.table();

        if let Some(existing) = nodes.get(&node.id)
            && existing.last_seen > node.last_seen
            && node.id != self.self_id
        {
            tracing::debug!(
                node_id = %node.id,
                behind_ms = (existing.last_seen - node.last_seen).num_milliseconds(),
                "Ignoring outdated node state"
            );
            return existing.clone();
        }

        nodes.insert(node.id.clone(), node.clone());
        node
    }

    /// Removes a node. Self is never removed.
    pub fn remove(&self, id: &NodeId) -> Option<Node> {
        if id == &self.self_id {
            return None;
        }
        self.table().remove(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<Node> {
        self.table().get(id).cloned()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.table().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// All nodes including self, ordered by id.
    pub fn all(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.table().values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// All nodes except self, ordered by id.
    pub fn others(&self) -> Vec<Node> {
        self.all()
            .into_iter()
            .filter(|n| n.id != self.self_id)
            .collect()
    }

    /// Live node with the smallest id.
    pub fn min_node(&self) -> Option<Node> {
        self.table().values().min_by(|a, b| a.id.cmp(&b.id)).cloned()
    }

    /// Self's current entry.
    ///
    /// Self is inserted on construction and `remove` refuses to drop it, so a
    /// missing entry means the table is corrupt and the process cannot go on.
    pub fn self_node(&self) -> Node {
        match self.table().get(&self.self_id) {
            Some(node) => node.clone(),
            None => fatal_missing_self(&self.self_id),
        }
    }

    /// Applies `update` to self's entry and stores the result.
    pub fn update_self(&self, update: impl FnOnce(Node) -> Node) -> Node {
        let mut nodes = self.table();
        let current = match nodes.get(&self.self_id) {
            Some(node) => node.clone(),
            None => fatal_missing_self(&self.self_id),
        };
        let updated = update(current);
        nodes.insert(self.self_id.clone(), updated.clone());
        updated
    }

    /// Like [`update_self`](Self::update_self), but `update` may decline by
    /// returning `None`. Check and store happen under one lock.
    pub fn try_update_self(&self, update: impl FnOnce(&Node) -> Option<Node>) -> Option<Node> {
        let mut nodes = self.table();
        let current = match nodes.get(&self.self_id) {
            Some(node) => node,
            None => fatal_missing_self(&self.self_id),
        };
        let updated = update(current)?;
        nodes.insert(self.self_id.clone(), updated.clone());
        Some(updated)
    }

    /// Refreshes self's `last_seen` without any network confirmation.
    pub fn refresh_self(&self) -> Node {
        self.update_self(Node::seen_now)
    }

    pub fn primary_id(&self) -> Option<NodeId> {
        self.primary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_primary(&self, primary: Option<NodeId>) {
        *self.primary.lock().unwrap_or_else(PoisonError::into_inner) = primary;
    }

    pub fn is_primary(&self) -> bool {
        self.primary_id().as_ref() == Some(&self.self_id)
    }

    /// The primary's entry, if a primary is known and present in the table.
    pub fn primary_node(&self) -> Option<Node> {
        let primary = self.primary_id()?;
        self.get(&primary)
    }
}

fn fatal_missing_self(self_id: &NodeId) -> ! {
    tracing::error!(
        node_id = %self_id,
        "Node directory lost its own entry although this node is alive, terminating"
    );
    std::process::exit(1)
}

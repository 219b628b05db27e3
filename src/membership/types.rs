use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::storage::types::SwarmFile;

/// Opaque node identity, unique for the lifetime of one process.
///
/// Ids are totally ordered; failover nominates the smallest live id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeRole {
    /// Runs jobs and hosts swarm files.
    Worker,
    /// Hosts swarm files but never accepts jobs.
    Client,
    /// Short-lived participant (e.g. a CLI invocation). Excluded from
    /// broadcasts and file sync.
    Ephemeral,
}

impl std::str::FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "worker" => Ok(NodeRole::Worker),
            "client" => Ok(NodeRole::Client),
            "ephemeral" => Ok(NodeRole::Ephemeral),
            other => Err(format!("unknown node role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeStatus {
    Idle,
    Busy,
}

/// A member of the swarm as seen by one process.
///
/// Values are never mutated in place: the `with_*` helpers return an updated
/// copy which is then handed to the directory. `last_seen` orders competing
/// updates for the same id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub created: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub hostname: String,
    pub port: u16,
    pub role: NodeRole,
    pub status: NodeStatus,
    /// Swarm files this node advertises, keyed by logical name.
    #[serde(default)]
    pub files: BTreeMap<String, SwarmFile>,
}

impl Node {
    pub fn new(hostname: &str, port: u16, role: NodeRole) -> Self {
        let now = Utc::now();
        Self {
            id: NodeId::new(),
            created: now,
            last_seen: now,
            hostname: hostname.to_string(),
            port,
            role,
            status: NodeStatus::Idle,
            files: BTreeMap::new(),
        }
    }

    /// `host:port` other nodes use to reach this one.
    pub fn connect_addr(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    /// Time since this node was last confirmed alive.
    pub fn ago(&self) -> Duration {
        (Utc::now() - self.last_seen).to_std().unwrap_or_default()
    }

    pub fn is_ephemeral(&self) -> bool {
        self.role == NodeRole::Ephemeral
    }

    pub fn seen_now(self) -> Self {
        Self {
            last_seen: Utc::now(),
            ..self
        }
    }

    pub fn with_status(self, status: NodeStatus) -> Self {
        Self {
            status,
            last_seen: Utc::now(),
            ..self
        }
    }

    pub fn with_file(self, file: SwarmFile) -> Self {
        let mut files = self.files.clone();
        files.insert(file.logical_name.clone(), file);
        Self {
            files,
            last_seen: Utc::now(),
            ..self
        }
    }

    pub fn with_files(self, files: impl IntoIterator<Item = SwarmFile>) -> Self {
        let files = files
            .into_iter()
            .map(|f| (f.logical_name.clone(), f))
            .collect();
        Self {
            files,
            last_seen: Utc::now(),
            ..self
        }
    }
}

use std::path::PathBuf;
use std::time::Duration;

use crate::membership::types::NodeRole;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DEFAULT_PORT: u16 = 5777;
pub const DEFAULT_WORKDIR: &str = ".swarm";
/// Content store directory, relative to the working directory.
pub const FILES_DIR: &str = "files";

/// Content hashes only cover this many leading bytes of a file.
pub const HASH_PREFIX_LIMIT: u64 = 128 * 1024 * 1024;

/// Timing and placement settings for one swarm node.
///
/// `Default` gives the values the cluster is tuned for; tests shrink the
/// intervals to keep multi-node scenarios fast.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Fixed node id. A fresh one is generated when unset.
    pub node_id: Option<String>,
    /// Hostname peers use to reach this node.
    pub hostname: String,
    pub port: u16,
    /// Root of the content store and the job scratch space.
    pub workdir: PathBuf,
    pub role: NodeRole,

    pub housekeeping_interval: Duration,
    /// Peers not seen for longer than this are pinged by the primary.
    pub node_timeout: Duration,
    /// Upper bound for a single outbound RPC. Capped by [`call_timeout`](Self::call_timeout).
    pub rpc_timeout: Duration,
    pub queue_idle_poll: Duration,
    /// Delay before a job that found no idle worker is offered again.
    pub schedule_retry_delay: Duration,
    pub failover_backoff: Duration,
    /// Inbound handlers slower than this are logged as warnings.
    pub slow_handler_threshold: Duration,

    pub hash_prefix_limit: u64,
    pub lock_backoff_start: Duration,
    pub lock_backoff_max: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            hostname: "localhost".to_string(),
            port: DEFAULT_PORT,
            workdir: PathBuf::from(DEFAULT_WORKDIR),
            role: NodeRole::Worker,
            housekeeping_interval: Duration::from_secs(5),
            node_timeout: Duration::from_secs(15),
            rpc_timeout: Duration::from_secs(5),
            queue_idle_poll: Duration::from_secs(2),
            schedule_retry_delay: Duration::from_secs(15),
            failover_backoff: Duration::from_millis(1234),
            slow_handler_threshold: Duration::from_millis(100),
            hash_prefix_limit: HASH_PREFIX_LIMIT,
            lock_backoff_start: Duration::from_millis(42),
            lock_backoff_max: Duration::from_secs(1),
        }
    }
}

impl NodeConfig {
    /// Per-call RPC timeout, kept below a third of the node timeout.
    pub fn call_timeout(&self) -> Duration {
        self.rpc_timeout.min(self.node_timeout / 3)
    }

    /// Directory holding one subdirectory per logical swarm file name.
    pub fn files_dir(&self) -> PathBuf {
        self.workdir.join(FILES_DIR)
    }

    /// Scratch space for in-progress job runs.
    pub fn scratch_dir(&self) -> PathBuf {
        self.workdir.join("tmp")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.workdir.join("secrets.json")
    }
}

//! Self-Organizing Swarm Cluster Library
//!
//! A cluster of peer nodes that agree on a shared membership view, elect a
//! coordinating primary, replicate a content-addressed file store and run
//! retry-aware jobs on idle workers. The binary (`main.rs`) wires these
//! pieces to an HTTP listener.
//!
//! ## Architecture Modules
//! - **`membership`**: node directory, join/leave/ping protocol, housekeeping
//!   and failover election.
//! - **`storage`**: the per-node content store and cross-node file sync.
//! - **`executor`**: the sequential background task queue.
//! - **`jobs`**: job state machine, description parser, scheduling and
//!   execution.
//! - **`secrets`**: the revisioned secrets replica.
//! - **`rpc`**: typed request envelopes, transport, dispatch and HTTP routes.
//! - **`swarm`**: the shared per-node context tying everything together.

pub mod config;
pub mod error;
pub mod executor;
pub mod jobs;
pub mod membership;
pub mod rpc;
pub mod secrets;
pub mod storage;
pub mod swarm;

#[cfg(test)]
pub(crate) mod testing;

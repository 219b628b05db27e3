//! Membership & Failover Module
//!
//! Keeps every node's view of the swarm converging without a consensus log:
//! changes are applied locally, broadcast best-effort, and reconciled by a
//! periodic housekeeping pass.
//!
//! ## Core Mechanisms
//! - **Directory**: one mutex-guarded table; competing updates for the same
//!   id are ordered by `last_seen`.
//! - **Primary coordination**: the primary fans out joins, updates and
//!   evictions; other nodes forward to it.
//! - **Health checks**: the primary pings stale peers and evicts silent ones;
//!   everyone else pings the primary.
//! - **Failover**: a deterministic smallest-id election behind a single-permit
//!   gate.

pub mod directory;
pub mod failover;
pub mod service;
pub mod types;

//! Swarm Secrets
//!
//! A revisioned key/value map shared by all nodes. The primary owns writes;
//! every other node holds a replica that only moves forward in revision.
//!
//! ## Responsibilities
//! - **Revision rule**: higher revision wins, equal is a no-op, lower is
//!   rejected with a warning.
//! - **Propagation**: the primary persists each change and pushes the encoded
//!   blob to all non-ephemeral peers.
//! - **Substitution**: job descriptions reference secrets as `{KEY}`.

pub mod service;
pub mod store;
pub mod types;

//! Content Store Module
//!
//! Per-node, content-addressed storage of swarm files, plus pulling files
//! from peers.
//!
//! ## Core Concepts
//! - **Layout**: `<workdir>/files/<logical name>/` holds `file.json` and one
//!   content file.
//! - **Hashing**: SHA-256 over at most the first 128 MiB of content.
//! - **Locking**: an advisory lock per logical name, acquired with exponential
//!   backoff.
//! - **Sync**: a hash mismatch with a peer's copy means a newer version exists
//!   and triggers a download.

pub mod hash;
pub mod local;
pub mod sync;
pub mod types;

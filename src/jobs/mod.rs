//! Jobs Module
//!
//! A job is a setup/execute/collect recipe with at-least-once, retry-aware
//! execution on idle worker nodes.
//!
//! ## Submodules
//! - **`types`**: job description and the guarded status machine.
//! - **`parser`**: the line-oriented job description language.
//! - **`pool`**: jobs tracked by the primary.
//! - **`scheduler`**: offering jobs to workers, running them, handling outcomes
//!   and lost workers.
//! - **`sandbox`**: process execution and zip archives.

pub mod parser;
pub mod pool;
pub mod sandbox;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod tests;

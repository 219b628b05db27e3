//! Inter-node RPC
//!
//! One typed envelope per call, resolved by a compile-time `match` instead of
//! any runtime type lookup.
//!
//! ## Submodules
//! - **`protocol`**: request/response envelopes and their payloads.
//! - **`transport`**: outbound delivery (`Transport` trait, HTTP implementation).
//! - **`client`**: typed per-operation wrappers over a transport.
//! - **`dispatch`**: inbound envelope to handler mapping.
//! - **`handlers`**: the axum router.

pub mod client;
pub mod dispatch;
pub mod handlers;
pub mod protocol;
pub mod transport;

#[cfg(test)]
mod tests;

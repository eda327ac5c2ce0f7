//! Nullable infrastructure for deterministic testing.
//!
//! The exporter reaches the chain only through the
//! [`NodeRpc`](casper_exporter_rpc::NodeRpc) trait. This crate provides a
//! scripted, in-memory implementation that:
//! - Returns whatever state the test configured
//! - Can be switched into failure modes per capability
//! - Counts calls so tests can assert on search behaviour
//! - Never touches the network
//!
//! Usage: hand a `NullNodeRpc` to the exporter in place of a JSON-RPC client.

pub mod fixtures;
pub mod rpc;

pub use rpc::NullNodeRpc;

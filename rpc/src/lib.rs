//! Casper node RPC access for the validator exporter.
//!
//! The exporter only needs four read capabilities from a node, captured by
//! the [`NodeRpc`] trait:
//! - current auction (bid) state
//! - node status (versions, last added block, peers)
//! - latest block height
//! - era settlement stored at a given switch-block height
//!
//! [`JsonRpcClient`] implements them over Casper's JSON-RPC HTTP API.

pub mod client;
pub mod error;
pub mod wire;

pub use client::{endpoint_host, normalize_endpoint, JsonRpcClient, NodeRpc, DEFAULT_RPC_PORT};
pub use error::RpcError;

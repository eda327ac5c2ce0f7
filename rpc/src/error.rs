//! RPC error types.

use thiserror::Error;

/// Failure to obtain a usable answer from a node.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("cannot reach {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("node error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("client error: {0}")]
    Client(String),
}

impl From<casper_exporter_types::DeriveError> for RpcError {
    fn from(e: casper_exporter_types::DeriveError) -> Self {
        RpcError::Malformed(e.to_string())
    }
}

//! The [`NodeRpc`] capability and its JSON-RPC implementation.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use casper_exporter_types::{AuctionState, EraSettlement, NodeStatus};

use crate::wire::{
    AuctionInfoResult, BlockResult, EraInfoResult, RpcRequest, RpcResponse, StatusResult,
};
use crate::RpcError;

/// Port Casper nodes serve JSON-RPC on.
pub const DEFAULT_RPC_PORT: u16 = 7777;

/// Connection timeout, independent of the per-request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read access to a Casper node.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Endpoint this client talks to, for log lines.
    fn endpoint(&self) -> &str;

    /// Current bids held by the auction contract.
    async fn validator_bid_state(&self) -> Result<AuctionState, RpcError>;

    /// Node status: versions, last added block, peers.
    async fn node_status(&self) -> Result<NodeStatus, RpcError>;

    /// Height of the node's latest block.
    async fn latest_block_height(&self) -> Result<u64, RpcError>;

    /// Era settlement stored at `height`, or `None` when the block at that
    /// height is not a switch block.
    async fn era_settlement_at_height(
        &self,
        height: u64,
    ) -> Result<Option<EraSettlement>, RpcError>;
}

/// Turn an operator-supplied node address into a JSON-RPC URL.
///
/// - full URLs are kept as they are
/// - `host:port` becomes `http://host:port/rpc`
/// - a bare host becomes `http://host:7777/rpc`
pub fn normalize_endpoint(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.contains("://") {
        address.to_string()
    } else if address.contains(':') {
        format!("http://{address}/rpc")
    } else {
        format!("http://{address}:{DEFAULT_RPC_PORT}/rpc")
    }
}

/// Host part of an endpoint URL.
pub fn endpoint_host(endpoint: &str) -> Option<String> {
    reqwest::Url::parse(endpoint)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
}

/// JSON-RPC over HTTP client for a single node.
pub struct JsonRpcClient {
    http: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Create a client for `address` (see [`normalize_endpoint`]) with the
    /// given per-request timeout.
    pub fn new(address: &str, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| RpcError::Client(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: normalize_endpoint(address),
            next_id: AtomicU64::new(1),
        })
    }

    /// Send a JSON-RPC request and decode its `result` field.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<T, RpcError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(RpcError::Status {
                endpoint: self.endpoint.clone(),
                status: response.status().as_u16(),
            });
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Malformed(format!("{method}: invalid JSON-RPC envelope: {e}")))?;

        if let Some(err) = envelope.error {
            return Err(RpcError::Node {
                code: err.code,
                message: err.message,
            });
        }

        let result = envelope
            .result
            .ok_or_else(|| RpcError::Malformed(format!("{method}: response has no result")))?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::Malformed(format!("{method}: unexpected result shape: {e}")))
    }

    fn transport_error(&self, e: reqwest::Error) -> RpcError {
        if e.is_timeout() {
            RpcError::Timeout {
                endpoint: self.endpoint.clone(),
            }
        } else {
            RpcError::Unreachable {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl NodeRpc for JsonRpcClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn validator_bid_state(&self) -> Result<AuctionState, RpcError> {
        let result: AuctionInfoResult = self
            .call("state_get_auction_info", Some(serde_json::json!([])))
            .await?;
        AuctionState::try_from(result.auction_state)
    }

    async fn node_status(&self) -> Result<NodeStatus, RpcError> {
        let result: StatusResult = self.call("info_get_status", None).await?;
        Ok(result.into())
    }

    async fn latest_block_height(&self) -> Result<u64, RpcError> {
        let result: BlockResult = self.call("chain_get_block", None).await?;
        result
            .block
            .map(|block| block.header.height)
            .ok_or_else(|| RpcError::Malformed("chain_get_block returned no block".into()))
    }

    async fn era_settlement_at_height(
        &self,
        height: u64,
    ) -> Result<Option<EraSettlement>, RpcError> {
        let params = serde_json::json!({ "block_identifier": { "Height": height } });
        let result: EraInfoResult = self
            .call("chain_get_era_info_by_switch_block", Some(params))
            .await?;
        result
            .era_summary
            .map(|summary| summary.into_settlement(height))
            .transpose()
    }
}

//! Nullable node RPC: scripted answers instead of network calls.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use casper_exporter_rpc::{NodeRpc, RpcError};
use casper_exporter_types::{AuctionState, EraSettlement, NodeStatus};

/// Capabilities that can be switched into failure mode.
#[derive(Clone, Copy, Debug, Default)]
struct Failures {
    bids: bool,
    status: bool,
    height: bool,
    settlements: bool,
}

/// Number of calls made per capability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub bids: usize,
    pub status: usize,
    pub height: usize,
    pub settlements: usize,
}

#[derive(Default)]
struct State {
    auction: Option<AuctionState>,
    status: Option<NodeStatus>,
    latest_height: Option<u64>,
    settlements: BTreeMap<u64, EraSettlement>,
    failures: Failures,
    calls: CallCounts,
    queried_heights: Vec<u64>,
}

/// An in-memory [`NodeRpc`].
///
/// Unset capabilities fail like an unreachable node. When no latest height is
/// configured, the height of the last added block in the status is used.
pub struct NullNodeRpc {
    endpoint: String,
    latency: Duration,
    state: Mutex<State>,
}

impl NullNodeRpc {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            latency: Duration::ZERO,
            state: Mutex::new(State::default()),
        }
    }

    /// Delay every answer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_auction(self, auction: AuctionState) -> Self {
        self.set_auction(auction);
        self
    }

    pub fn with_status(self, status: NodeStatus) -> Self {
        self.set_status(status);
        self
    }

    pub fn with_settlement(self, settlement: EraSettlement) -> Self {
        self.add_settlement(settlement);
        self
    }

    pub fn set_auction(&self, auction: AuctionState) {
        self.lock().auction = Some(auction);
    }

    pub fn set_status(&self, status: NodeStatus) {
        self.lock().status = Some(status);
    }

    pub fn set_latest_height(&self, height: u64) {
        self.lock().latest_height = Some(height);
    }

    /// Store a settlement at its switch-block height.
    pub fn add_settlement(&self, settlement: EraSettlement) {
        self.lock()
            .settlements
            .insert(settlement.block_height, settlement);
    }

    pub fn fail_bids(&self, fail: bool) {
        self.lock().failures.bids = fail;
    }

    pub fn fail_status(&self, fail: bool) {
        self.lock().failures.status = fail;
    }

    pub fn fail_settlements(&self, fail: bool) {
        self.lock().failures.settlements = fail;
    }

    /// Make every capability fail (or recover).
    pub fn fail_all(&self, fail: bool) {
        self.lock().failures = Failures {
            bids: fail,
            status: fail,
            height: fail,
            settlements: fail,
        };
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    /// Heights passed to `era_settlement_at_height`, in call order.
    pub fn queried_heights(&self) -> Vec<u64> {
        self.lock().queried_heights.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unavailable(&self, what: &str) -> RpcError {
        RpcError::Unreachable {
            endpoint: self.endpoint.clone(),
            reason: format!("null rpc: {what} unavailable"),
        }
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl NodeRpc for NullNodeRpc {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn validator_bid_state(&self) -> Result<AuctionState, RpcError> {
        self.delay().await;
        let mut state = self.lock();
        state.calls.bids += 1;
        match (&state.auction, state.failures.bids) {
            (Some(auction), false) => Ok(auction.clone()),
            _ => Err(self.unavailable("auction state")),
        }
    }

    async fn node_status(&self) -> Result<NodeStatus, RpcError> {
        self.delay().await;
        let mut state = self.lock();
        state.calls.status += 1;
        match (&state.status, state.failures.status) {
            (Some(status), false) => Ok(status.clone()),
            _ => Err(self.unavailable("status")),
        }
    }

    async fn latest_block_height(&self) -> Result<u64, RpcError> {
        self.delay().await;
        let mut state = self.lock();
        state.calls.height += 1;
        if state.failures.height {
            return Err(self.unavailable("latest block"));
        }
        state
            .latest_height
            .or_else(|| {
                state
                    .status
                    .as_ref()
                    .and_then(|status| status.last_added_block)
                    .map(|block| block.height)
            })
            .ok_or_else(|| self.unavailable("latest block"))
    }

    async fn era_settlement_at_height(
        &self,
        height: u64,
    ) -> Result<Option<EraSettlement>, RpcError> {
        self.delay().await;
        let mut state = self.lock();
        state.calls.settlements += 1;
        state.queried_heights.push(height);
        if state.failures.settlements {
            return Err(self.unavailable("era info"));
        }
        Ok(state.settlements.get(&height).cloned())
    }
}

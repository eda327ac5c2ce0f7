//! Serde mirrors of the Casper JSON-RPC payloads and their conversion into
//! the exporter's data model.
//!
//! Only the fields the exporter reads are declared; everything else in the
//! node's responses is ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use casper_exporter_types::{
    AuctionState, BlockInfo, Delegator, EraSettlement, Motes, NextUpgrade, NodeStatus,
    PeerEntry, PublicKey, RecipientKind, RewardAllocation, ValidatorBid,
};

use crate::RpcError;

// ── Envelope ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

#[derive(Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

// ── state_get_auction_info ───────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AuctionInfoResult {
    pub auction_state: WireAuctionState,
}

#[derive(Deserialize)]
pub struct WireAuctionState {
    #[serde(default)]
    pub bids: Vec<WireBid>,
}

#[derive(Deserialize)]
pub struct WireBid {
    pub public_key: String,
    pub bid: WireBidBody,
}

#[derive(Deserialize)]
pub struct WireBidBody {
    pub staked_amount: String,
    pub delegation_rate: u8,
    #[serde(default)]
    pub inactive: bool,
    #[serde(default)]
    pub delegators: WireDelegators,
}

/// Older nodes key delegators by public key, newer ones return a list.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum WireDelegators {
    List(Vec<WireDelegator>),
    Map(BTreeMap<String, WireDelegatorBody>),
}

impl Default for WireDelegators {
    fn default() -> Self {
        WireDelegators::List(Vec::new())
    }
}

#[derive(Deserialize)]
pub struct WireDelegator {
    #[serde(alias = "delegator_public_key")]
    pub public_key: String,
    pub staked_amount: String,
}

#[derive(Deserialize)]
pub struct WireDelegatorBody {
    pub staked_amount: String,
}

impl TryFrom<WireAuctionState> for AuctionState {
    type Error = RpcError;

    fn try_from(wire: WireAuctionState) -> Result<Self, Self::Error> {
        let bids = wire
            .bids
            .into_iter()
            .map(ValidatorBid::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AuctionState { bids })
    }
}

impl TryFrom<WireBid> for ValidatorBid {
    type Error = RpcError;

    fn try_from(wire: WireBid) -> Result<Self, Self::Error> {
        let delegators = match wire.bid.delegators {
            WireDelegators::List(list) => list
                .into_iter()
                .map(|d| {
                    Ok(Delegator {
                        public_key: PublicKey::new(&d.public_key),
                        staked_amount: d.staked_amount.parse::<Motes>()?,
                    })
                })
                .collect::<Result<Vec<_>, RpcError>>()?,
            WireDelegators::Map(map) => map
                .into_iter()
                .map(|(key, d)| {
                    Ok(Delegator {
                        public_key: PublicKey::new(&key),
                        staked_amount: d.staked_amount.parse::<Motes>()?,
                    })
                })
                .collect::<Result<Vec<_>, RpcError>>()?,
        };
        Ok(ValidatorBid {
            public_key: PublicKey::new(&wire.public_key),
            self_staked_amount: wire.bid.staked_amount.parse()?,
            delegation_rate: wire.bid.delegation_rate,
            inactive: wire.bid.inactive,
            delegators,
        })
    }
}

// ── info_get_status ──────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct StatusResult {
    pub api_version: String,
    #[serde(default)]
    pub next_upgrade: Option<WireNextUpgrade>,
    #[serde(default)]
    pub last_added_block_info: Option<WireBlockInfo>,
    #[serde(default)]
    pub peers: Vec<WirePeer>,
}

#[derive(Deserialize)]
pub struct WireNextUpgrade {
    pub protocol_version: String,
    #[serde(default)]
    pub activation_point: Option<serde_json::Value>,
}

#[derive(Deserialize)]
pub struct WireBlockInfo {
    pub height: u64,
    pub era_id: u64,
}

#[derive(Deserialize)]
pub struct WirePeer {
    pub node_id: String,
    pub address: String,
}

impl From<StatusResult> for NodeStatus {
    fn from(wire: StatusResult) -> Self {
        NodeStatus {
            api_version: wire.api_version,
            next_upgrade: wire.next_upgrade.map(|upgrade| NextUpgrade {
                protocol_version: upgrade.protocol_version,
                activation_point: upgrade.activation_point.map(|point| match point {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }),
            }),
            last_added_block: wire.last_added_block_info.map(|block| BlockInfo {
                height: block.height,
                era_id: block.era_id,
            }),
            peers: wire
                .peers
                .into_iter()
                .map(|peer| PeerEntry {
                    node_id: peer.node_id,
                    address: peer.address,
                })
                .collect(),
        }
    }
}

// ── chain_get_block ──────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct BlockResult {
    #[serde(default)]
    pub block: Option<WireBlock>,
}

#[derive(Deserialize)]
pub struct WireBlock {
    pub header: WireBlockHeader,
}

#[derive(Deserialize)]
pub struct WireBlockHeader {
    pub height: u64,
}

// ── chain_get_era_info_by_switch_block ───────────────────────────────────

#[derive(Deserialize)]
pub struct EraInfoResult {
    #[serde(default)]
    pub era_summary: Option<WireEraSummary>,
}

#[derive(Deserialize)]
pub struct WireEraSummary {
    pub era_id: u64,
    pub stored_value: WireStoredValue,
}

#[derive(Deserialize)]
pub struct WireStoredValue {
    #[serde(rename = "EraInfo", default)]
    pub era_info: Option<WireEraInfo>,
}

#[derive(Deserialize)]
pub struct WireEraInfo {
    pub seigniorage_allocations: Vec<WireAllocation>,
}

#[derive(Deserialize)]
pub enum WireAllocation {
    Validator {
        validator_public_key: String,
        amount: String,
    },
    Delegator {
        delegator_public_key: String,
        validator_public_key: String,
        amount: String,
    },
}

impl TryFrom<WireAllocation> for RewardAllocation {
    type Error = RpcError;

    fn try_from(wire: WireAllocation) -> Result<Self, Self::Error> {
        Ok(match wire {
            WireAllocation::Validator {
                validator_public_key,
                amount,
            } => RewardAllocation {
                recipient_kind: RecipientKind::Validator,
                recipient_key: PublicKey::new(&validator_public_key),
                validator_key: PublicKey::new(&validator_public_key),
                amount: amount.parse()?,
            },
            WireAllocation::Delegator {
                delegator_public_key,
                validator_public_key,
                amount,
            } => RewardAllocation {
                recipient_kind: RecipientKind::Delegator,
                recipient_key: PublicKey::new(&delegator_public_key),
                validator_key: PublicKey::new(&validator_public_key),
                amount: amount.parse()?,
            },
        })
    }
}

impl WireEraSummary {
    /// Convert into a settlement read at `block_height`.
    pub fn into_settlement(self, block_height: u64) -> Result<EraSettlement, RpcError> {
        let era_info = self.stored_value.era_info.ok_or_else(|| {
            RpcError::Malformed(format!(
                "era summary for era {} has no EraInfo stored value",
                self.era_id
            ))
        })?;
        let allocations = era_info
            .seigniorage_allocations
            .into_iter()
            .map(RewardAllocation::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EraSettlement {
            era_id: self.era_id,
            block_height,
            allocations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn auction_state_with_listed_delegators() {
        let raw = json!({
            "auction_state": {
                "state_root_hash": "aa",
                "block_height": 1234,
                "era_validators": [],
                "bids": [{
                    "public_key": "01AA",
                    "bid": {
                        "bonding_purse": "uref-x",
                        "staked_amount": "5000000000",
                        "delegation_rate": 10,
                        "inactive": false,
                        "delegators": [
                            {"public_key": "02d1", "staked_amount": "1000000000", "delegatee": "01aa"},
                            {"delegator_public_key": "02d2", "staked_amount": "2000000000"}
                        ]
                    }
                }]
            }
        });
        let parsed: AuctionInfoResult = serde_json::from_value(raw).unwrap();
        let state = AuctionState::try_from(parsed.auction_state).unwrap();
        let bid = &state.bids[0];
        assert_eq!(bid.public_key, PublicKey::new("01aa"));
        assert_eq!(bid.self_staked_amount, Motes::new(5_000_000_000));
        assert_eq!(bid.delegators.len(), 2);
        assert_eq!(bid.delegator_staked_amount(), Motes::new(3_000_000_000));
    }

    #[test]
    fn auction_state_with_keyed_delegators() {
        let raw = json!({
            "auction_state": {
                "bids": [{
                    "public_key": "01bb",
                    "bid": {
                        "staked_amount": "1",
                        "delegation_rate": 3,
                        "delegators": {
                            "02d1": {"staked_amount": "7", "delegatee": "01bb"}
                        }
                    }
                }]
            }
        });
        let parsed: AuctionInfoResult = serde_json::from_value(raw).unwrap();
        let state = AuctionState::try_from(parsed.auction_state).unwrap();
        assert!(!state.bids[0].inactive);
        assert_eq!(state.bids[0].delegators[0].staked_amount, Motes::new(7));
    }

    #[test]
    fn non_numeric_stake_is_malformed() {
        let raw = json!({
            "auction_state": {
                "bids": [{
                    "public_key": "01bb",
                    "bid": {"staked_amount": "lots", "delegation_rate": 3}
                }]
            }
        });
        let parsed: AuctionInfoResult = serde_json::from_value(raw).unwrap();
        let err = AuctionState::try_from(parsed.auction_state).unwrap_err();
        assert!(matches!(err, RpcError::Malformed(_)));
    }

    #[test]
    fn status_without_upgrade_or_blocks() {
        let raw = json!({
            "api_version": "1.5.6",
            "chainspec_name": "casper",
            "peers": [{"node_id": "tls:ab", "address": "1.2.3.4:35000"}],
            "last_added_block_info": null,
            "next_upgrade": null,
            "build_version": "1.5.6-abc"
        });
        let status: NodeStatus = serde_json::from_value::<StatusResult>(raw).unwrap().into();
        assert_eq!(status.api_version, "1.5.6");
        assert!(status.next_upgrade.is_none());
        assert!(status.last_added_block.is_none());
        assert_eq!(status.peers.len(), 1);
    }

    #[test]
    fn status_with_numeric_activation_point() {
        let raw = json!({
            "api_version": "1.5.6",
            "next_upgrade": {"activation_point": 11000, "protocol_version": "2.0.0"},
            "last_added_block_info": {"height": 99, "era_id": 7, "hash": "ff"}
        });
        let status: NodeStatus = serde_json::from_value::<StatusResult>(raw).unwrap().into();
        assert_eq!(status.next_protocol_version(), Some("2.0.0"));
        let upgrade = status.next_upgrade.unwrap();
        assert_eq!(upgrade.activation_point.as_deref(), Some("11000"));
        assert_eq!(status.last_added_block, Some(BlockInfo { height: 99, era_id: 7 }));
    }

    #[test]
    fn era_summary_allocations() {
        let raw = json!({
            "era_summary": {
                "block_hash": "aa",
                "era_id": 10,
                "state_root_hash": "bb",
                "merkle_proof": "cc",
                "stored_value": {
                    "EraInfo": {
                        "seigniorage_allocations": [
                            {"Validator": {"validator_public_key": "01aa", "amount": "4000000000"}},
                            {"Delegator": {
                                "delegator_public_key": "02d1",
                                "validator_public_key": "01aa",
                                "amount": "1000000000"
                            }}
                        ]
                    }
                }
            }
        });
        let parsed: EraInfoResult = serde_json::from_value(raw).unwrap();
        let settlement = parsed.era_summary.unwrap().into_settlement(500).unwrap();
        assert_eq!(settlement.era_id, 10);
        assert_eq!(settlement.block_height, 500);
        assert_eq!(settlement.allocations[1].recipient_kind, RecipientKind::Delegator);
        assert_eq!(
            settlement.reward_for(&PublicKey::new("01aa")),
            Motes::new(5_000_000_000)
        );
    }

    #[test]
    fn missing_era_summary_is_none() {
        let parsed: EraInfoResult = serde_json::from_value(json!({"era_summary": null})).unwrap();
        assert!(parsed.era_summary.is_none());
    }
}

//! Builders for chain data used across tests.

use casper_exporter_types::{
    AuctionState, BlockInfo, Delegator, EraSettlement, Motes, NextUpgrade, NodeStatus,
    PeerEntry, PublicKey, RecipientKind, RewardAllocation, ValidatorBid,
};

/// An active bid with one delegator holding `delegated` motes (none when zero).
pub fn bid(key: &str, own: u128, delegated: u128) -> ValidatorBid {
    let delegators = if delegated == 0 {
        Vec::new()
    } else {
        vec![Delegator {
            public_key: PublicKey::new(format!("02{key}")),
            staked_amount: Motes::new(delegated),
        }]
    };
    ValidatorBid {
        public_key: PublicKey::new(key),
        self_staked_amount: Motes::new(own),
        delegation_rate: 10,
        inactive: false,
        delegators,
    }
}

pub fn auction(bids: Vec<ValidatorBid>) -> AuctionState {
    AuctionState { bids }
}

/// Status of a node at `height` in `era` running `api_version`.
pub fn status(api_version: &str, height: u64, era_id: u64) -> NodeStatus {
    NodeStatus {
        api_version: api_version.to_string(),
        next_upgrade: None,
        last_added_block: Some(BlockInfo { height, era_id }),
        peers: Vec::new(),
    }
}

pub fn with_next_upgrade(mut status: NodeStatus, protocol_version: &str) -> NodeStatus {
    status.next_upgrade = Some(NextUpgrade {
        protocol_version: protocol_version.to_string(),
        activation_point: None,
    });
    status
}

pub fn with_peers(mut status: NodeStatus, peers: &[(&str, &str)]) -> NodeStatus {
    status.peers = peers
        .iter()
        .map(|(node_id, address)| PeerEntry {
            node_id: node_id.to_string(),
            address: address.to_string(),
        })
        .collect();
    status
}

/// Seigniorage paid to `validator` itself.
pub fn validator_reward(validator: &str, amount: u128) -> RewardAllocation {
    RewardAllocation {
        recipient_kind: RecipientKind::Validator,
        recipient_key: PublicKey::new(validator),
        validator_key: PublicKey::new(validator),
        amount: Motes::new(amount),
    }
}

/// Seigniorage paid to `delegator` for stake delegated to `validator`.
pub fn delegator_reward(delegator: &str, validator: &str, amount: u128) -> RewardAllocation {
    RewardAllocation {
        recipient_kind: RecipientKind::Delegator,
        recipient_key: PublicKey::new(delegator),
        validator_key: PublicKey::new(validator),
        amount: Motes::new(amount),
    }
}

pub fn settlement(era_id: u64, block_height: u64, allocations: Vec<RewardAllocation>) -> EraSettlement {
    EraSettlement {
        era_id,
        block_height,
        allocations,
    }
}

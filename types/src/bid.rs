//! Auction (bid) state as reported by `state_get_auction_info`.

use serde::{Deserialize, Serialize};

use crate::{Motes, PublicKey};

/// A single delegation to a validator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegator {
    pub public_key: PublicKey,
    pub staked_amount: Motes,
}

/// A validator's stake declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorBid {
    pub public_key: PublicKey,
    pub self_staked_amount: Motes,
    /// Commission percentage taken from delegator rewards.
    pub delegation_rate: u8,
    pub inactive: bool,
    pub delegators: Vec<Delegator>,
}

impl ValidatorBid {
    pub fn delegator_staked_amount(&self) -> Motes {
        self.delegators.iter().map(|d| d.staked_amount).sum()
    }

    /// Self stake plus everything delegated to this validator.
    pub fn total_staked_amount(&self) -> Motes {
        self.self_staked_amount + self.delegator_staked_amount()
    }
}

/// The auction contract's view of all current bids.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionState {
    pub bids: Vec<ValidatorBid>,
}

impl AuctionState {
    pub fn find_bid(&self, key: &PublicKey) -> Option<&ValidatorBid> {
        self.bids.iter().find(|bid| &bid.public_key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(key: &str, own: u128, delegated: &[u128]) -> ValidatorBid {
        ValidatorBid {
            public_key: PublicKey::new(key),
            self_staked_amount: Motes::new(own),
            delegation_rate: 10,
            inactive: false,
            delegators: delegated
                .iter()
                .enumerate()
                .map(|(i, amount)| Delegator {
                    public_key: PublicKey::new(format!("02{i:02}")),
                    staked_amount: Motes::new(*amount),
                })
                .collect(),
        }
    }

    #[test]
    fn total_is_self_plus_delegated() {
        let b = bid("01aa", 100, &[20, 30]);
        assert_eq!(b.delegator_staked_amount(), Motes::new(50));
        assert_eq!(b.total_staked_amount(), Motes::new(150));
    }

    #[test]
    fn bid_without_delegators_has_zero_delegated() {
        let b = bid("01aa", 100, &[]);
        assert_eq!(b.delegator_staked_amount(), Motes::ZERO);
    }

    #[test]
    fn find_bid_ignores_key_case() {
        let state = AuctionState {
            bids: vec![bid("01aa", 1, &[]), bid("01bb", 2, &[])],
        };
        let found = state.find_bid(&PublicKey::new("01BB")).unwrap();
        assert_eq!(found.self_staked_amount, Motes::new(2));
        assert!(state.find_bid(&PublicKey::new("01cc")).is_none());
    }
}

//! Era settlement (seigniorage) records and the exporter's live reward record.

use serde::{Deserialize, Serialize};

use crate::{Motes, PublicKey};

/// Who a seigniorage allocation pays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecipientKind {
    Validator,
    Delegator,
}

/// One entry of an era's seigniorage allocations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardAllocation {
    pub recipient_kind: RecipientKind,
    /// The validator itself, or the delegator being paid.
    pub recipient_key: PublicKey,
    /// The validator the allocation is attributed to.
    pub validator_key: PublicKey,
    pub amount: Motes,
}

/// Era info stored at a switch block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraSettlement {
    pub era_id: u64,
    /// Height of the switch block the settlement was read from.
    pub block_height: u64,
    pub allocations: Vec<RewardAllocation>,
}

impl EraSettlement {
    /// Everything paid out on behalf of `validator`: its own allocation plus
    /// the allocations of its delegators.
    pub fn reward_for(&self, validator: &PublicKey) -> Motes {
        self.allocations
            .iter()
            .filter(|a| &a.validator_key == validator)
            .map(|a| a.amount)
            .sum()
    }
}

/// The single live reward figure published for the configured validator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EraRewardRecord {
    pub era_id: u64,
    /// Reward in whole coins.
    pub reward_amount: f64,
    pub apr: f64,
}

//! Stake derivations: rank, APR, activity and the validator snapshot.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use crate::{DeriveError, PublicKey, ValidatorBid};

/// 1-based position of `target` among `bids` ordered by descending total
/// stake (self + delegated). Equal totals keep their input order.
pub fn compute_rank(bids: &[ValidatorBid], target: &PublicKey) -> Result<usize, DeriveError> {
    let mut ordered: Vec<&ValidatorBid> = bids.iter().collect();
    ordered.sort_by_key(|bid| Reverse(bid.total_staked_amount()));
    ordered
        .iter()
        .position(|bid| &bid.public_key == target)
        .map(|index| index + 1)
        .ok_or_else(|| DeriveError::NotFound(target.clone()))
}

/// Eras per year for a chain producing `eras_per_day` eras.
pub fn annualization_factor(eras_per_day: u32) -> f64 {
    f64::from(eras_per_day) * 365.0
}

/// Annualized reward rate in percent. Zero when nothing is staked.
pub fn compute_apr(latest_reward: f64, total_staked: f64, annualization_factor: f64) -> f64 {
    if total_staked <= 0.0 || !total_staked.is_finite() {
        return 0.0;
    }
    latest_reward * annualization_factor / total_staked * 100.0
}

/// How the latest era reward feeds into the active flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityPolicy {
    /// Active requires a strictly positive latest reward.
    #[default]
    Positive,
    /// Active requires a latest reward different from zero.
    NonZero,
    /// Only the bid's inactive flag counts.
    Ignore,
}

impl ActivityPolicy {
    /// Whether a validator whose bid is `bid_inactive` and whose latest
    /// resolved reward is `latest_reward` counts as active. A reward that
    /// has not been resolved yet reads as zero.
    pub fn is_active(self, bid_inactive: bool, latest_reward: Option<f64>) -> bool {
        if bid_inactive {
            return false;
        }
        let reward = latest_reward.unwrap_or(0.0);
        match self {
            ActivityPolicy::Positive => reward > 0.0,
            ActivityPolicy::NonZero => reward != 0.0,
            ActivityPolicy::Ignore => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityPolicy::Positive => "positive",
            ActivityPolicy::NonZero => "non_zero",
            ActivityPolicy::Ignore => "ignore",
        }
    }
}

impl FromStr for ActivityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "positive" => Ok(ActivityPolicy::Positive),
            "non_zero" | "nonzero" => Ok(ActivityPolicy::NonZero),
            "ignore" => Ok(ActivityPolicy::Ignore),
            other => Err(format!(
                "unknown activity policy '{other}' (expected positive, non_zero or ignore)"
            )),
        }
    }
}

impl fmt::Display for ActivityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The poller's current view of the configured validator.
///
/// Amounts are in whole coins. `total_staked_amount` is always
/// `self_staked_amount + delegator_staked_amount`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSnapshot {
    pub self_staked_amount: f64,
    pub delegator_staked_amount: f64,
    pub total_staked_amount: f64,
    pub delegation_rate: u8,
    pub is_active: bool,
    /// `None` until the validator has been seen in the bid set.
    pub rank: Option<usize>,
    pub local_block_height: u64,
    pub local_era_id: u64,
    pub api_version: String,
    pub next_upgrade: Option<String>,
    pub peer_count: usize,
}

impl ValidatorSnapshot {
    /// Overwrite the stake fields from a bid, keeping the total consistent.
    pub fn apply_bid(&mut self, bid: &ValidatorBid) {
        self.self_staked_amount = bid.self_staked_amount.to_display();
        self.delegator_staked_amount = bid.delegator_staked_amount().to_display();
        self.total_staked_amount = self.self_staked_amount + self.delegator_staked_amount;
        self.delegation_rate = bid.delegation_rate;
    }
}

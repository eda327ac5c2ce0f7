//! The `casper_validator_*` gauge set.

use std::sync::Arc;

use crate::{GaugeHandle, MetricSurface, MetricsError};

pub const LABEL_ERA_ID: &str = "era_id";
pub const LABEL_NEXT_VERSION: &str = "next_version";
pub const LABEL_API_VERSION: &str = "api_version";
pub const LABEL_LOCAL_IP: &str = "local_ip";
pub const LABEL_PUBLIC_IP: &str = "public_ip";

/// Every gauge the exporter publishes, registered on one [`MetricSurface`].
#[derive(Clone)]
pub struct ValidatorMetrics {
    surface: Arc<MetricSurface>,

    // ── Bid state (poller) ──────────────────────────────────────────────
    pub self_staked_amount: GaugeHandle,
    pub delegator_staked_amount: GaugeHandle,
    pub total_staked_amount: GaugeHandle,
    pub delegation_rate: GaugeHandle,
    pub is_active: GaugeHandle,
    /// Rank among all bidding validators by total stake.
    pub position: GaugeHandle,

    // ── Node status (poller) ────────────────────────────────────────────
    pub block_local_height: GaugeHandle,
    pub block_local_era: GaugeHandle,
    pub peers: GaugeHandle,
    /// 1 while the node has an upgrade staged.
    pub next_upgrade: GaugeHandle,
    /// Info gauge (always 1) labelled with versions and addresses.
    pub build_version: GaugeHandle,

    // ── Rewards (era resolver) ──────────────────────────────────────────
    pub era_rewards: GaugeHandle,
    pub current_apr: GaugeHandle,

    // ── Fleet (version watcher) ─────────────────────────────────────────
    pub should_be_upgraded: GaugeHandle,
}

impl ValidatorMetrics {
    /// Register the full gauge set. Fails if any name is already taken,
    /// which is fatal at startup.
    pub fn register(surface: Arc<MetricSurface>) -> Result<Self, MetricsError> {
        let gauge = |name: &str, help: &str| surface.define_gauge(name, help, &[]);

        let self_staked_amount = gauge(
            "casper_validator_self_staked_amount",
            "Validator self-staked amount in CSPR",
        )?;
        let delegator_staked_amount = gauge(
            "casper_validator_delegator_staked_amount",
            "Amount delegated to the validator in CSPR",
        )?;
        let total_staked_amount = gauge(
            "casper_validator_total_staked_amount",
            "Validator total staked amount (self + delegated) in CSPR",
        )?;
        let delegation_rate = gauge(
            "casper_validator_delegation_rate",
            "Validator delegation rate in percent",
        )?;
        let is_active = gauge(
            "casper_validator_is_active",
            "1 when the validator bid is active and earning rewards",
        )?;
        let position = gauge(
            "casper_validator_position",
            "Validator rank among all bids by total stake",
        )?;
        let block_local_height = gauge(
            "casper_validator_block_local_height",
            "Height of the last block added by the local node",
        )?;
        let block_local_era = gauge(
            "casper_validator_block_local_era",
            "Era of the last block added by the local node",
        )?;
        let peers = gauge("casper_validator_peers", "Number of peers of the local node")?;
        let next_upgrade = gauge(
            "casper_validator_next_upgrade",
            "1 when the local node has a protocol upgrade staged",
        )?;
        let build_version = surface.define_gauge(
            "casper_validator_build_version",
            "Local node version information",
            &[
                LABEL_API_VERSION,
                LABEL_NEXT_VERSION,
                LABEL_LOCAL_IP,
                LABEL_PUBLIC_IP,
            ],
        )?;
        let era_rewards = surface.define_gauge(
            "casper_validator_era_rewards",
            "Validator rewards in CSPR for the latest settled era",
            &[LABEL_ERA_ID],
        )?;
        let current_apr = gauge(
            "casper_validator_current_apr",
            "Annualized reward rate in percent based on the latest era",
        )?;
        let should_be_upgraded = surface.define_gauge(
            "casper_validator_should_be_upgraded",
            "1 when peer nodes run or announce a newer protocol version",
            &[LABEL_NEXT_VERSION],
        )?;

        Ok(Self {
            surface,
            self_staked_amount,
            delegator_staked_amount,
            total_staked_amount,
            delegation_rate,
            is_active,
            position,
            block_local_height,
            block_local_era,
            peers,
            next_upgrade,
            build_version,
            era_rewards,
            current_apr,
            should_be_upgraded,
        })
    }

    pub fn surface(&self) -> &Arc<MetricSurface> {
        &self.surface
    }

    /// Names of every gauge in the set.
    pub fn names(&self) -> Vec<&str> {
        [
            &self.self_staked_amount,
            &self.delegator_staked_amount,
            &self.total_staked_amount,
            &self.delegation_rate,
            &self.is_active,
            &self.position,
            &self.block_local_height,
            &self.block_local_era,
            &self.peers,
            &self.next_upgrade,
            &self.build_version,
            &self.era_rewards,
            &self.current_apr,
            &self.should_be_upgraded,
        ]
        .into_iter()
        .map(GaugeHandle::name)
        .collect()
    }
}

//! Era reward resolution.
//!
//! On every era change the resolver walks back from the node's latest block
//! until it finds the switch block that settled the previous era, then
//! publishes that era's reward for our validator and the APR it implies.
//! Only one resolution runs at a time; triggers that arrive meanwhile are
//! coalesced into the newest one.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::Instrument;

use casper_exporter_metrics::{ValidatorMetrics, LABEL_ERA_ID};
use casper_exporter_rpc::NodeRpc;
use casper_exporter_types::{
    compute_apr, EraRewardRecord, EraSettlement, PublicKey, ValidatorSnapshot,
};

use crate::schedule::panic_message;
use crate::tracing_spans::era_resolution_span;
use crate::ExporterError;

/// Emitted by the poller when the node's era differs from the last one seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EraChange {
    /// `None` on the first successful poll.
    pub previous: Option<u64>,
    pub current: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Published(EraRewardRecord),
    /// The settlement found belongs to the era already on display.
    AlreadyPublished(u64),
}

pub struct EraRewardResolver {
    rpc: Arc<dyn NodeRpc>,
    metrics: ValidatorMetrics,
    validator: PublicKey,
    annualization_factor: f64,
    step_delay: Duration,
    max_steps: u64,
    snapshot_rx: watch::Receiver<ValidatorSnapshot>,
    record_tx: watch::Sender<Option<EraRewardRecord>>,
}

impl EraRewardResolver {
    pub fn new(
        rpc: Arc<dyn NodeRpc>,
        metrics: ValidatorMetrics,
        validator: PublicKey,
        annualization_factor: f64,
        snapshot_rx: watch::Receiver<ValidatorSnapshot>,
    ) -> Self {
        let (record_tx, _) = watch::channel(None);
        Self {
            rpc,
            metrics,
            validator,
            annualization_factor,
            step_delay: Duration::from_secs(1),
            max_steps: 2000,
            snapshot_rx,
            record_tx,
        }
    }

    /// Pause between heights and the maximum number of steps back.
    pub fn with_search_limits(mut self, step_delay: Duration, max_steps: u64) -> Self {
        self.step_delay = step_delay;
        self.max_steps = max_steps;
        self
    }

    /// Receiver of the latest published reward record.
    pub fn subscribe_records(&self) -> watch::Receiver<Option<EraRewardRecord>> {
        self.record_tx.subscribe()
    }

    pub fn latest_record(&self) -> Option<EraRewardRecord> {
        self.record_tx.borrow().clone()
    }

    /// Resolve the era that ended at or before the node's latest block.
    ///
    /// On any error the previously published reward stays in place.
    pub async fn resolve(&self, change: EraChange) -> Result<Resolution, ExporterError> {
        let start_height = self.rpc.latest_block_height().await?;
        let settlement = self.find_settlement(start_height).await?;

        if let Some(published) = self.latest_record() {
            if published.era_id == settlement.era_id {
                return Ok(Resolution::AlreadyPublished(published.era_id));
            }
        }

        let reward = settlement.reward_for(&self.validator).to_display();
        let total_staked = self.snapshot_rx.borrow().total_staked_amount;
        let record = EraRewardRecord {
            era_id: settlement.era_id,
            reward_amount: reward,
            apr: compute_apr(reward, total_staked, self.annualization_factor),
        };

        {
            let era_label = record.era_id.to_string();
            let mut batch = self.metrics.surface().batch();
            batch.reset_and_set(
                &self.metrics.era_rewards,
                &[(LABEL_ERA_ID, era_label.as_str())],
                record.reward_amount,
            )?;
            batch.set(&self.metrics.current_apr, &[], record.apr)?;
        }
        self.record_tx.send_replace(Some(record.clone()));

        tracing::info!(
            trigger = change.current,
            era = record.era_id,
            switch_block = settlement.block_height,
            reward = record.reward_amount,
            apr = record.apr,
            "era reward published"
        );
        Ok(Resolution::Published(record))
    }

    /// Walk back from `start_height` to the nearest switch block.
    ///
    /// Queries `start_height` down to `start_height - max_steps` inclusive.
    pub async fn find_settlement(&self, start_height: u64) -> Result<EraSettlement, ExporterError> {
        let mut height = start_height;
        let mut steps = 0u64;
        loop {
            if let Some(settlement) = self.rpc.era_settlement_at_height(height).await? {
                tracing::debug!(height, steps, era = settlement.era_id, "switch block found");
                return Ok(settlement);
            }
            if height == 0 {
                return Err(ExporterError::EraSettlementMissing { start_height });
            }
            if steps >= self.max_steps {
                return Err(ExporterError::EraResolutionTimeout { start_height, steps });
            }
            steps += 1;
            height -= 1;
            if !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
        }
    }

    /// Serve era changes until shutdown or until every sender is gone.
    pub async fn run(self, mut era_rx: mpsc::Receiver<EraChange>, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            let mut change = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                change = era_rx.recv() => match change {
                    Some(change) => change,
                    None => break,
                },
            };
            while let Ok(newer) = era_rx.try_recv() {
                change = newer;
            }

            let attempt = AssertUnwindSafe(self.resolve(change))
                .catch_unwind()
                .instrument(era_resolution_span(change.current));
            let outcome = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                outcome = attempt => outcome,
            };
            match outcome {
                Ok(Ok(Resolution::Published(_))) => {}
                Ok(Ok(Resolution::AlreadyPublished(era))) => {
                    tracing::debug!(era, "era reward already published");
                }
                Ok(Err(e)) => {
                    tracing::warn!(era = change.current, "era resolution failed: {e}");
                }
                Err(panic) => {
                    tracing::error!(
                        era = change.current,
                        "era resolution panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        tracing::info!(task = "era_resolution", "task shutting down");
    }
}

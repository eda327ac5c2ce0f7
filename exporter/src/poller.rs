//! Node state poller: bid state and node status, once per interval.
//!
//! Both fetches run concurrently and are applied independently, so a failed
//! status call still refreshes stake gauges and vice versa. Any failure
//! clears the active flag; every other gauge keeps its last value.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use casper_exporter_metrics::{
    ValidatorMetrics, LABEL_API_VERSION, LABEL_LOCAL_IP, LABEL_NEXT_VERSION, LABEL_PUBLIC_IP,
};
use casper_exporter_rpc::{endpoint_host, NodeRpc};
use casper_exporter_types::{
    compute_rank, ActivityPolicy, AuctionState, BlockInfo, EraRewardRecord, NodeStatus,
    PublicKey, ValidatorSnapshot,
};

use crate::era_resolver::EraChange;
use crate::schedule::PeriodicTask;
use crate::tracing_spans::poll_cycle_span;
use crate::ExporterError;

/// What one poll achieved.
#[derive(Debug, Default)]
pub struct PollReport {
    /// Set when this poll observed a new era (including the first poll).
    pub era_change: Option<EraChange>,
    pub errors: Vec<ExporterError>,
}

impl PollReport {
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct NodeStatePoller {
    rpc: Arc<dyn NodeRpc>,
    metrics: ValidatorMetrics,
    validator: PublicKey,
    policy: ActivityPolicy,
    local_ip: String,
    snapshot: ValidatorSnapshot,
    last_era: Option<u64>,
    snapshot_tx: watch::Sender<ValidatorSnapshot>,
    era_tx: Option<mpsc::Sender<EraChange>>,
    reward_rx: watch::Receiver<Option<EraRewardRecord>>,
    public_ip_rx: watch::Receiver<Option<String>>,
}

impl NodeStatePoller {
    pub fn new(
        rpc: Arc<dyn NodeRpc>,
        metrics: ValidatorMetrics,
        validator: PublicKey,
        policy: ActivityPolicy,
    ) -> Self {
        let local_ip = endpoint_host(rpc.endpoint()).unwrap_or_default();
        let (snapshot_tx, _) = watch::channel(ValidatorSnapshot::default());
        Self {
            rpc,
            metrics,
            validator,
            policy,
            local_ip,
            snapshot: ValidatorSnapshot::default(),
            last_era: None,
            snapshot_tx,
            era_tx: None,
            reward_rx: watch::channel(None).1,
            public_ip_rx: watch::channel(None).1,
        }
    }

    /// Era transitions are sent here without blocking the poll.
    pub fn with_era_trigger(mut self, era_tx: mpsc::Sender<EraChange>) -> Self {
        self.era_tx = Some(era_tx);
        self
    }

    /// Latest resolved era reward, consulted by the activity policy.
    pub fn with_reward_feed(mut self, reward_rx: watch::Receiver<Option<EraRewardRecord>>) -> Self {
        self.reward_rx = reward_rx;
        self
    }

    /// Public IP discovered by the fleet watcher, used as a label.
    pub fn with_public_ip_feed(mut self, public_ip_rx: watch::Receiver<Option<String>>) -> Self {
        self.public_ip_rx = public_ip_rx;
        self
    }

    /// Receiver of the snapshot published after every poll.
    pub fn subscribe_snapshot(&self) -> watch::Receiver<ValidatorSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> &ValidatorSnapshot {
        &self.snapshot
    }

    /// Fetch, derive and publish once.
    pub async fn poll_once(&mut self) -> PollReport {
        let (bids, status) = tokio::join!(self.rpc.validator_bid_state(), self.rpc.node_status());

        let mut report = PollReport::default();
        let bid_inactive = match bids {
            Ok(auction) => self.absorb_bids(&auction).map_err(|e| report.errors.push(e)).ok(),
            Err(e) => {
                report.errors.push(e.into());
                None
            }
        };
        let node = match status {
            Ok(status) => self.absorb_status(&status).map_err(|e| report.errors.push(e)).ok(),
            Err(e) => {
                report.errors.push(e.into());
                None
            }
        };

        let latest_reward = self.reward_rx.borrow().as_ref().map(|record| record.reward_amount);
        self.snapshot.is_active = report.errors.is_empty()
            && bid_inactive.is_some_and(|inactive| self.policy.is_active(inactive, latest_reward));

        if let Err(e) = self.publish(bid_inactive.is_some(), node.is_some()) {
            report.errors.push(e);
        }
        self.snapshot_tx.send_replace(self.snapshot.clone());

        if let Some(block) = node {
            report.era_change = self.observe_era(block.era_id);
        }
        report
    }

    /// Returns the bid's inactive flag.
    fn absorb_bids(&mut self, auction: &AuctionState) -> Result<bool, ExporterError> {
        let bid = auction
            .find_bid(&self.validator)
            .ok_or_else(|| ExporterError::ValidatorNotFound(self.validator.clone()))?;
        self.snapshot.apply_bid(bid);
        self.snapshot.rank = Some(compute_rank(&auction.bids, &self.validator)?);
        Ok(bid.inactive)
    }

    fn absorb_status(&mut self, status: &NodeStatus) -> Result<BlockInfo, ExporterError> {
        let block = status
            .last_added_block
            .ok_or_else(|| ExporterError::NoBlocks(self.rpc.endpoint().to_string()))?;
        self.snapshot.local_block_height = block.height;
        self.snapshot.local_era_id = block.era_id;
        self.snapshot.api_version = status.api_version.clone();
        self.snapshot.next_upgrade = status.next_protocol_version().map(str::to_string);
        self.snapshot.peer_count = status.peers.len();
        Ok(block)
    }

    /// Write everything this poll refreshed as one batch.
    fn publish(&self, bids_fresh: bool, status_fresh: bool) -> Result<(), ExporterError> {
        let metrics = &self.metrics;
        let snapshot = &self.snapshot;
        let public_ip = self.public_ip_rx.borrow().clone().unwrap_or_default();

        let mut batch = metrics.surface().batch();
        if bids_fresh {
            batch.set(&metrics.self_staked_amount, &[], snapshot.self_staked_amount)?;
            batch.set(&metrics.delegator_staked_amount, &[], snapshot.delegator_staked_amount)?;
            batch.set(&metrics.total_staked_amount, &[], snapshot.total_staked_amount)?;
            batch.set(&metrics.delegation_rate, &[], f64::from(snapshot.delegation_rate))?;
            if let Some(rank) = snapshot.rank {
                batch.set(&metrics.position, &[], rank as f64)?;
            }
        }
        if status_fresh {
            batch.set(&metrics.block_local_height, &[], snapshot.local_block_height as f64)?;
            batch.set(&metrics.block_local_era, &[], snapshot.local_era_id as f64)?;
            batch.set(&metrics.peers, &[], snapshot.peer_count as f64)?;
            let staged = if snapshot.next_upgrade.is_some() { 1.0 } else { 0.0 };
            batch.set(&metrics.next_upgrade, &[], staged)?;
            batch.reset_and_set(
                &metrics.build_version,
                &[
                    (LABEL_API_VERSION, snapshot.api_version.as_str()),
                    (LABEL_NEXT_VERSION, snapshot.next_upgrade.as_deref().unwrap_or("")),
                    (LABEL_LOCAL_IP, self.local_ip.as_str()),
                    (LABEL_PUBLIC_IP, public_ip.as_str()),
                ],
                1.0,
            )?;
        }
        batch.set(&metrics.is_active, &[], if snapshot.is_active { 1.0 } else { 0.0 })?;
        Ok(())
    }

    fn observe_era(&mut self, era_id: u64) -> Option<EraChange> {
        if self.last_era == Some(era_id) {
            return None;
        }
        let change = EraChange {
            previous: self.last_era,
            current: era_id,
        };
        self.last_era = Some(era_id);
        tracing::info!(previous = ?change.previous, current = era_id, "era change observed");

        if let Some(era_tx) = &self.era_tx {
            match era_tx.try_send(change) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!("era resolution already queued, not queueing another");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!("era resolver is gone, era change dropped");
                }
            }
        }
        Some(change)
    }
}

#[async_trait]
impl PeriodicTask for NodeStatePoller {
    fn name(&self) -> &'static str {
        "node_state_poll"
    }

    async fn run_cycle(&mut self) {
        let span = poll_cycle_span(self.rpc.endpoint());
        let report = self.poll_once().instrument(span).await;
        for error in &report.errors {
            tracing::warn!("node state poll: {error}");
        }
        if report.is_healthy() {
            tracing::debug!(
                height = self.snapshot.local_block_height,
                era = self.snapshot.local_era_id,
                total_stake = self.snapshot.total_staked_amount,
                "node state poll succeeded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casper_exporter_metrics::{MetricSurface, LABEL_ERA_ID};
    use casper_exporter_nullables::{fixtures, NullNodeRpc};
    use std::time::Duration;
    use tokio::sync::broadcast;

    use crate::schedule::run_periodic;

    const OURS: &str = "01aa";
    const CSPR: u128 = 1_000_000_000;

    fn metrics() -> ValidatorMetrics {
        ValidatorMetrics::register(Arc::new(MetricSurface::new())).unwrap()
    }

    fn healthy_node() -> Arc<NullNodeRpc> {
        Arc::new(
            NullNodeRpc::new("http://10.1.2.3:7777/rpc")
                .with_auction(fixtures::auction(vec![
                    fixtures::bid("01bb", 900 * CSPR, 0),
                    fixtures::bid(OURS, 100 * CSPR, 50 * CSPR),
                    fixtures::bid("01cc", 10 * CSPR, 0),
                ]))
                .with_status(fixtures::with_peers(
                    fixtures::status("1.5.6", 1200, 11),
                    &[("tls:1", "10.0.0.1:35000"), ("tls:2", "10.0.0.2:35000")],
                )),
        )
    }

    fn new_poller(rpc: Arc<NullNodeRpc>, metrics: &ValidatorMetrics, policy: ActivityPolicy) -> NodeStatePoller {
        NodeStatePoller::new(rpc, metrics.clone(), PublicKey::new(OURS), policy)
    }

    fn value(metrics: &ValidatorMetrics, handle: &casper_exporter_metrics::GaugeHandle) -> f64 {
        metrics.surface().value(handle, &[]).unwrap()
    }

    #[tokio::test]
    async fn successful_poll_publishes_stake_and_status() {
        let metrics = metrics();
        let mut poller = new_poller(healthy_node(), &metrics, ActivityPolicy::Ignore);

        let report = poller.poll_once().await;
        assert!(report.is_healthy(), "{:?}", report.errors);

        assert_eq!(value(&metrics, &metrics.self_staked_amount), 100.0);
        assert_eq!(value(&metrics, &metrics.delegator_staked_amount), 50.0);
        assert_eq!(value(&metrics, &metrics.total_staked_amount), 150.0);
        assert_eq!(value(&metrics, &metrics.delegation_rate), 10.0);
        assert_eq!(value(&metrics, &metrics.position), 2.0);
        assert_eq!(value(&metrics, &metrics.block_local_height), 1200.0);
        assert_eq!(value(&metrics, &metrics.block_local_era), 11.0);
        assert_eq!(value(&metrics, &metrics.peers), 2.0);
        assert_eq!(value(&metrics, &metrics.next_upgrade), 0.0);
        assert_eq!(value(&metrics, &metrics.is_active), 1.0);

        let build = metrics.surface().points(&metrics.build_version);
        assert_eq!(build.len(), 1);
        assert_eq!(build[0].0.get(LABEL_API_VERSION).map(String::as_str), Some("1.5.6"));
        assert_eq!(build[0].0.get(LABEL_LOCAL_IP).map(String::as_str), Some("10.1.2.3"));
        assert_eq!(build[0].1, 1.0);
    }

    #[tokio::test]
    async fn first_poll_counts_as_an_era_change() {
        let metrics = metrics();
        let rpc = healthy_node();
        let (era_tx, mut era_rx) = mpsc::channel(1);
        let mut poller = new_poller(Arc::clone(&rpc), &metrics, ActivityPolicy::Ignore).with_era_trigger(era_tx);

        let report = poller.poll_once().await;
        let change = report.era_change.expect("first poll observes an era");
        assert_eq!(change, EraChange { previous: None, current: 11 });
        assert_eq!(era_rx.try_recv().unwrap(), change);

        assert!(poller.poll_once().await.era_change.is_none());
        assert!(era_rx.try_recv().is_err());

        rpc.set_status(fixtures::status("1.5.6", 1300, 12));
        let change = poller.poll_once().await.era_change.unwrap();
        assert_eq!(change, EraChange { previous: Some(11), current: 12 });
    }

    #[tokio::test]
    async fn failed_fetch_clears_active_and_keeps_everything_else() {
        let metrics = metrics();
        let rpc = healthy_node();
        let mut poller = new_poller(Arc::clone(&rpc), &metrics, ActivityPolicy::Ignore);
        poller.poll_once().await;
        metrics
            .surface()
            .reset_and_set(&metrics.era_rewards, &[(LABEL_ERA_ID, "5")], 42.0)
            .unwrap();

        rpc.fail_all(true);
        let report = poller.poll_once().await;
        assert_eq!(report.errors.len(), 2);
        assert!(report.era_change.is_none());

        assert_eq!(value(&metrics, &metrics.is_active), 0.0);
        assert_eq!(value(&metrics, &metrics.total_staked_amount), 150.0);
        assert_eq!(value(&metrics, &metrics.block_local_height), 1200.0);
        assert_eq!(
            metrics.surface().value(&metrics.era_rewards, &[(LABEL_ERA_ID, "5")]),
            Some(42.0)
        );
    }

    #[tokio::test]
    async fn status_failure_still_refreshes_stake() {
        let metrics = metrics();
        let rpc = healthy_node();
        rpc.fail_status(true);
        let mut poller = new_poller(Arc::clone(&rpc), &metrics, ActivityPolicy::Ignore);

        let report = poller.poll_once().await;
        assert_eq!(report.errors.len(), 1);
        assert_eq!(value(&metrics, &metrics.total_staked_amount), 150.0);
        assert_eq!(value(&metrics, &metrics.block_local_height), 0.0);
        assert_eq!(value(&metrics, &metrics.is_active), 0.0);
    }

    #[tokio::test]
    async fn bid_failure_still_refreshes_status() {
        let metrics = metrics();
        let rpc = healthy_node();
        rpc.fail_bids(true);
        let mut poller = new_poller(Arc::clone(&rpc), &metrics, ActivityPolicy::Ignore);

        let report = poller.poll_once().await;
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(report.errors[0], ExporterError::Rpc(_)));
        assert_eq!(value(&metrics, &metrics.block_local_height), 1200.0);
        assert_eq!(value(&metrics, &metrics.total_staked_amount), 0.0);
        assert_eq!(value(&metrics, &metrics.is_active), 0.0);

        rpc.fail_bids(false);
        assert!(poller.poll_once().await.is_healthy());
        assert_eq!(value(&metrics, &metrics.total_staked_amount), 150.0);
    }

    #[tokio::test]
    async fn slow_node_polls_do_not_pile_up() {
        let latency = Duration::from_millis(50);
        let rpc = Arc::new(
            NullNodeRpc::new("http://10.1.2.3:7777/rpc")
                .with_latency(latency)
                .with_auction(fixtures::auction(vec![fixtures::bid(OURS, 100 * CSPR, 0)]))
                .with_status(fixtures::status("1.5.6", 1200, 11)),
        );
        let metrics = metrics();
        let poller = new_poller(Arc::clone(&rpc), &metrics, ActivityPolicy::Ignore);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let begin = std::time::Instant::now();
        let schedule = tokio::spawn(run_periodic(poller, Duration::from_millis(5), shutdown_rx));
        tokio::time::timeout(Duration::from_secs(5), async {
            while rpc.calls().bids < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("polls did not complete in time");
        shutdown_tx.send(()).unwrap();
        schedule.await.unwrap();
        let elapsed = begin.elapsed();

        let calls = rpc.calls();
        let bound = (elapsed.as_millis() / latency.as_millis()) as usize + 1;
        assert!(calls.bids <= bound, "{} bid fetches in {elapsed:?}", calls.bids);
        assert!(calls.status <= bound, "{} status fetches in {elapsed:?}", calls.status);
    }

    #[tokio::test]
    async fn missing_validator_is_reported_and_inactive() {
        let metrics = metrics();
        let rpc = healthy_node();
        rpc.set_auction(fixtures::auction(vec![fixtures::bid("01bb", CSPR, 0)]));
        let mut poller = new_poller(rpc, &metrics, ActivityPolicy::Ignore);

        let report = poller.poll_once().await;
        assert!(matches!(report.errors.as_slice(), [ExporterError::ValidatorNotFound(_)]));
        assert_eq!(value(&metrics, &metrics.is_active), 0.0);
        assert_eq!(value(&metrics, &metrics.position), 0.0);
    }

    #[tokio::test]
    async fn positive_policy_needs_a_rewarded_era() {
        let metrics = metrics();
        let (reward_tx, reward_rx) = watch::channel(None);
        let mut poller =
            new_poller(healthy_node(), &metrics, ActivityPolicy::Positive).with_reward_feed(reward_rx);

        poller.poll_once().await;
        assert_eq!(value(&metrics, &metrics.is_active), 0.0);

        reward_tx.send_replace(Some(EraRewardRecord { era_id: 10, reward_amount: 5.0, apr: 1.0 }));
        poller.poll_once().await;
        assert_eq!(value(&metrics, &metrics.is_active), 1.0);
        assert!(poller.snapshot().is_active);
    }

    #[tokio::test]
    async fn build_version_carries_staged_upgrade_and_public_ip() {
        let metrics = metrics();
        let rpc = healthy_node();
        rpc.set_status(fixtures::with_next_upgrade(fixtures::status("1.5.6", 1200, 11), "2.0.0"));
        let (_ip_tx, ip_rx) = watch::channel(Some("198.51.100.7".to_string()));
        let mut poller =
            new_poller(rpc, &metrics, ActivityPolicy::Ignore).with_public_ip_feed(ip_rx);

        poller.poll_once().await;
        assert_eq!(value(&metrics, &metrics.next_upgrade), 1.0);
        let build = metrics.surface().points(&metrics.build_version);
        assert_eq!(build.len(), 1);
        assert_eq!(build[0].0.get(LABEL_NEXT_VERSION).map(String::as_str), Some("2.0.0"));
        assert_eq!(build[0].0.get(LABEL_PUBLIC_IP).map(String::as_str), Some("198.51.100.7"));
    }

    #[tokio::test]
    async fn snapshot_is_published_to_subscribers() {
        let metrics = metrics();
        let mut poller = new_poller(healthy_node(), &metrics, ActivityPolicy::Ignore);
        let snapshot_rx = poller.subscribe_snapshot();

        poller.poll_once().await;
        let snapshot = snapshot_rx.borrow().clone();
        assert_eq!(snapshot.total_staked_amount, 150.0);
        assert_eq!(snapshot.rank, Some(2));
        assert_eq!(snapshot.local_era_id, 11);
    }
}

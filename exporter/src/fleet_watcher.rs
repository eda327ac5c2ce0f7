//! Fleet version watch: compares our node's protocol versions with those
//! reported by a set of peer nodes and flags when we fall behind.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::watch;
use tracing::Instrument;

use casper_exporter_metrics::{ValidatorMetrics, LABEL_NEXT_VERSION};
use casper_exporter_rpc::NodeRpc;
use casper_exporter_types::{FleetVersionState, NodeStatus, PeerVersion, ProtocolVersion};

use crate::schedule::PeriodicTask;
use crate::tracing_spans::fleet_scan_span;
use crate::ExporterError;

pub struct FleetVersionWatcher {
    own: Arc<dyn NodeRpc>,
    peers: Vec<Arc<dyn NodeRpc>>,
    metrics: ValidatorMetrics,
    node_id: Option<String>,
    public_ip_tx: watch::Sender<Option<String>>,
}

impl FleetVersionWatcher {
    pub fn new(own: Arc<dyn NodeRpc>, peers: Vec<Arc<dyn NodeRpc>>, metrics: ValidatorMetrics) -> Self {
        let (public_ip_tx, _) = watch::channel(None);
        Self {
            own,
            peers,
            metrics,
            node_id: None,
            public_ip_tx,
        }
    }

    /// Look our node up in peers' peer tables to learn its public IP.
    pub fn with_node_id(mut self, node_id: Option<String>) -> Self {
        self.node_id = node_id;
        self
    }

    /// Receiver of the public IP discovered through the peers.
    pub fn subscribe_public_ip(&self) -> watch::Receiver<Option<String>> {
        self.public_ip_tx.subscribe()
    }

    /// Query our node and every peer, then publish the upgrade indicator.
    ///
    /// Nothing is published when our own node cannot be read or when no
    /// configured peer answers; the previous indicator stays in place.
    pub async fn scan(&self) -> Result<FleetVersionState, ExporterError> {
        let own = self.own.node_status().await?;
        let our_current: ProtocolVersion = own.api_version.parse()?;
        let our_next = own
            .next_protocol_version()
            .map(str::parse::<ProtocolVersion>)
            .transpose()?;

        let answers = join_all(self.peers.iter().map(|peer| async move {
            (peer.endpoint().to_string(), peer.node_status().await)
        }))
        .await;

        let mut reachable = Vec::with_capacity(answers.len());
        for (endpoint, answer) in answers {
            match answer {
                Ok(status) => reachable.push((endpoint, status)),
                Err(e) => tracing::warn!(peer = %endpoint, "peer status failed: {e}"),
            }
        }
        if !self.peers.is_empty() && reachable.is_empty() {
            return Err(ExporterError::FleetUnreachable(self.peers.len()));
        }

        self.discover_public_ip(&reachable);
        let peer_versions = reachable
            .into_iter()
            .filter_map(|(endpoint, status)| peer_version(endpoint, &status))
            .collect();

        let state = FleetVersionState::evaluate(our_current, our_next, peer_versions);
        let target = state
            .target_version()
            .map(|version| version.to_string())
            .unwrap_or_default();
        let flag = if state.upgrade_required { 1.0 } else { 0.0 };
        self.metrics.surface().reset_and_set(
            &self.metrics.should_be_upgraded,
            &[(LABEL_NEXT_VERSION, target.as_str())],
            flag,
        )?;
        Ok(state)
    }

    fn discover_public_ip(&self, reachable: &[(String, NodeStatus)]) {
        let Some(node_id) = self.node_id.as_deref() else {
            return;
        };
        let found = reachable
            .iter()
            .find_map(|(_, status)| status.address_of(node_id));
        if let Some(ip) = found {
            let changed = self.public_ip_tx.send_if_modified(|current| {
                if current.as_deref() == Some(ip) {
                    return false;
                }
                *current = Some(ip.to_string());
                true
            });
            if changed {
                tracing::info!(public_ip = ip, "public IP discovered through peers");
            }
        }
    }
}

/// A peer whose versions do not parse is left out of the comparison.
fn peer_version(endpoint: String, status: &NodeStatus) -> Option<PeerVersion> {
    let current = match status.api_version.parse() {
        Ok(version) => version,
        Err(e) => {
            tracing::warn!(peer = %endpoint, "ignoring peer: {e}");
            return None;
        }
    };
    let next = status
        .next_protocol_version()
        .and_then(|next| next.parse().map_err(|e| tracing::warn!(peer = %endpoint, "{e}")).ok());
    Some(PeerVersion { endpoint, current, next })
}

#[async_trait]
impl PeriodicTask for FleetVersionWatcher {
    fn name(&self) -> &'static str {
        "fleet_version_scan"
    }

    async fn run_cycle(&mut self) {
        let span = fleet_scan_span(self.peers.len());
        match self.scan().instrument(span).await {
            Ok(state) if state.upgrade_required => tracing::warn!(
                current = %state.our_current_version,
                target = ?state.target_version().map(|v| v.to_string()),
                "node should be upgraded"
            ),
            Ok(state) => tracing::debug!(
                peers = state.peer_versions.len(),
                "fleet versions in line"
            ),
            Err(e) => tracing::warn!("fleet version scan failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casper_exporter_metrics::MetricSurface;
    use casper_exporter_nullables::{fixtures, NullNodeRpc};

    fn metrics() -> ValidatorMetrics {
        ValidatorMetrics::register(Arc::new(MetricSurface::new())).unwrap()
    }

    fn node(endpoint: &str, status: NodeStatus) -> Arc<NullNodeRpc> {
        Arc::new(NullNodeRpc::new(endpoint).with_status(status))
    }

    fn peers(nodes: &[&Arc<NullNodeRpc>]) -> Vec<Arc<dyn NodeRpc>> {
        nodes.iter().map(|node| Arc::clone(node) as Arc<dyn NodeRpc>).collect()
    }

    fn indicator(metrics: &ValidatorMetrics) -> Vec<(String, f64)> {
        metrics
            .surface()
            .points(&metrics.should_be_upgraded)
            .into_iter()
            .map(|(labels, value)| (labels.get(LABEL_NEXT_VERSION).cloned().unwrap_or_default(), value))
            .collect()
    }

    #[tokio::test]
    async fn peer_announcing_upgrade_flags_our_node() {
        let metrics = metrics();
        let own = node("own", fixtures::status("1.5.6", 10, 1));
        let peer = node("peer", fixtures::with_next_upgrade(fixtures::status("1.5.6", 10, 1), "2.0.0"));
        let watcher = FleetVersionWatcher::new(own, peers(&[&peer]), metrics.clone());

        let state = watcher.scan().await.unwrap();
        assert!(state.upgrade_required);
        assert_eq!(indicator(&metrics), vec![("2.0.0".to_string(), 1.0)]);
    }

    #[tokio::test]
    async fn lagging_peer_announcement_still_flags_unstaged_node() {
        let metrics = metrics();
        let own = node("own", fixtures::status("2.0.0", 10, 1));
        let peer = node("peer", fixtures::with_next_upgrade(fixtures::status("1.5.6", 10, 1), "2.0.0"));
        let watcher = FleetVersionWatcher::new(own, peers(&[&peer]), metrics.clone());

        let state = watcher.scan().await.unwrap();
        assert!(state.upgrade_required);
        assert_eq!(indicator(&metrics), vec![("2.0.0".to_string(), 1.0)]);
    }

    #[tokio::test]
    async fn staged_upgrade_matching_peers_clears_flag() {
        let metrics = metrics();
        let own = node("own", fixtures::with_next_upgrade(fixtures::status("1.5.6", 10, 1), "2.0.0"));
        let peer = node("peer", fixtures::with_next_upgrade(fixtures::status("1.5.6", 10, 1), "2.0.0"));
        let watcher = FleetVersionWatcher::new(own, peers(&[&peer]), metrics.clone());

        let state = watcher.scan().await.unwrap();
        assert!(!state.upgrade_required);
        assert_eq!(indicator(&metrics), vec![(String::new(), 0.0)]);
    }

    #[tokio::test]
    async fn unreachable_peer_is_isolated() {
        let metrics = metrics();
        let own = node("own", fixtures::status("1.5.5", 10, 1));
        let down = Arc::new(NullNodeRpc::new("down"));
        let up = node("up", fixtures::status("1.5.6", 10, 1));
        let watcher = FleetVersionWatcher::new(own, peers(&[&down, &up]), metrics.clone());

        let state = watcher.scan().await.unwrap();
        assert_eq!(state.peer_versions.len(), 1);
        assert!(state.upgrade_required);
        assert_eq!(indicator(&metrics), vec![("1.5.6".to_string(), 1.0)]);
    }

    #[tokio::test]
    async fn no_answers_keep_the_previous_indicator() {
        let metrics = metrics();
        let own = node("own", fixtures::status("1.5.6", 10, 1));
        let peer = node("peer", fixtures::with_next_upgrade(fixtures::status("1.5.6", 10, 1), "2.0.0"));
        let watcher = FleetVersionWatcher::new(own, peers(&[&peer]), metrics.clone());
        watcher.scan().await.unwrap();

        peer.fail_status(true);
        let err = watcher.scan().await.unwrap_err();
        assert!(matches!(err, ExporterError::FleetUnreachable(1)));
        assert_eq!(indicator(&metrics), vec![("2.0.0".to_string(), 1.0)]);
    }

    #[tokio::test]
    async fn own_node_failure_publishes_nothing() {
        let metrics = metrics();
        let own = Arc::new(NullNodeRpc::new("own"));
        let peer = node("peer", fixtures::with_next_upgrade(fixtures::status("1.5.6", 10, 1), "2.0.0"));
        let watcher = FleetVersionWatcher::new(own, peers(&[&peer]), metrics.clone());

        assert!(matches!(watcher.scan().await, Err(ExporterError::Rpc(_))));
        assert_eq!(indicator(&metrics), vec![(String::new(), 0.0)]);
    }

    #[tokio::test]
    async fn public_ip_is_learned_from_peer_tables() {
        let metrics = metrics();
        let own = node("own", fixtures::status("1.5.6", 10, 1));
        let peer = node(
            "peer",
            fixtures::with_peers(
                fixtures::status("1.5.6", 10, 1),
                &[("tls:other", "10.0.0.9:35000"), ("tls:ours", "203.0.113.4:35000")],
            ),
        );
        let watcher =
            FleetVersionWatcher::new(own, peers(&[&peer]), metrics).with_node_id(Some("tls:ours".into()));
        let public_ip = watcher.subscribe_public_ip();

        watcher.scan().await.unwrap();
        assert_eq!(public_ip.borrow().as_deref(), Some("203.0.113.4"));
    }
}

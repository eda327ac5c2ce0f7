//! The exporter: wires the node state poller, the era reward resolver, the
//! fleet version watcher and the scrape server together.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use casper_exporter_metrics::{MetricSurface, MetricsServer, ValidatorMetrics};
use casper_exporter_rpc::{JsonRpcClient, NodeRpc};
use casper_exporter_types::annualization_factor;

use crate::config::ExporterConfig;
use crate::era_resolver::EraRewardResolver;
use crate::fleet_watcher::FleetVersionWatcher;
use crate::poller::NodeStatePoller;
use crate::schedule::run_periodic;
use crate::shutdown::StopSignal;
use crate::ExporterError;

/// Era changes queued for the resolver. One pending change is enough: the
/// resolver always searches from the latest block.
const ERA_CHANGE_CAPACITY: usize = 1;
/// Timeout for waiting on background tasks during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Exporter {
    config: ExporterConfig,
    metrics: ValidatorMetrics,
    node_rpc: Arc<dyn NodeRpc>,
    peer_rpcs: Vec<Arc<dyn NodeRpc>>,
    stop_signal: StopSignal,
    /// Handles for spawned background tasks (joined during shutdown).
    task_handles: Vec<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Exporter {
    /// Build an exporter talking JSON-RPC to the configured nodes.
    pub fn new(config: ExporterConfig) -> Result<Self, ExporterError> {
        config.validate()?;
        let timeout = config.rpc_timeout();
        let node_rpc: Arc<dyn NodeRpc> = Arc::new(JsonRpcClient::new(&config.rpc_url, timeout)?);
        let peer_rpcs = config
            .peer_endpoints()
            .iter()
            .map(|endpoint| {
                JsonRpcClient::new(endpoint, timeout).map(|client| Arc::new(client) as Arc<dyn NodeRpc>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::with_rpc(config, node_rpc, peer_rpcs)
    }

    /// Build an exporter over the given RPC capabilities.
    pub fn with_rpc(
        config: ExporterConfig,
        node_rpc: Arc<dyn NodeRpc>,
        peer_rpcs: Vec<Arc<dyn NodeRpc>>,
    ) -> Result<Self, ExporterError> {
        config.validate()?;
        let metrics = ValidatorMetrics::register(Arc::new(MetricSurface::new()))?;
        Ok(Self {
            config,
            metrics,
            node_rpc,
            peer_rpcs,
            stop_signal: StopSignal::new(),
            task_handles: Vec::new(),
            local_addr: None,
        })
    }

    pub fn metrics(&self) -> &ValidatorMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    /// Address the scrape endpoint is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the scrape endpoint and spawn every task.
    pub async fn start(&mut self) -> Result<SocketAddr, ExporterError> {
        let config = &self.config;
        let validator = config.validator_key()?;
        tracing::info!(
            validator = %validator,
            rpc = %self.node_rpc.endpoint(),
            peers = self.peer_rpcs.len(),
            policy = %config.activity_policy,
            "starting exporter"
        );
        if let Some(url) = &config.performance_api_url {
            tracing::info!(performance_api = %url, "performance API configured");
        }

        let server = MetricsServer::bind(&config.listen_addr(), Arc::clone(self.metrics.surface())).await?;
        let local_addr = server.local_addr()?;

        let watcher = FleetVersionWatcher::new(
            Arc::clone(&self.node_rpc),
            self.peer_rpcs.clone(),
            self.metrics.clone(),
        )
        .with_node_id(config.node_id.clone());

        let (era_tx, era_rx) = mpsc::channel(ERA_CHANGE_CAPACITY);
        let mut poller = NodeStatePoller::new(
            Arc::clone(&self.node_rpc),
            self.metrics.clone(),
            validator.clone(),
            config.activity_policy,
        )
        .with_era_trigger(era_tx)
        .with_public_ip_feed(watcher.subscribe_public_ip());

        let resolver = EraRewardResolver::new(
            Arc::clone(&self.node_rpc),
            self.metrics.clone(),
            validator,
            annualization_factor(config.eras_per_day),
            poller.subscribe_snapshot(),
        )
        .with_search_limits(config.era_search_step_delay(), config.era_search_max_steps);
        poller = poller.with_reward_feed(resolver.subscribe_records());

        let poll_interval = config.poll_interval();
        let fleet_interval = config.fleet_scan_interval();

        let server_shutdown = self.stop_signal.notified();
        self.task_handles.push(tokio::spawn(async move {
            if let Err(e) = server.serve(server_shutdown).await {
                tracing::error!("metrics server failed: {e}");
            }
        }));
        self.task_handles.push(tokio::spawn(resolver.run(era_rx, self.stop_signal.subscribe())));
        self.task_handles.push(tokio::spawn(run_periodic(
            poller,
            poll_interval,
            self.stop_signal.subscribe(),
        )));
        self.task_handles.push(tokio::spawn(run_periodic(
            watcher,
            fleet_interval,
            self.stop_signal.subscribe(),
        )));

        self.local_addr = Some(local_addr);
        tracing::info!(%local_addr, "serving metrics");
        Ok(local_addr)
    }

    /// Start, then run until SIGINT or SIGTERM.
    pub async fn run(&mut self) -> Result<(), ExporterError> {
        self.start().await?;
        self.stop_signal.fire_on_termination().await;
        self.stop().await
    }

    /// Signal every task and wait for them to finish.
    pub async fn stop(&mut self) -> Result<(), ExporterError> {
        tracing::info!("exporter stopping");
        self.stop_signal.fire();

        let handles: Vec<JoinHandle<()>> = self.task_handles.drain(..).collect();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all).await.is_err() {
            tracing::warn!("shutdown timeout ({SHUTDOWN_TIMEOUT:?}), some tasks may still be running");
            return Err(ExporterError::ShutdownTimeout);
        }
        tracing::info!("exporter stopped");
        Ok(())
    }
}

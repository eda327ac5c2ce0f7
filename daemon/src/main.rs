//! Casper validator exporter daemon.

use std::path::{Path, PathBuf};

use anyhow::Context;
use casper_exporter_node::{init_logging, Exporter, ExporterConfig, LogFormat};
use casper_exporter_types::ActivityPolicy;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "casper-exporter",
    version,
    about = "Prometheus exporter for a Casper validator"
)]
struct Cli {
    /// JSON-RPC endpoint of the validator's node.
    #[arg(long, env = "RPC_URL")]
    rpc_url: Option<String>,

    /// Hex public key of the validator to report on.
    #[arg(long, env = "VALIDATOR_PUBLIC_KEY")]
    validator_public_key: Option<String>,

    /// Our node's id in peers' peer tables ("tls:…"), for public IP discovery.
    #[arg(long, env = "NODE_ID")]
    node_id: Option<String>,

    /// Address the scrape endpoint binds to.
    #[arg(long, env = "LISTEN_ADDRESS")]
    listen_address: Option<String>,

    /// Port the scrape endpoint listens on.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Peer nodes to compare versions with (comma-separated hosts or URLs).
    #[arg(long, env = "PEER_NODES", value_delimiter = ',')]
    peer_nodes: Vec<String>,

    /// Base URL of an external performance API.
    #[arg(long, env = "PERFORMANCE_API_URL")]
    performance_api_url: Option<String>,

    /// Seconds between node state polls.
    #[arg(long, env = "POLL_INTERVAL_SECS")]
    poll_interval_secs: Option<u64>,

    /// Seconds between fleet version scans.
    #[arg(long, env = "FLEET_SCAN_INTERVAL_SECS")]
    fleet_scan_interval_secs: Option<u64>,

    /// Milliseconds between heights during the era search.
    #[arg(long, env = "ERA_SEARCH_STEP_DELAY_MS")]
    era_search_step_delay_ms: Option<u64>,

    /// Maximum heights the era search may step back.
    #[arg(long, env = "ERA_SEARCH_MAX_STEPS")]
    era_search_max_steps: Option<u64>,

    /// Eras per day, used to annualize rewards.
    #[arg(long, env = "ERAS_PER_DAY")]
    eras_per_day: Option<u32>,

    /// How the latest reward feeds the active flag: positive, non_zero or ignore.
    #[arg(long, env = "ACTIVITY_POLICY", value_parser = parse_policy)]
    activity_policy: Option<ActivityPolicy>,

    /// Per-request RPC timeout in seconds.
    #[arg(long, env = "RPC_TIMEOUT_SECS")]
    rpc_timeout_secs: Option<u64>,

    /// Log format: "human" or "json".
    #[arg(long, env = "LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Run the exporter (default).
    Run,
    /// Validate the effective configuration and print it as TOML.
    CheckConfig,
}

fn parse_policy(s: &str) -> Result<ActivityPolicy, String> {
    s.parse()
}

/// Where the base configuration came from, for the startup log.
fn config_source(path: Option<&Path>) -> String {
    match path {
        Some(path) => format!("config file {}", path.display()),
        None => "flags and environment".to_string(),
    }
}

impl Cli {
    /// Merge flags over the file config (or defaults).
    fn into_config(self) -> anyhow::Result<(ExporterConfig, Command)> {
        let base = match &self.config {
            Some(path) => {
                let path = path.to_string_lossy();
                ExporterConfig::from_toml_file(&path)
                    .with_context(|| format!("loading config file {path}"))?
            }
            None => ExporterConfig::default(),
        };

        let config = ExporterConfig {
            rpc_url: self.rpc_url.unwrap_or(base.rpc_url),
            validator_public_key: self
                .validator_public_key
                .unwrap_or(base.validator_public_key),
            node_id: self.node_id.or(base.node_id),
            listen_address: self.listen_address.unwrap_or(base.listen_address),
            listen_port: self.port.unwrap_or(base.listen_port),
            peer_nodes: if self.peer_nodes.is_empty() {
                base.peer_nodes
            } else {
                self.peer_nodes
            },
            performance_api_url: self.performance_api_url.or(base.performance_api_url),
            poll_interval_secs: self.poll_interval_secs.unwrap_or(base.poll_interval_secs),
            fleet_scan_interval_secs: self
                .fleet_scan_interval_secs
                .unwrap_or(base.fleet_scan_interval_secs),
            era_search_step_delay_ms: self
                .era_search_step_delay_ms
                .unwrap_or(base.era_search_step_delay_ms),
            era_search_max_steps: self.era_search_max_steps.unwrap_or(base.era_search_max_steps),
            eras_per_day: self.eras_per_day.unwrap_or(base.eras_per_day),
            activity_policy: self.activity_policy.unwrap_or(base.activity_policy),
            rpc_timeout_secs: self.rpc_timeout_secs.unwrap_or(base.rpc_timeout_secs),
            log_format: self.log_format.unwrap_or(base.log_format),
            log_level: self.log_level.unwrap_or(base.log_level),
        };
        Ok((config, self.command.unwrap_or(Command::Run)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let source = config_source(cli.config.as_deref());
    let (config, command) = cli.into_config()?;

    if command == Command::CheckConfig {
        config.validate().context("invalid configuration")?;
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let format: LogFormat = config.log_format.parse()?;
    init_logging(format, &config.log_level)?;
    tracing::info!("loaded configuration from {source}");
    tracing::info!(
        validator = %config.validator_public_key,
        rpc = %config.rpc_url,
        peers = config.peer_nodes.len(),
        "starting exporter"
    );

    let mut exporter = Exporter::new(config).context("invalid configuration")?;
    exporter.run().await?;
    tracing::info!("exporter exited cleanly");
    Ok(())
}

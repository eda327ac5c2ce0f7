//! Exporter configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use casper_exporter_rpc::normalize_endpoint;
use casper_exporter_types::{ActivityPolicy, PublicKey};

use crate::ExporterError;

/// Configuration for the exporter.
///
/// Can be loaded from a TOML file via [`ExporterConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Only `validator_public_key` has
/// no usable default.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// JSON-RPC endpoint of the node running the validator.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Hex public key of the validator to report on.
    #[serde(default)]
    pub validator_public_key: String,

    /// Our node's id as it appears in other nodes' peer tables
    /// (`tls:…`). Enables public IP discovery.
    #[serde(default)]
    pub node_id: Option<String>,

    /// Address the scrape endpoint binds to.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Port the scrape endpoint listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Peer nodes compared against ours by the fleet version watcher.
    /// Bare hosts get the default RPC port and path.
    #[serde(default)]
    pub peer_nodes: Vec<String>,

    /// Base URL of an external performance API.
    #[serde(default)]
    pub performance_api_url: Option<String>,

    /// Seconds between node state polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seconds between fleet version scans.
    #[serde(default = "default_fleet_scan_interval_secs")]
    pub fleet_scan_interval_secs: u64,

    /// Pause between two heights of the backward era search.
    #[serde(default = "default_era_search_step_delay_ms")]
    pub era_search_step_delay_ms: u64,

    /// Maximum number of heights the era search may step back.
    #[serde(default = "default_era_search_max_steps")]
    pub era_search_max_steps: u64,

    /// Eras produced per day, used to annualize the per-era reward.
    #[serde(default = "default_eras_per_day")]
    pub eras_per_day: u32,

    /// How the latest era reward feeds the active flag.
    #[serde(default)]
    pub activity_policy: ActivityPolicy,

    /// Per-request RPC timeout in seconds.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_rpc_url() -> String {
    "http://127.0.0.1:7777/rpc".to_string()
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8111
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_fleet_scan_interval_secs() -> u64 {
    600
}

fn default_era_search_step_delay_ms() -> u64 {
    1000
}

fn default_era_search_max_steps() -> u64 {
    2000
}

fn default_eras_per_day() -> u32 {
    12
}

fn default_rpc_timeout_secs() -> u64 {
    10
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ExporterConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, ExporterError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ExporterError::Config(format!("{path}: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ExporterError> {
        toml::from_str(s).map_err(|e| ExporterError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ExporterError> {
        toml::to_string_pretty(self).map_err(|e| ExporterError::Config(e.to_string()))
    }

    /// Reject configurations the exporter cannot run with.
    pub fn validate(&self) -> Result<(), ExporterError> {
        self.validator_key()?;
        if self.rpc_url.trim().is_empty() {
            return Err(ExporterError::Config("rpc_url must not be empty".into()));
        }
        if self.poll_interval_secs == 0 || self.fleet_scan_interval_secs == 0 {
            return Err(ExporterError::Config(
                "poll and fleet scan intervals must be positive".into(),
            ));
        }
        if self.era_search_max_steps == 0 {
            return Err(ExporterError::Config(
                "era_search_max_steps must be positive".into(),
            ));
        }
        if self.eras_per_day == 0 {
            return Err(ExporterError::Config("eras_per_day must be positive".into()));
        }
        if self.rpc_timeout_secs == 0 {
            return Err(ExporterError::Config("rpc_timeout_secs must be positive".into()));
        }
        if let Some(url) = &self.performance_api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ExporterError::Config(format!(
                    "performance_api_url must be an http(s) URL, got '{url}'"
                )));
            }
        }
        Ok(())
    }

    /// The configured validator key, strictly parsed.
    pub fn validator_key(&self) -> Result<PublicKey, ExporterError> {
        self.validator_public_key.parse().map_err(|_| {
            ExporterError::Config(format!(
                "validator_public_key must be a hex public key, got '{}'",
                self.validator_public_key
            ))
        })
    }

    /// JSON-RPC URLs of the peer nodes.
    pub fn peer_endpoints(&self) -> Vec<String> {
        self.peer_nodes
            .iter()
            .map(|peer| peer.trim())
            .filter(|peer| !peer.is_empty())
            .map(normalize_endpoint)
            .collect()
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_address, self.listen_port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fleet_scan_interval(&self) -> Duration {
        Duration::from_secs(self.fleet_scan_interval_secs)
    }

    pub fn era_search_step_delay(&self) -> Duration {
        Duration::from_millis(self.era_search_step_delay_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            validator_public_key: String::new(),
            node_id: None,
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            peer_nodes: Vec::new(),
            performance_api_url: None,
            poll_interval_secs: default_poll_interval_secs(),
            fleet_scan_interval_secs: default_fleet_scan_interval_secs(),
            era_search_step_delay_ms: default_era_search_step_delay_ms(),
            era_search_max_steps: default_era_search_max_steps(),
            eras_per_day: default_eras_per_day(),
            activity_policy: ActivityPolicy::default(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

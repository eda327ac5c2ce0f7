use thiserror::Error;

use casper_exporter_types::PublicKey;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("rpc error: {0}")]
    Rpc(#[from] casper_exporter_rpc::RpcError),

    #[error("metrics error: {0}")]
    Metrics(#[from] casper_exporter_metrics::MetricsError),

    #[error("invalid chain data: {0}")]
    Derive(#[from] casper_exporter_types::DeriveError),

    #[error("validator {0} is not in the current bid set")]
    ValidatorNotFound(PublicKey),

    #[error("node at {0} has not added any block yet")]
    NoBlocks(String),

    #[error("no era settlement within {steps} blocks below height {start_height}")]
    EraResolutionTimeout { start_height: u64, steps: u64 },

    #[error("reached genesis below height {start_height} without an era settlement")]
    EraSettlementMissing { start_height: u64 },

    #[error("none of the {0} peer nodes answered")]
    FleetUnreachable(usize),

    #[error("config error: {0}")]
    Config(String),

    #[error("shutdown timeout")]
    ShutdownTimeout,
}

//! Casper validator exporter engine.
//!
//! Three tasks share one [`casper_exporter_metrics::MetricSurface`]: the
//! node state poller, the era reward resolver it triggers on era changes,
//! and the fleet version watcher. [`Exporter`] wires them to the scrape
//! endpoint.

pub mod config;
pub mod era_resolver;
pub mod error;
pub mod exporter;
pub mod fleet_watcher;
pub mod logging;
pub mod poller;
pub mod schedule;
pub mod shutdown;
pub mod tracing_spans;

pub use config::ExporterConfig;
pub use era_resolver::{EraChange, EraRewardResolver, Resolution};
pub use error::ExporterError;
pub use exporter::Exporter;
pub use fleet_watcher::FleetVersionWatcher;
pub use logging::{init_logging, LogFormat};
pub use poller::{NodeStatePoller, PollReport};
pub use schedule::{run_periodic, PeriodicTask};
pub use shutdown::StopSignal;

//! Span constructors shared by the exporter tasks, so log lines from one
//! cycle can be correlated.

use tracing::{debug_span, info_span, Span};

/// One node state poll.
pub fn poll_cycle_span(endpoint: &str) -> Span {
    debug_span!("poll_cycle", endpoint = %endpoint)
}

/// Resolving the reward of the era that just closed, triggered by the
/// transition into `era`.
pub fn era_resolution_span(era: u64) -> Span {
    info_span!("era_resolution", era = era)
}

/// One fleet version scan over `peers` peer nodes.
pub fn fleet_scan_span(peers: usize) -> Span {
    debug_span!("fleet_scan", peers = peers)
}

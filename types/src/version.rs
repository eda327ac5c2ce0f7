//! Protocol versions and the fleet upgrade posture derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DeriveError;

/// A `major.minor.patch` protocol version. Missing trailing components
/// read as zero, so `"2.0"` equals `"2.0.0"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ProtocolVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = DeriveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Build strings may carry a suffix ("1.5.6-abc123"); only the
        // numeric core is compared.
        let core = s.trim().split(['-', '+']).next().unwrap_or_default();
        let parts: Vec<&str> = core.split('.').collect();
        if core.is_empty() || parts.len() > 3 {
            return Err(DeriveError::InvalidVersion(s.to_string()));
        }
        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| DeriveError::InvalidVersion(s.to_string()))?;
        }
        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Versions reported by one peer node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerVersion {
    pub endpoint: String,
    pub current: ProtocolVersion,
    pub next: Option<ProtocolVersion>,
}

/// Our node's versions compared against the reachable peers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetVersionState {
    pub our_current_version: ProtocolVersion,
    pub our_next_version: Option<ProtocolVersion>,
    pub peer_versions: Vec<PeerVersion>,
    pub upgrade_required: bool,
}

impl FleetVersionState {
    /// Upgrade is required when a peer runs a newer version than ours, or
    /// when the highest upgrade announced by peers is not the one staged on
    /// our node.
    pub fn evaluate(
        our_current_version: ProtocolVersion,
        our_next_version: Option<ProtocolVersion>,
        peer_versions: Vec<PeerVersion>,
    ) -> Self {
        let mut state = Self {
            our_current_version,
            our_next_version,
            peer_versions,
            upgrade_required: false,
        };
        let behind = state
            .max_peer_current()
            .is_some_and(|max| max > our_current_version);
        let missing_next = state
            .observed_next_version()
            .is_some_and(|next| our_next_version != Some(next));
        state.upgrade_required = behind || missing_next;
        state
    }

    pub fn max_peer_current(&self) -> Option<ProtocolVersion> {
        self.peer_versions.iter().map(|peer| peer.current).max()
    }

    /// Highest upgrade announced by any peer.
    pub fn observed_next_version(&self) -> Option<ProtocolVersion> {
        self.peer_versions.iter().filter_map(|peer| peer.next).max()
    }

    /// Version an operator should move to, for labelling.
    pub fn target_version(&self) -> Option<ProtocolVersion> {
        if !self.upgrade_required {
            return None;
        }
        self.observed_next_version().or(self.max_peer_current())
    }
}

//! Node status as reported by `info_get_status`.

use serde::{Deserialize, Serialize};

/// Upgrade staged on a node but not yet activated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextUpgrade {
    pub protocol_version: String,
    /// Era (or raw activation point) at which the upgrade activates.
    pub activation_point: Option<String>,
}

/// The most recent block the node has added to its chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    pub era_id: u64,
}

/// An entry of a node's peer table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub node_id: String,
    /// `ip:port` as seen by the reporting node.
    pub address: String,
}

impl PeerEntry {
    /// Host part of [`address`](Self::address).
    pub fn host(&self) -> &str {
        match self.address.rsplit_once(':') {
            Some((host, _port)) => host.trim_start_matches('[').trim_end_matches(']'),
            None => &self.address,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub api_version: String,
    pub next_upgrade: Option<NextUpgrade>,
    /// `None` while the node has not added any block yet.
    pub last_added_block: Option<BlockInfo>,
    pub peers: Vec<PeerEntry>,
}

impl NodeStatus {
    pub fn next_protocol_version(&self) -> Option<&str> {
        self.next_upgrade
            .as_ref()
            .map(|upgrade| upgrade.protocol_version.as_str())
    }

    /// Host of our own node as seen by this node, looked up by node id.
    pub fn address_of(&self, node_id: &str) -> Option<&str> {
        self.peers
            .iter()
            .find(|peer| peer.node_id == node_id)
            .map(PeerEntry::host)
    }
}

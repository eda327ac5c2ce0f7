//! Fundamental types for the Casper validator exporter.
//!
//! This crate holds the chain data model shared by every other crate in the
//! workspace (bids, node status, era settlements, protocol versions) and the
//! pure derivations the exporter publishes: mote conversion, delegator sums,
//! validator rank, APR and fleet version posture. Nothing here performs I/O.

pub mod amount;
pub mod bid;
pub mod era;
pub mod error;
pub mod key;
pub mod stake;
pub mod status;
pub mod version;

pub use amount::{sum_delegator_stake, to_display_units, Motes, MOTES_PER_CSPR};
pub use bid::{AuctionState, Delegator, ValidatorBid};
pub use era::{EraRewardRecord, EraSettlement, RecipientKind, RewardAllocation};
pub use error::DeriveError;
pub use key::PublicKey;
pub use stake::{annualization_factor, compute_apr, compute_rank, ActivityPolicy, ValidatorSnapshot};
pub use status::{BlockInfo, NextUpgrade, NodeStatus, PeerEntry};
pub use version::{FleetVersionState, PeerVersion, ProtocolVersion};

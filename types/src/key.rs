//! Validator and delegator public keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DeriveError;

/// A Casper public key in hex form, tag byte included
/// (`01…` for ed25519, `02…` for secp256k1).
///
/// Nodes return checksummed mixed-case hex, so keys are stored lowercase
/// and compare case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey(String);

impl PublicKey {
    /// Wrap a key as reported by a node. No validation beyond normalization.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PublicKey {
    type Err = DeriveError;

    /// Strict parse for operator-supplied keys: non-empty, even-length hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty()
            || trimmed.len() % 2 != 0
            || !trimmed.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(DeriveError::InvalidPublicKey(s.to_string()));
        }
        Ok(Self::new(trimmed))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

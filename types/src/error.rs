//! Errors raised by the derivation functions.

use thiserror::Error;

use crate::PublicKey;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeriveError {
    #[error("validator {0} not found in bid set")]
    NotFound(PublicKey),

    #[error("invalid mote amount: {0}")]
    InvalidAmount(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid protocol version: {0}")]
    InvalidVersion(String),
}

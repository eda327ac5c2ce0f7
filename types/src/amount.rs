//! Stake amounts in motes and their conversion to display units (CSPR).
//!
//! The chain reports every amount as a decimal string of motes (a U512 on
//! the wire). Motes are kept as exact integers; the only rounding happens
//! when an amount is turned into an `f64` for publication.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

use crate::DeriveError;

/// Motes per whole coin.
pub const MOTES_PER_CSPR: u128 = 1_000_000_000;

/// An on-chain amount in motes.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Motes(u128);

impl Motes {
    pub const ZERO: Self = Self(0);

    pub fn new(raw: u128) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Amount in whole coins.
    pub fn to_display(self) -> f64 {
        to_display_units(self.0)
    }
}

impl Add for Motes {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl Sum for Motes {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Motes::ZERO, Add::add)
    }
}

impl FromStr for Motes {
    type Err = DeriveError;

    /// Parse a decimal mote string. Signs, fractions and exponents are
    /// rejected rather than truncated.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DeriveError::InvalidAmount(s.to_string()));
        }
        trimmed
            .parse::<u128>()
            .map(Self)
            .map_err(|_| DeriveError::InvalidAmount(s.to_string()))
    }
}

impl fmt::Display for Motes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} motes", self.0)
    }
}

/// Convert raw motes to whole coins.
///
/// Integer motes divided by [`MOTES_PER_CSPR`]; the fractional part is
/// kept. Both the integer-to-float conversion and the division round to
/// nearest, which is monotonic, so `a <= b` implies
/// `to_display_units(a) <= to_display_units(b)`.
pub fn to_display_units(raw_motes: u128) -> f64 {
    raw_motes as f64 / MOTES_PER_CSPR as f64
}

/// Sum of delegated stake in whole coins. Zero for no delegators.
pub fn sum_delegator_stake<'a, I>(amounts: I) -> f64
where
    I: IntoIterator<Item = &'a Motes>,
{
    amounts.into_iter().copied().sum::<Motes>().to_display()
}

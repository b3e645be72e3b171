//! Asset amounts and exchange-rate arithmetic.
//!
//! All arithmetic is checked: overflow is an error the caller has to deal
//! with, never a silent wrap, because every replica must agree on whether
//! an operation was valid.

use crate::object::{ObjectId, CORE_ASSET_ID};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops;
use thiserror::Error;

/// Errors from checked amount arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValueError {
    /// Addition or multiplication exceeded the representable range.
    #[error("amount overflow")]
    Overflow,
    /// Subtraction went below zero.
    #[error("amount underflow")]
    Underflow,
    /// A conversion was attempted with a price quoted in a different asset.
    #[error("price is quoted for asset {expected}, got {actual}")]
    AssetMismatch {
        /// The asset the price is quoted in.
        expected: ObjectId,
        /// The asset that was supplied.
        actual: ObjectId,
    },
}

/// A quantity of some asset, without the asset identity attached.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Share(pub u64);

impl Share {
    /// The zero amount.
    pub const ZERO: Share = Share(0);

    /// Returns the raw amount.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true when the amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl ops::Add for Share {
    type Output = Result<Share, ValueError>;

    fn add(self, other: Share) -> Self::Output {
        self.0
            .checked_add(other.0)
            .map(Share)
            .ok_or(ValueError::Overflow)
    }
}

impl ops::Sub for Share {
    type Output = Result<Share, ValueError>;

    fn sub(self, other: Share) -> Self::Output {
        self.0
            .checked_sub(other.0)
            .map(Share)
            .ok_or(ValueError::Underflow)
    }
}

impl fmt::Display for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An amount of a specific asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetAmount {
    /// The quantity.
    pub amount: Share,
    /// The asset the quantity is denominated in.
    pub asset_id: ObjectId,
}

impl AssetAmount {
    /// Creates an amount of an arbitrary asset.
    #[must_use]
    pub const fn new(amount: Share, asset_id: ObjectId) -> Self {
        Self { amount, asset_id }
    }

    /// Creates an amount of the network's core asset.
    #[must_use]
    pub const fn core(amount: Share) -> Self {
        Self {
            amount,
            asset_id: CORE_ASSET_ID,
        }
    }

    /// Returns true when denominated in the core asset.
    #[must_use]
    pub fn is_core(&self) -> bool {
        self.asset_id == CORE_ASSET_ID
    }
}

impl fmt::Display for AssetAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.amount, self.asset_id)
    }
}

/// An exchange rate between two assets, expressed as a ratio of amounts.
///
/// `base` and `quote` play the roles of numerator and denominator:
/// converting `n` units of the base asset yields
/// `ceil(n * quote.amount / base.amount)` units of the quote asset.
/// Rounding is always up, never in the payer's favor, so conversion is a
/// deterministic pure function across replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount of the asset being converted from.
    pub base: AssetAmount,
    /// Amount of the asset being converted to.
    pub quote: AssetAmount,
}

impl Price {
    /// Creates a price from base and quote amounts.
    #[must_use]
    pub const fn new(base: AssetAmount, quote: AssetAmount) -> Self {
        Self { base, quote }
    }

    /// The identity price on the core asset, used by the core asset's own
    /// exchange-rate slot.
    #[must_use]
    pub const fn core_identity() -> Self {
        Self {
            base: AssetAmount::core(Share(1)),
            quote: AssetAmount::core(Share(1)),
        }
    }

    /// Checks that both legs of the ratio are non-zero.
    pub fn validate(&self) -> Result<(), ValueError> {
        if self.base.amount.is_zero() || self.quote.amount.is_zero() {
            return Err(ValueError::Underflow);
        }
        Ok(())
    }

    /// Converts an amount of the base asset into the quote asset,
    /// rounding up.
    pub fn convert(&self, amount: AssetAmount) -> Result<AssetAmount, ValueError> {
        if amount.asset_id != self.base.asset_id {
            return Err(ValueError::AssetMismatch {
                expected: self.base.asset_id,
                actual: amount.asset_id,
            });
        }
        self.validate()?;

        let numer = u128::from(amount.amount.0) * u128::from(self.quote.amount.0);
        let denom = u128::from(self.base.amount.0);
        let converted = numer.div_ceil(denom);
        let converted = u64::try_from(converted).map_err(|_| ValueError::Overflow)?;
        Ok(AssetAmount::new(Share(converted), self.quote.asset_id))
    }
}

//! Fee schedules.
//!
//! Fees are quoted in the core asset. A schedule carries one parameter
//! set per operation kind plus a global scale in parts of
//! [`FEE_SCALE_DENOM`], applied after the per-kind calculation with
//! truncating division. Conversion into a non-core fee asset goes
//! through the asset's core exchange rate and rounds up, so scaling and
//! conversion both stay deterministic.

use crate::error::{LedgerError, LedgerResult};
use crate::operation::{Operation, OperationKind};
use crate::value::{AssetAmount, Price, Share, ValueError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Denominator of the schedule scale: a scale of 10_000 charges the
/// parameter amounts exactly.
pub const FEE_SCALE_DENOM: u64 = 10_000;

/// Per-kind fee parameters, all amounts core-denominated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeParameters {
    /// Parameters for [`OperationKind::Transfer`].
    Transfer {
        /// Flat component.
        fee: Share,
        /// Size component, per 1024 encoded bytes (truncating).
        price_per_kbyte: Share,
    },
    /// Parameters for [`OperationKind::AccountCreate`].
    AccountCreate {
        /// Flat registration fee.
        basic_fee: Share,
    },
    /// Parameters for [`OperationKind::AssetCreate`].
    AssetCreate {
        /// Fee for three-character symbols.
        symbol3_fee: Share,
        /// Fee for longer symbols.
        long_symbol_fee: Share,
    },
}

impl FeeParameters {
    /// The operation kind these parameters price.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            FeeParameters::Transfer { .. } => OperationKind::Transfer,
            FeeParameters::AccountCreate { .. } => OperationKind::AccountCreate,
            FeeParameters::AssetCreate { .. } => OperationKind::AssetCreate,
        }
    }
}

/// The active pricing of every operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    parameters: BTreeMap<OperationKind, FeeParameters>,
    scale: u64,
}

impl FeeSchedule {
    /// Builds a schedule from parameter sets, one per kind.
    pub fn new(
        parameters: impl IntoIterator<Item = FeeParameters>,
        scale: u64,
    ) -> LedgerResult<Self> {
        let mut map = BTreeMap::new();
        for params in parameters {
            let kind = params.kind();
            if map.insert(kind, params).is_some() {
                return Err(LedgerError::DuplicateFeeParameters { kind });
            }
        }
        Ok(Self {
            parameters: map,
            scale,
        })
    }

    /// The global scale, in parts of [`FEE_SCALE_DENOM`].
    #[must_use]
    pub fn scale(&self) -> u64 {
        self.scale
    }

    /// The parameters pricing one operation kind.
    pub fn parameters_for(&self, kind: OperationKind) -> LedgerResult<&FeeParameters> {
        self.parameters
            .get(&kind)
            .ok_or(LedgerError::MissingFeeParameters { kind })
    }

    /// Checks that every operation kind is priced.
    pub fn validate(&self) -> LedgerResult<()> {
        for kind in OperationKind::ALL {
            self.parameters_for(kind)?;
        }
        Ok(())
    }

    /// The scaled, core-denominated fee for an operation.
    pub fn base_core_fee(&self, operation: &Operation) -> LedgerResult<Share> {
        let params = self.parameters_for(operation.kind())?;
        let base = operation.calculate_base_fee(params)?;
        let scaled =
            u128::from(base.as_u64()) * u128::from(self.scale) / u128::from(FEE_SCALE_DENOM);
        let scaled = u64::try_from(scaled).map_err(|_| ValueError::Overflow)?;
        Ok(Share(scaled))
    }

    /// The fee for an operation, denominated in the operation's declared
    /// fee asset.
    ///
    /// For a core-asset fee this is the scaled core fee; for anything
    /// else the core fee is converted through `core_exchange_rate`,
    /// rounding up.
    pub fn calculate_fee(
        &self,
        operation: &Operation,
        core_exchange_rate: &Price,
    ) -> LedgerResult<AssetAmount> {
        let core_fee = AssetAmount::core(self.base_core_fee(operation)?);
        if operation.fee().is_core() {
            return Ok(core_fee);
        }
        Ok(core_exchange_rate.convert(core_fee)?)
    }
}

impl Default for FeeSchedule {
    /// A schedule with placeholder prices, charging parameter amounts
    /// exactly.
    fn default() -> Self {
        Self::new(
            [
                FeeParameters::Transfer {
                    fee: Share(20),
                    price_per_kbyte: Share(10),
                },
                FeeParameters::AccountCreate {
                    basic_fee: Share(500),
                },
                FeeParameters::AssetCreate {
                    symbol3_fee: Share(5_000),
                    long_symbol_fee: Share(1_000),
                },
            ],
            FEE_SCALE_DENOM,
        )
        .expect("static parameter list has no duplicate kinds")
    }
}

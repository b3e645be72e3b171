//! The closed set of ledger operations.
//!
//! Operations are pure data. Validation here is stateless (shape checks
//! only); everything that needs database state lives in the evaluator.

use crate::authority::{Authority, AuthorityClass};
use crate::error::{LedgerError, LedgerResult, Rejection};
use crate::fee::FeeParameters;
use crate::object::{ObjectId, CORE_ASSET_ID};
use crate::value::{AssetAmount, Price, Share};
use ledgerdb_codec::to_canonical_cbor;
use serde::{Deserialize, Serialize};

/// Discriminant of an operation, used to key fee parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Asset transfer between accounts.
    Transfer,
    /// Account registration.
    AccountCreate,
    /// Asset registration.
    AssetCreate,
}

impl OperationKind {
    /// Every kind, in a fixed order.
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Transfer,
        OperationKind::AccountCreate,
        OperationKind::AssetCreate,
    ];
}

/// The side effect an applied operation reports back, addressable by
/// later operations in the same transaction through relative ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    /// No addressable side effect.
    None,
    /// The operation created the entity with this id.
    Id(ObjectId),
    /// The operation settled this amount.
    Amount(AssetAmount),
}

/// Moves an amount of one asset between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOperation {
    /// Declared fee, in any asset with a funded fee pool.
    pub fee: AssetAmount,
    /// Sending account. Pays the fee.
    pub from: ObjectId,
    /// Receiving account.
    pub to: ObjectId,
    /// Amount to move.
    pub amount: AssetAmount,
}

/// Registers a new account under a registrar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreateOperation {
    /// Declared fee. Paid by the registrar.
    pub fee: AssetAmount,
    /// The paying, sponsoring account.
    pub registrar: ObjectId,
    /// Requested globally unique name.
    pub name: String,
    /// The new account's owner authority.
    pub owner: Authority,
    /// The new account's active authority.
    pub active: Authority,
}

/// Registers a new asset under an issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCreateOperation {
    /// Declared fee. Paid by the issuer.
    pub fee: AssetAmount,
    /// The issuing account.
    pub issuer: ObjectId,
    /// Requested globally unique symbol.
    pub symbol: String,
    /// Initial core exchange rate. The base leg must be quoted in the
    /// core asset; the quote leg's asset id is fixed to the new asset at
    /// application time.
    pub core_exchange_rate: Price,
}

/// Any operation a transaction can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// A [`TransferOperation`].
    Transfer(TransferOperation),
    /// An [`AccountCreateOperation`].
    AccountCreate(AccountCreateOperation),
    /// An [`AssetCreateOperation`].
    AssetCreate(AssetCreateOperation),
}

impl Operation {
    /// This operation's kind.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Transfer(_) => OperationKind::Transfer,
            Operation::AccountCreate(_) => OperationKind::AccountCreate,
            Operation::AssetCreate(_) => OperationKind::AssetCreate,
        }
    }

    /// The declared fee.
    #[must_use]
    pub fn fee(&self) -> AssetAmount {
        match self {
            Operation::Transfer(op) => op.fee,
            Operation::AccountCreate(op) => op.fee,
            Operation::AssetCreate(op) => op.fee,
        }
    }

    /// The account that pays the fee.
    #[must_use]
    pub fn fee_payer(&self) -> ObjectId {
        match self {
            Operation::Transfer(op) => op.from,
            Operation::AccountCreate(op) => op.registrar,
            Operation::AssetCreate(op) => op.issuer,
        }
    }

    /// The authorities that must approve this operation.
    #[must_use]
    pub fn required_authorities(&self) -> Vec<(ObjectId, AuthorityClass)> {
        vec![(self.fee_payer(), AuthorityClass::Active)]
    }

    /// Stateless shape validation.
    pub fn validate(&self) -> Result<(), Rejection> {
        match self {
            Operation::Transfer(op) => {
                if op.amount.amount.is_zero() {
                    return Err(Rejection::malformed("transfer amount must be positive"));
                }
                if op.from == op.to {
                    return Err(Rejection::malformed(
                        "transfer sender and recipient must differ",
                    ));
                }
                Ok(())
            }
            Operation::AccountCreate(op) => {
                validate_account_name(&op.name)?;
                op.owner
                    .validate()
                    .map_err(|e| Rejection::malformed(format!("owner authority: {e}")))?;
                op.active
                    .validate()
                    .map_err(|e| Rejection::malformed(format!("active authority: {e}")))?;
                Ok(())
            }
            Operation::AssetCreate(op) => {
                validate_asset_symbol(&op.symbol)?;
                if op.core_exchange_rate.base.asset_id != CORE_ASSET_ID {
                    return Err(Rejection::malformed(
                        "core exchange rate must be quoted against the core asset",
                    ));
                }
                op.core_exchange_rate
                    .validate()
                    .map_err(|_| Rejection::malformed("core exchange rate legs must be non-zero"))?;
                Ok(())
            }
        }
    }

    /// The unscaled core-denominated fee for this operation under the
    /// given parameters.
    pub fn calculate_base_fee(&self, parameters: &FeeParameters) -> LedgerResult<Share> {
        match (self, parameters) {
            (
                Operation::Transfer(_),
                FeeParameters::Transfer {
                    fee,
                    price_per_kbyte,
                },
            ) => {
                let size = to_canonical_cbor(self)?.len() as u64;
                let per_size =
                    u128::from(price_per_kbyte.as_u64()) * u128::from(size) / 1024;
                let per_size =
                    u64::try_from(per_size).map_err(|_| crate::value::ValueError::Overflow)?;
                Ok((*fee + Share(per_size))?)
            }
            (Operation::AccountCreate(_), FeeParameters::AccountCreate { basic_fee }) => {
                Ok(*basic_fee)
            }
            (
                Operation::AssetCreate(op),
                FeeParameters::AssetCreate {
                    symbol3_fee,
                    long_symbol_fee,
                },
            ) => {
                if op.symbol.len() == 3 {
                    Ok(*symbol3_fee)
                } else {
                    Ok(*long_symbol_fee)
                }
            }
            _ => Err(LedgerError::FeeParameterMismatch { kind: self.kind() }),
        }
    }
}

fn validate_account_name(name: &str) -> Result<(), Rejection> {
    if name.len() < 3 || name.len() > 63 {
        return Err(Rejection::malformed(format!(
            "account name {name:?} must be 3 to 63 characters"
        )));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('?');
    if !first.is_ascii_lowercase() {
        return Err(Rejection::malformed(format!(
            "account name {name:?} must start with a lowercase letter"
        )));
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(Rejection::malformed(format!(
            "account name {name:?} may only contain a-z, 0-9 and '-'"
        )));
    }
    Ok(())
}

fn validate_asset_symbol(symbol: &str) -> Result<(), Rejection> {
    if symbol.len() < 3 || symbol.len() > 16 {
        return Err(Rejection::malformed(format!(
            "asset symbol {symbol:?} must be 3 to 16 characters"
        )));
    }
    if !symbol.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(Rejection::malformed(format!(
            "asset symbol {symbol:?} may only contain A-Z"
        )));
    }
    Ok(())
}

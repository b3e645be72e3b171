//! Per-operation evaluators.
//!
//! Each operation splits into a pure `evaluate_*` step that checks
//! preconditions against committed state and resolves relative ids, and
//! an `apply_*` step that performs the mutations. The pure step returns
//! a [`PendingOp`] so the apply step never re-resolves or re-checks.

use crate::authority::Authority;
use crate::error::{LedgerError, LedgerResult, Rejection};
use crate::eval::{get_relative_id, EvaluationContext, PreparedFee};
use crate::object::{
    Account, AccountBalance, AccountStatistics, Asset, AssetDynamicData, ObjectData, ObjectId,
    ObjectType,
};
use crate::operation::{
    AccountCreateOperation, AssetCreateOperation, OperationResult, TransferOperation,
};
use crate::undo::UndoDatabase;
use crate::value::{AssetAmount, Price, Share};

/// The checked, resolved form of an operation, ready to apply.
pub(super) enum PendingOp {
    Transfer {
        from: ObjectId,
        to: ObjectId,
        amount: AssetAmount,
    },
    AccountCreate {
        name: String,
        owner: Authority,
        active: Authority,
    },
    AssetCreate {
        issuer: ObjectId,
        symbol: String,
        core_exchange_rate: Price,
    },
}

fn require_account(ctx: &EvaluationContext<'_>, id: ObjectId) -> LedgerResult<ObjectId> {
    let id = get_relative_id(ctx.results, ctx.db, id)?;
    ctx.db
        .find(id)
        .and_then(ObjectData::as_account)
        .ok_or(Rejection::MissingObject { id })?;
    Ok(id)
}

fn balance_of(ctx: &EvaluationContext<'_>, owner: ObjectId, asset: ObjectId) -> Share {
    ctx.db
        .account_balance_of(owner, asset)
        .map(|b| b.balance)
        .unwrap_or(Share::ZERO)
}

pub(super) fn evaluate_transfer(
    ctx: &EvaluationContext<'_>,
    op: &TransferOperation,
    prepared: &PreparedFee,
) -> LedgerResult<PendingOp> {
    let from = require_account(ctx, op.from)?;
    let to = require_account(ctx, op.to)?;
    let asset_id = get_relative_id(ctx.results, ctx.db, op.amount.asset_id)?;
    if ctx.db.find(asset_id).and_then(ObjectData::as_asset).is_none() {
        return Err(Rejection::MissingObject { id: asset_id }.into());
    }

    // The fee leaves the same balance when paid in the transferred
    // asset, so both debits are checked together.
    let mut required = op.amount.amount;
    if prepared.fee.asset_id == asset_id {
        required = (required + prepared.fee.amount).map_err(Rejection::from)?;
    }
    let available = balance_of(ctx, from, asset_id);
    if available < required {
        return Err(Rejection::InsufficientBalance {
            account: from,
            asset: asset_id,
            available,
            required,
        }
        .into());
    }

    Ok(PendingOp::Transfer {
        from,
        to,
        amount: AssetAmount::new(op.amount.amount, asset_id),
    })
}

pub(super) fn evaluate_account_create(
    ctx: &EvaluationContext<'_>,
    op: &AccountCreateOperation,
) -> LedgerResult<PendingOp> {
    require_account(ctx, op.registrar)?;
    if ctx.db.account_by_name(&op.name).is_some() {
        return Err(Rejection::AccountNameTaken {
            name: op.name.clone(),
        }
        .into());
    }
    Ok(PendingOp::AccountCreate {
        name: op.name.clone(),
        owner: op.owner.clone(),
        active: op.active.clone(),
    })
}

pub(super) fn evaluate_asset_create(
    ctx: &EvaluationContext<'_>,
    op: &AssetCreateOperation,
) -> LedgerResult<PendingOp> {
    let issuer = require_account(ctx, op.issuer)?;
    if ctx.db.asset_by_symbol(&op.symbol).is_some() {
        return Err(Rejection::AssetSymbolTaken {
            symbol: op.symbol.clone(),
        }
        .into());
    }
    Ok(PendingOp::AssetCreate {
        issuer,
        symbol: op.symbol.clone(),
        core_exchange_rate: op.core_exchange_rate,
    })
}

pub(super) fn apply(db: &mut UndoDatabase, pending: PendingOp) -> LedgerResult<OperationResult> {
    match pending {
        PendingOp::Transfer { from, to, amount } => {
            let from_balance = db
                .account_balance_of(from, amount.asset_id)
                .ok_or_else(|| {
                    LedgerError::corruption(format!(
                        "checked sender {from} has no balance in {}",
                        amount.asset_id
                    ))
                })?;
            let from_id = from_balance.id;
            let debited = (from_balance.balance - amount.amount)?;
            db.modify(from_id, |obj| {
                if let Some(b) = obj.as_account_balance_mut() {
                    b.balance = debited;
                }
            })?;

            match db.account_balance_of(to, amount.asset_id) {
                Some(balance) => {
                    let credited = (balance.balance + amount.amount)?;
                    let to_id = balance.id;
                    db.modify(to_id, |obj| {
                        if let Some(b) = obj.as_account_balance_mut() {
                            b.balance = credited;
                        }
                    })?;
                }
                None => {
                    db.create(ObjectType::ACCOUNT_BALANCE, |id| {
                        ObjectData::AccountBalance(AccountBalance {
                            id,
                            owner: to,
                            asset: amount.asset_id,
                            balance: amount.amount,
                        })
                    })?;
                }
            }
            Ok(OperationResult::None)
        }

        PendingOp::AccountCreate {
            name,
            owner,
            active,
        } => {
            let account_id = db.index(ObjectType::ACCOUNT)?.next_id()?;
            let statistics = db.create(ObjectType::ACCOUNT_STATISTICS, |id| {
                ObjectData::AccountStatistics(AccountStatistics {
                    id,
                    owner: account_id,
                    pending_fees: Share::ZERO,
                })
            })?;
            let allocated = db.create(ObjectType::ACCOUNT, |id| {
                ObjectData::Account(Account {
                    id,
                    name,
                    owner,
                    active,
                    statistics,
                })
            })?;
            if allocated != account_id {
                return Err(LedgerError::corruption(format!(
                    "account allocation raced: expected {account_id}, got {allocated}"
                )));
            }
            Ok(OperationResult::Id(allocated))
        }

        PendingOp::AssetCreate {
            issuer,
            symbol,
            core_exchange_rate,
        } => {
            let asset_id = db.index(ObjectType::ASSET)?.next_id()?;
            let dynamic_data = db.create(ObjectType::ASSET_DYNAMIC_DATA, |id| {
                ObjectData::AssetDynamicData(AssetDynamicData {
                    id,
                    current_supply: Share::ZERO,
                    accumulated_fees: Share::ZERO,
                    fee_pool: Share::ZERO,
                })
            })?;
            // The quote leg is the asset being created; its id only
            // exists now.
            let rate = Price::new(
                core_exchange_rate.base,
                AssetAmount::new(core_exchange_rate.quote.amount, asset_id),
            );
            let allocated = db.create(ObjectType::ASSET, |id| {
                ObjectData::Asset(Asset {
                    id,
                    symbol,
                    issuer,
                    core_exchange_rate: rate,
                    dynamic_data,
                })
            })?;
            if allocated != asset_id {
                return Err(LedgerError::corruption(format!(
                    "asset allocation raced: expected {asset_id}, got {allocated}"
                )));
            }
            Ok(OperationResult::Id(allocated))
        }
    }
}

//! Two-phase operation evaluation.
//!
//! [`start_evaluate`] drives one operation through validation, authority
//! checks, fee preparation, the pure evaluate phase and, when requested,
//! the mutating apply phase. Callers wrap the whole thing in an undo
//! session; nothing here opens or resolves sessions.

mod ops;
mod state;

pub use state::{TransactionEvaluationState, MAX_SIG_CHECK_DEPTH};

use crate::database::ObjectDatabase;
use crate::error::{LedgerResult, Rejection};
use crate::fee::FeeSchedule;
use crate::object::{ObjectData, ObjectId, CORE_ASSET_ID};
use crate::operation::{Operation, OperationResult};
use crate::transaction::SkipFlags;
use crate::undo::UndoDatabase;
use crate::value::{AssetAmount, Share};
use tracing::trace;

/// Read-only context handed to the pure evaluation phase.
pub struct EvaluationContext<'a> {
    /// Committed state.
    pub db: &'a ObjectDatabase,
    /// Results of the operations already applied in this transaction.
    pub results: &'a [OperationResult],
}

/// Resolves a relative id against the results of earlier operations in
/// the same transaction. Non-relative ids pass through untouched.
pub fn get_relative_id(
    results: &[OperationResult],
    db: &ObjectDatabase,
    id: ObjectId,
) -> LedgerResult<ObjectId> {
    if !id.is_relative() {
        return Ok(id);
    }
    let index = id.instance();
    let resolved = match usize::try_from(index).ok().and_then(|i| results.get(i)) {
        Some(OperationResult::Id(resolved)) => *resolved,
        _ => return Err(Rejection::BadRelativeId { index }.into()),
    };
    if db.find(resolved).is_none() {
        return Err(Rejection::BadRelativeId { index }.into());
    }
    Ok(resolved)
}

/// A fee check that passed: who pays, what they pay, and the
/// core-denominated requirement behind it.
struct PreparedFee {
    payer: ObjectId,
    fee: AssetAmount,
    core_equivalent: Share,
}

fn prepare_fee(
    db: &ObjectDatabase,
    schedule: &FeeSchedule,
    results: &[OperationResult],
    op: &Operation,
) -> LedgerResult<PreparedFee> {
    let payer = get_relative_id(results, db, op.fee_payer())?;
    let declared = op.fee();
    let fee_asset_id = get_relative_id(results, db, declared.asset_id)?;
    let fee_asset = db
        .find(fee_asset_id)
        .and_then(ObjectData::as_asset)
        .ok_or(Rejection::MissingObject { id: fee_asset_id })?;

    let core_equivalent = schedule.base_core_fee(op)?;
    let required = if fee_asset_id == CORE_ASSET_ID {
        AssetAmount::core(core_equivalent)
    } else {
        fee_asset
            .core_exchange_rate
            .convert(AssetAmount::core(core_equivalent))
            .map_err(Rejection::from)?
    };
    if declared.amount < required.amount {
        return Err(Rejection::InsufficientFee {
            required,
            offered: AssetAmount::new(declared.amount, fee_asset_id),
        }
        .into());
    }

    if fee_asset_id != CORE_ASSET_ID {
        let dynamic = db.asset_dynamic_data(fee_asset.dynamic_data)?;
        if dynamic.fee_pool < core_equivalent {
            return Err(Rejection::InsufficientFeePool {
                asset: fee_asset_id,
                available: dynamic.fee_pool,
                required: core_equivalent,
            }
            .into());
        }
    }

    let available = db
        .account_balance_of(payer, fee_asset_id)
        .map(|b| b.balance)
        .unwrap_or(Share::ZERO);
    if available < declared.amount {
        return Err(Rejection::InsufficientBalance {
            account: payer,
            asset: fee_asset_id,
            available,
            required: declared.amount,
        }
        .into());
    }

    Ok(PreparedFee {
        payer,
        fee: AssetAmount::new(declared.amount, fee_asset_id),
        core_equivalent,
    })
}

/// Settles a prepared fee: the payer's balance loses the declared fee,
/// the payer's statistics accrue the core equivalent, and for non-core
/// fee assets the declared amount lands in `accumulated_fees` while the
/// core equivalent leaves the fee pool.
fn pay_fee(db: &mut UndoDatabase, prepared: &PreparedFee) -> LedgerResult<()> {
    if !prepared.fee.amount.is_zero() {
        let balance = db
            .account_balance_of(prepared.payer, prepared.fee.asset_id)
            .ok_or_else(|| {
                crate::error::LedgerError::corruption(format!(
                    "checked fee payer {} has no balance in {}",
                    prepared.payer, prepared.fee.asset_id
                ))
            })?;
        let balance_id = balance.id;
        let debited = (balance.balance - prepared.fee.amount)?;
        db.modify(balance_id, |obj| {
            if let Some(b) = obj.as_account_balance_mut() {
                b.balance = debited;
            }
        })?;
    }

    if prepared.fee.asset_id != CORE_ASSET_ID {
        let asset = db.asset(prepared.fee.asset_id)?;
        let dynamic_id = asset.dynamic_data;
        let dynamic = db.asset_dynamic_data(dynamic_id)?;
        let accumulated = (dynamic.accumulated_fees + prepared.fee.amount)?;
        let pool = (dynamic.fee_pool - prepared.core_equivalent)?;
        db.modify(dynamic_id, |obj| {
            if let Some(d) = obj.as_asset_dynamic_data_mut() {
                d.accumulated_fees = accumulated;
                d.fee_pool = pool;
            }
        })?;
    }

    let statistics_id = db.account(prepared.payer)?.statistics;
    let accrued = if prepared.fee.asset_id == CORE_ASSET_ID {
        prepared.fee.amount
    } else {
        prepared.core_equivalent
    };
    let statistics = db.account_statistics(statistics_id)?;
    let pending = (statistics.pending_fees + accrued)?;
    db.modify(statistics_id, |obj| {
        if let Some(s) = obj.as_account_statistics_mut() {
            s.pending_fees = pending;
        }
    })?;
    Ok(())
}

/// Evaluates one operation and, when `apply` is set, applies it.
///
/// The sequence is fixed: stateless validation, authority checks (unless
/// skipped), fee preparation, the pure evaluate phase, then fee payment
/// and application. With `apply` unset the database is never touched and
/// the result is [`OperationResult::None`].
pub fn start_evaluate(
    db: &mut UndoDatabase,
    state: &mut TransactionEvaluationState,
    schedule: &FeeSchedule,
    results: &[OperationResult],
    op: &Operation,
    apply: bool,
) -> LedgerResult<OperationResult> {
    op.validate()?;

    if !state.skip().contains(SkipFlags::AUTHORITY_CHECK) {
        for (account, class) in op.required_authorities() {
            let account = get_relative_id(results, db.db(), account)?;
            if !state.check_authority(db.db(), account, class, 0)? {
                return Err(Rejection::MissingAuthority { account, class }.into());
            }
        }
    }

    let prepared = prepare_fee(db.db(), schedule, results, op)?;

    let pending = {
        let ctx = EvaluationContext {
            db: db.db(),
            results,
        };
        match op {
            Operation::Transfer(op) => ops::evaluate_transfer(&ctx, op, &prepared)?,
            Operation::AccountCreate(op) => ops::evaluate_account_create(&ctx, op)?,
            Operation::AssetCreate(op) => ops::evaluate_asset_create(&ctx, op)?,
        }
    };

    if !apply {
        return Ok(OperationResult::None);
    }

    trace!(kind = ?op.kind(), payer = %prepared.payer, "applying operation");
    pay_fee(db, &prepared)?;
    ops::apply(db, pending)
}

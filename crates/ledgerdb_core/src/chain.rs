//! Transaction and block application.
//!
//! [`Chain`] owns the undo-wrapped database and drives transactions
//! through signature checks, evaluation and session management. Every
//! transaction applies all-or-nothing; every applied transaction or
//! block leaves one state on the undo stack, so the chain can step
//! backwards through recent history during a reorganization.

use crate::authority::Authority;
use crate::clock::{ClockSource, Timestamp};
use crate::database::ObjectDatabase;
use crate::error::{LedgerError, LedgerResult, Rejection};
use crate::eval::{start_evaluate, TransactionEvaluationState};
use crate::fee::FeeSchedule;
use crate::object::{
    Account, AccountBalance, AccountStatistics, Asset, AssetDynamicData, ObjectData, ObjectId,
    ObjectType, CORE_ASSET_ID, SENTINEL_ACCOUNT_ID,
};
use crate::operation::OperationResult;
use crate::transaction::{
    Block, Ed25519Verifier, SignatureVerifier, SignedTransaction, SkipFlags, Transaction,
    TransactionDigest,
};
use crate::undo::UndoDatabase;
use crate::value::{AssetAmount, Price, Share};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// The name reserved for the sentinel account.
pub const SENTINEL_ACCOUNT_NAME: &str = "null";
/// The core asset's symbol.
pub const CORE_ASSET_SYMBOL: &str = "CORE";

/// The transaction-application layer over an undo-wrapped database.
pub struct Chain {
    db: UndoDatabase,
    fee_schedule: FeeSchedule,
    clock: Arc<dyn ClockSource>,
    recent: BTreeMap<TransactionDigest, Timestamp>,
    verifier: Box<dyn SignatureVerifier>,
}

impl Chain {
    /// Wraps a database, initializing genesis state when it is empty.
    pub fn new(db: ObjectDatabase, clock: Arc<dyn ClockSource>) -> LedgerResult<Self> {
        let mut chain = Self {
            db: UndoDatabase::new(db),
            fee_schedule: FeeSchedule::default(),
            clock,
            recent: BTreeMap::new(),
            verifier: Box::new(Ed25519Verifier),
        };
        chain.init_genesis()?;
        Ok(chain)
    }

    /// Replaces the signature verifier. Tests substitute a permissive
    /// verifier to exercise authority logic without real keys.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Box<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// The committed state.
    #[must_use]
    pub fn db(&self) -> &ObjectDatabase {
        self.db.db()
    }

    /// The undo-wrapped database.
    #[must_use]
    pub fn undo_db(&self) -> &UndoDatabase {
        &self.db
    }

    /// The active fee schedule.
    #[must_use]
    pub fn fee_schedule(&self) -> &FeeSchedule {
        &self.fee_schedule
    }

    /// Replaces the fee schedule after checking it prices every
    /// operation kind.
    pub fn set_fee_schedule(&mut self, schedule: FeeSchedule) -> LedgerResult<()> {
        schedule.validate()?;
        self.fee_schedule = schedule;
        Ok(())
    }

    /// Protocol-owned objects every ledger starts with: the sentinel
    /// account and the core asset, pinned to their well-known ids.
    fn init_genesis(&mut self) -> LedgerResult<()> {
        if !self.db.index(ObjectType::ACCOUNT)?.is_empty() {
            return Ok(());
        }
        // Nothing exists yet, so there is nothing to undo to.
        self.db.disable();

        let statistics = self.db.create(ObjectType::ACCOUNT_STATISTICS, |id| {
            ObjectData::AccountStatistics(AccountStatistics {
                id,
                owner: SENTINEL_ACCOUNT_ID,
                pending_fees: Share::ZERO,
            })
        })?;
        let sentinel = self.db.create(ObjectType::ACCOUNT, |id| {
            ObjectData::Account(Account {
                id,
                name: SENTINEL_ACCOUNT_NAME.to_string(),
                owner: empty_authority(),
                active: empty_authority(),
                statistics,
            })
        })?;
        if sentinel != SENTINEL_ACCOUNT_ID {
            return Err(LedgerError::corruption(format!(
                "sentinel account allocated as {sentinel}"
            )));
        }

        let dynamic_data = self.db.create(ObjectType::ASSET_DYNAMIC_DATA, |id| {
            ObjectData::AssetDynamicData(AssetDynamicData {
                id,
                current_supply: Share::ZERO,
                accumulated_fees: Share::ZERO,
                fee_pool: Share::ZERO,
            })
        })?;
        let core = self.db.create(ObjectType::ASSET, |id| {
            ObjectData::Asset(Asset {
                id,
                symbol: CORE_ASSET_SYMBOL.to_string(),
                issuer: SENTINEL_ACCOUNT_ID,
                core_exchange_rate: Price::core_identity(),
                dynamic_data,
            })
        })?;
        if core != CORE_ASSET_ID {
            return Err(LedgerError::corruption(format!(
                "core asset allocated as {core}"
            )));
        }

        self.db.enable();
        info!("initialized genesis state");
        Ok(())
    }

    /// Creates an account outside transaction evaluation, for genesis
    /// provisioning. No fee is charged and no session is involved.
    pub fn genesis_account(
        &mut self,
        name: &str,
        owner: Authority,
        active: Authority,
    ) -> LedgerResult<ObjectId> {
        if self.db.account_by_name(name).is_some() {
            return Err(Rejection::AccountNameTaken {
                name: name.to_string(),
            }
            .into());
        }
        let account_id = self.db.index(ObjectType::ACCOUNT)?.next_id()?;
        let statistics = self.db.create(ObjectType::ACCOUNT_STATISTICS, |id| {
            ObjectData::AccountStatistics(AccountStatistics {
                id,
                owner: account_id,
                pending_fees: Share::ZERO,
            })
        })?;
        let name = name.to_string();
        self.db.create(ObjectType::ACCOUNT, move |id| {
            ObjectData::Account(Account {
                id,
                name,
                owner,
                active,
                statistics,
            })
        })
    }

    /// Credits an account with an amount out of thin air, bumping the
    /// asset's supply. Genesis provisioning only.
    pub fn genesis_fund(&mut self, account: ObjectId, amount: AssetAmount) -> LedgerResult<()> {
        self.db.account(account)?;
        let asset = self.db.asset(amount.asset_id)?;
        let dynamic_id = asset.dynamic_data;

        match self.db.account_balance_of(account, amount.asset_id) {
            Some(balance) => {
                let credited = (balance.balance + amount.amount)?;
                let balance_id = balance.id;
                self.db.modify(balance_id, |obj| {
                    if let Some(b) = obj.as_account_balance_mut() {
                        b.balance = credited;
                    }
                })?;
            }
            None => {
                self.db.create(ObjectType::ACCOUNT_BALANCE, |id| {
                    ObjectData::AccountBalance(AccountBalance {
                        id,
                        owner: account,
                        asset: amount.asset_id,
                        balance: amount.amount,
                    })
                })?;
            }
        }

        let dynamic = self.db.asset_dynamic_data(dynamic_id)?;
        let supply = (dynamic.current_supply + amount.amount)?;
        self.db.modify(dynamic_id, |obj| {
            if let Some(d) = obj.as_asset_dynamic_data_mut() {
                d.current_supply = supply;
            }
        })
    }

    /// Moves core into an asset's fee pool, enabling fees in that asset.
    pub fn fund_fee_pool(&mut self, asset: ObjectId, core_amount: Share) -> LedgerResult<()> {
        let dynamic_id = self.db.asset(asset)?.dynamic_data;
        let dynamic = self.db.asset_dynamic_data(dynamic_id)?;
        let pool = (dynamic.fee_pool + core_amount)?;
        self.db.modify(dynamic_id, |obj| {
            if let Some(d) = obj.as_asset_dynamic_data_mut() {
                d.fee_pool = pool;
            }
        })
    }

    /// Applies a transaction against current state.
    ///
    /// All-or-nothing: on any rejection the database is left untouched.
    /// On success one undo state remains on the stack and the digest is
    /// remembered for duplicate detection until the transaction would
    /// have expired. With [`SkipFlags::UNDO_TRACKING`] no state is
    /// recorded and the transaction cannot be reverted.
    pub fn push_transaction(
        &mut self,
        tx: &SignedTransaction,
        skip: SkipFlags,
    ) -> LedgerResult<Vec<OperationResult>> {
        let now = self.clock.now();
        let digest = check_transaction(&self.recent, self.verifier.as_ref(), tx, now, skip)?;

        let mut state = TransactionEvaluationState::new(tx.signed_keys(), skip);
        let tracked = !skip.contains(SkipFlags::UNDO_TRACKING);
        if !tracked {
            self.db.disable();
        }
        let fee_schedule = &self.fee_schedule;
        let mut session = self.db.start_undo_session();
        let applied = apply_operations(&mut session, &mut state, fee_schedule, &tx.transaction);
        if applied.is_ok() {
            session.commit();
        }
        drop(session);
        if !tracked {
            self.db.enable();
        }
        let results = applied?;

        self.recent.insert(digest, tx.transaction.expiration);
        self.prune_recent(now);
        debug!(digest = %hex32(&digest), operations = results.len(), "applied transaction");
        Ok(results)
    }

    /// Applies a batch of pending transactions independently. A
    /// rejected transaction is reported in its slot and does not disturb
    /// its siblings.
    pub fn push_pending(
        &mut self,
        txs: &[SignedTransaction],
        skip: SkipFlags,
    ) -> Vec<LedgerResult<Vec<OperationResult>>> {
        txs.iter()
            .map(|tx| self.push_transaction(tx, skip))
            .collect()
    }

    /// Applies a block atomically, judging expiration against the
    /// block's own timestamp so replay is deterministic. Leaves one
    /// undo state for the whole block, none under
    /// [`SkipFlags::UNDO_TRACKING`].
    pub fn apply_block(
        &mut self,
        block: &Block,
        skip: SkipFlags,
    ) -> LedgerResult<Vec<Vec<OperationResult>>> {
        let now = block.timestamp;
        let tracked = !skip.contains(SkipFlags::UNDO_TRACKING);
        let Self {
            db,
            fee_schedule,
            recent,
            verifier,
            ..
        } = self;

        if !tracked {
            db.disable();
        }
        let mut session = db.start_undo_session();
        let applied = apply_block_transactions(
            &mut session,
            fee_schedule,
            recent,
            verifier.as_ref(),
            block,
            now,
            skip,
        );
        if applied.is_ok() {
            session.commit();
        }
        drop(session);
        if !tracked {
            db.enable();
        }
        let (all_results, digests) = applied?;

        for (digest, expiration) in digests {
            self.recent.insert(digest, expiration);
        }
        self.prune_recent(now);
        debug!(transactions = all_results.len(), "applied block");
        Ok(all_results)
    }

    /// Reverts the most recent applied transaction or block.
    pub fn undo(&mut self) -> LedgerResult<()> {
        self.db.undo()
    }

    /// Makes the oldest retained undo state permanent.
    pub fn pop_commit(&mut self) -> LedgerResult<()> {
        self.db.pop_commit()
    }

    /// Flushes committed state to the storage backend.
    pub fn flush(&mut self) -> LedgerResult<()> {
        self.db.flush()
    }

    fn prune_recent(&mut self, now: Timestamp) {
        self.recent.retain(|_, expiration| *expiration >= now);
    }
}

fn empty_authority() -> Authority {
    Authority {
        weight_threshold: 0,
        account_auths: BTreeMap::new(),
        key_auths: BTreeMap::new(),
    }
}

fn check_transaction(
    recent: &BTreeMap<TransactionDigest, Timestamp>,
    verifier: &dyn SignatureVerifier,
    tx: &SignedTransaction,
    now: Timestamp,
    skip: SkipFlags,
) -> LedgerResult<TransactionDigest> {
    tx.transaction.validate()?;
    let digest = tx.transaction.digest()?;
    if !skip.contains(SkipFlags::DUPE_CHECK) && recent.contains_key(&digest) {
        return Err(Rejection::DuplicateTransaction.into());
    }
    if tx.transaction.expiration < now {
        return Err(Rejection::Expired {
            expiration: tx.transaction.expiration,
            now,
        }
        .into());
    }
    if !skip.contains(SkipFlags::SIGNATURE_CHECK) {
        for witness in &tx.witnesses {
            if !verifier.verify(&digest, &witness.key, &witness.signature) {
                return Err(Rejection::InvalidSignature {
                    key: witness.key.to_string(),
                }
                .into());
            }
        }
    }
    Ok(digest)
}

/// Applies every transaction of a block inside the enclosing session,
/// one nested session per transaction, returning the per-transaction
/// results and the digests to remember.
#[allow(clippy::type_complexity)]
fn apply_block_transactions(
    db: &mut UndoDatabase,
    fee_schedule: &FeeSchedule,
    recent: &BTreeMap<TransactionDigest, Timestamp>,
    verifier: &dyn SignatureVerifier,
    block: &Block,
    now: Timestamp,
    skip: SkipFlags,
) -> LedgerResult<(Vec<Vec<OperationResult>>, Vec<(TransactionDigest, Timestamp)>)> {
    let mut all_results = Vec::with_capacity(block.transactions.len());
    let mut digests = Vec::with_capacity(block.transactions.len());
    for tx in &block.transactions {
        let digest = check_transaction(recent, verifier, tx, now, skip)?;
        let mut state = TransactionEvaluationState::new(tx.signed_keys(), skip);
        let mut tx_session = db.start_undo_session();
        let results = apply_operations(&mut tx_session, &mut state, fee_schedule, &tx.transaction)?;
        tx_session.merge()?;
        drop(tx_session);
        all_results.push(results);
        digests.push((digest, tx.transaction.expiration));
    }
    Ok((all_results, digests))
}

/// Applies each operation in its own nested session, merging successes
/// upward so the enclosing session owns the whole transaction.
fn apply_operations(
    db: &mut UndoDatabase,
    state: &mut TransactionEvaluationState,
    fee_schedule: &FeeSchedule,
    tx: &Transaction,
) -> LedgerResult<Vec<OperationResult>> {
    let mut results = Vec::with_capacity(tx.operations.len());
    for op in &tx.operations {
        let mut op_session = db.start_undo_session();
        let result = start_evaluate(&mut op_session, state, fee_schedule, &results, op, true)?;
        op_session.merge()?;
        results.push(result);
    }
    Ok(results)
}

fn hex32(bytes: &[u8; 32]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::Config;

    fn new_chain() -> Chain {
        let db = ObjectDatabase::open_in_memory(Config::default()).unwrap();
        Chain::new(db, Arc::new(FixedClock::new(Timestamp(1_000)))).unwrap()
    }

    #[test]
    fn genesis_pins_well_known_ids() {
        let chain = new_chain();
        let sentinel = chain.db().account(SENTINEL_ACCOUNT_ID).unwrap();
        assert_eq!(sentinel.name, SENTINEL_ACCOUNT_NAME);
        assert_eq!(sentinel.owner.weight_threshold, 0);

        let core = chain.db().asset(CORE_ASSET_ID).unwrap();
        assert_eq!(core.symbol, CORE_ASSET_SYMBOL);
        assert_eq!(core.issuer, SENTINEL_ACCOUNT_ID);
    }

    #[test]
    fn genesis_is_idempotent_across_reopen() {
        let chain = new_chain();
        let digest = chain.db().digest().unwrap();
        let db = chain.db.into_inner();
        let reopened = Chain::new(db, Arc::new(FixedClock::new(Timestamp(1_000)))).unwrap();
        assert_eq!(reopened.db().digest().unwrap(), digest);
    }

    #[test]
    fn genesis_funding_tracks_supply() {
        let mut chain = new_chain();
        let alice = chain
            .genesis_account("alice", empty_authority(), empty_authority())
            .unwrap();
        chain
            .genesis_fund(alice, AssetAmount::core(Share(1_000)))
            .unwrap();
        chain
            .genesis_fund(alice, AssetAmount::core(Share(500)))
            .unwrap();

        let balance = chain
            .db()
            .account_balance_of(alice, CORE_ASSET_ID)
            .unwrap();
        assert_eq!(balance.balance, Share(1_500));

        let dynamic_id = chain.db().asset(CORE_ASSET_ID).unwrap().dynamic_data;
        let dynamic = chain.db().asset_dynamic_data(dynamic_id).unwrap();
        assert_eq!(dynamic.current_supply, Share(1_500));
    }

    #[test]
    fn incomplete_fee_schedule_is_refused() {
        let mut chain = new_chain();
        let partial = FeeSchedule::new(
            [crate::fee::FeeParameters::AccountCreate {
                basic_fee: Share(1),
            }],
            crate::fee::FEE_SCALE_DENOM,
        )
        .unwrap();
        assert!(chain.set_fee_schedule(partial).is_err());
        assert!(chain.set_fee_schedule(FeeSchedule::default()).is_ok());
    }
}

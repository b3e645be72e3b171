//! Per-transaction authority bookkeeping.

use crate::authority::{AuthorityClass, PublicKey};
use crate::database::ObjectDatabase;
use crate::error::{LedgerError, LedgerResult, Rejection};
use crate::object::{ObjectId, SENTINEL_ACCOUNT_ID};
use crate::transaction::SkipFlags;
use std::collections::{BTreeSet, HashSet};

/// Delegation depth limit for authority checks.
///
/// An authority may delegate to accounts whose authorities delegate
/// further; past this depth a delegation contributes no weight. The
/// limit bounds evaluation cost and breaks delegation cycles.
pub const MAX_SIG_CHECK_DEPTH: u32 = 2;

/// One satisfied approval, memoized across the operations of a
/// transaction so shared delegation subtrees are walked once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Approval {
    Account(ObjectId, AuthorityClass),
    Key(PublicKey),
}

/// Mutable state threaded through the evaluation of one transaction.
pub struct TransactionEvaluationState {
    signed_by: BTreeSet<PublicKey>,
    approved_by: HashSet<Approval>,
    skip: SkipFlags,
}

impl TransactionEvaluationState {
    /// Starts evaluation state for a transaction signed by the given
    /// keys.
    #[must_use]
    pub fn new(signed_by: BTreeSet<PublicKey>, skip: SkipFlags) -> Self {
        Self {
            signed_by,
            approved_by: HashSet::new(),
            skip,
        }
    }

    /// The validation steps being skipped.
    #[must_use]
    pub fn skip(&self) -> SkipFlags {
        self.skip
    }

    /// Whether a key signed the transaction.
    #[must_use]
    pub fn signed_by(&self, key: &PublicKey) -> bool {
        self.signed_by.contains(key)
    }

    /// Checks whether the signing keys satisfy one account authority.
    ///
    /// Weighted threshold logic: direct key entries contribute when the
    /// key signed the transaction; account entries contribute when the
    /// delegate's authority of the same class is itself satisfied, up to
    /// [`MAX_SIG_CHECK_DEPTH`] levels down. [`SENTINEL_ACCOUNT_ID`] is
    /// satisfied unconditionally. A missing account is a rejection, an
    /// unsatisfied authority is `Ok(false)`.
    pub fn check_authority(
        &mut self,
        db: &ObjectDatabase,
        account_id: ObjectId,
        class: AuthorityClass,
        depth: u32,
    ) -> LedgerResult<bool> {
        if account_id == SENTINEL_ACCOUNT_ID {
            return Ok(true);
        }
        if self.approved_by.contains(&Approval::Account(account_id, class)) {
            return Ok(true);
        }
        if depth >= MAX_SIG_CHECK_DEPTH {
            return Ok(false);
        }

        let account = db
            .find(account_id)
            .ok_or(Rejection::MissingObject { id: account_id })?
            .as_account()
            .ok_or(LedgerError::TypeMismatch { id: account_id })?;
        let authority = match class {
            AuthorityClass::Owner => &account.owner,
            AuthorityClass::Active => &account.active,
        };

        let threshold = u64::from(authority.weight_threshold);
        let mut total: u64 = 0;
        if total >= threshold {
            // Deliberately empty authorities are satisfied by anything.
            self.approved_by.insert(Approval::Account(account_id, class));
            return Ok(true);
        }

        for (key, weight) in &authority.key_auths {
            if !self.signed_by.contains(key) {
                continue;
            }
            self.approved_by.insert(Approval::Key(*key));
            total += u64::from(*weight);
            if total >= threshold {
                self.approved_by.insert(Approval::Account(account_id, class));
                return Ok(true);
            }
        }

        for (delegate, weight) in &authority.account_auths {
            if !self.check_authority(db, *delegate, class, depth + 1)? {
                continue;
            }
            total += u64::from(*weight);
            if total >= threshold {
                self.approved_by.insert(Approval::Account(account_id, class));
                return Ok(true);
            }
        }

        Ok(false)
    }
}

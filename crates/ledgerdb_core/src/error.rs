//! Error taxonomy.
//!
//! Two tiers. [`Rejection`] is the recoverable tier: a transaction was
//! well-formed enough to look at but must not be applied, and the caller
//! (a pending queue, an API server) can report it and move on. Everything
//! else in [`LedgerError`] means the database itself is in trouble, and
//! callers should stop mutating state.

use crate::authority::AuthorityClass;
use crate::clock::Timestamp;
use crate::object::{ObjectId, ObjectType};
use crate::operation::OperationKind;
use crate::value::{AssetAmount, Share, ValueError};
use thiserror::Error;

/// Alias for results produced by this crate.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// A transaction or operation that failed validation.
///
/// Rejections never indicate database corruption. State is unchanged
/// after a rejection: the evaluator runs every operation inside an undo
/// session and rolls it back before returning one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The transaction's signatures do not satisfy a required authority.
    #[error("authority not satisfied for account {account} ({class})")]
    MissingAuthority {
        /// The account whose authority was required.
        account: ObjectId,
        /// Which authority class was required.
        class: AuthorityClass,
    },

    /// An account holds less of an asset than the operation needs.
    #[error("account {account} has {available} of asset {asset}, needs {required}")]
    InsufficientBalance {
        /// The paying or sending account.
        account: ObjectId,
        /// The asset in question.
        asset: ObjectId,
        /// What the account holds.
        available: Share,
        /// What the operation needs.
        required: Share,
    },

    /// The declared fee is below the schedule's requirement.
    #[error("declared fee {offered} is below the required {required}")]
    InsufficientFee {
        /// The minimum fee the schedule computes for this operation.
        required: AssetAmount,
        /// The fee the operation declared.
        offered: AssetAmount,
    },

    /// A non-core fee asset's pool cannot cover the core-equivalent fee.
    #[error("fee pool of asset {asset} holds {available} core, needs {required}")]
    InsufficientFeePool {
        /// The fee asset.
        asset: ObjectId,
        /// Core currently in the pool.
        available: Share,
        /// Core the conversion requires.
        required: Share,
    },

    /// An operation referenced an entity that does not exist.
    #[error("referenced object {id} does not exist")]
    MissingObject {
        /// The dangling reference.
        id: ObjectId,
    },

    /// The requested account name is already registered.
    #[error("account name {name:?} is already taken")]
    AccountNameTaken {
        /// The contested name.
        name: String,
    },

    /// The requested asset symbol is already registered.
    #[error("asset symbol {symbol:?} is already taken")]
    AssetSymbolTaken {
        /// The contested symbol.
        symbol: String,
    },

    /// The transaction or operation is structurally invalid.
    #[error("malformed: {message}")]
    Malformed {
        /// What is wrong with it.
        message: String,
    },

    /// The transaction was already applied within the recent window.
    #[error("duplicate transaction")]
    DuplicateTransaction,

    /// The transaction's expiration is not in the future.
    #[error("transaction expired at {expiration}, now {now}")]
    Expired {
        /// The transaction's expiration time.
        expiration: Timestamp,
        /// The evaluation clock's current time.
        now: Timestamp,
    },

    /// A witness signature failed cryptographic verification.
    #[error("invalid signature by key {key}")]
    InvalidSignature {
        /// The claimed signing key, hex encoded.
        key: String,
    },

    /// A relative id could not be resolved against earlier results.
    #[error("relative id 0.0.{index} does not resolve to a created object")]
    BadRelativeId {
        /// The operation index the id pointed at.
        index: u64,
    },

    /// Checked arithmetic failed while evaluating the operation.
    #[error("amount arithmetic failed")]
    Overflow,
}

impl Rejection {
    /// Convenience constructor for [`Rejection::Malformed`].
    pub fn malformed(message: impl Into<String>) -> Self {
        Rejection::Malformed {
            message: message.into(),
        }
    }
}

impl From<ValueError> for Rejection {
    fn from(_: ValueError) -> Self {
        Rejection::Overflow
    }
}

/// Any error the ledger core can produce.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A recoverable validation failure. State is unchanged.
    #[error(transparent)]
    Rejection(#[from] Rejection),

    /// An internal reference pointed at an entity that is not there.
    ///
    /// Unlike [`Rejection::MissingObject`], this is raised on paths where
    /// the entity is guaranteed to exist by construction.
    #[error("object {id} is missing")]
    ObjectMissing {
        /// The missing id.
        id: ObjectId,
    },

    /// A stored entity had an unexpected variant for its id.
    #[error("object {id} has an unexpected kind for its id")]
    TypeMismatch {
        /// The offending id.
        id: ObjectId,
    },

    /// An id referenced a (space, type) pair no index is registered for.
    #[error("no index registered for object type {space}.{ty}")]
    UnknownObjectType {
        /// Id space.
        space: u8,
        /// Type tag.
        ty: u8,
    },

    /// An index ran out of instance numbers.
    #[error("id space exhausted for object type {space}.{ty}")]
    IdSpaceExhausted {
        /// Id space.
        space: u8,
        /// Type tag.
        ty: u8,
    },

    /// A mutation would have produced two entities with the same key in a
    /// unique ordering.
    #[error("unique constraint violated on ordering {ordering:?}")]
    UniqueConstraint {
        /// Name of the violated ordering.
        ordering: &'static str,
    },

    /// An undo or merge was requested with no session on the stack.
    #[error("undo stack underflow")]
    UndoStackUnderflow,

    /// A fee calculation received parameters for the wrong operation kind.
    #[error("fee parameters do not match operation kind {kind:?}")]
    FeeParameterMismatch {
        /// The operation's kind.
        kind: OperationKind,
    },

    /// A fee schedule declared parameters for the same kind twice.
    #[error("duplicate fee parameters for operation kind {kind:?}")]
    DuplicateFeeParameters {
        /// The duplicated kind.
        kind: OperationKind,
    },

    /// A fee schedule is missing parameters for an operation kind.
    #[error("no fee parameters for operation kind {kind:?}")]
    MissingFeeParameters {
        /// The missing kind.
        kind: OperationKind,
    },

    /// Stored or in-memory state violated an internal invariant.
    #[error("state corruption: {message}")]
    Corruption {
        /// Description of the violated invariant.
        message: String,
    },

    /// The database has been closed and can no longer be used.
    #[error("database is closed")]
    DatabaseClosed,

    /// Checked arithmetic failed outside operation evaluation.
    #[error(transparent)]
    Value(#[from] ValueError),

    /// The storage backend failed.
    #[error(transparent)]
    Storage(#[from] ledgerdb_storage::StorageError),

    /// Serialization failed.
    #[error(transparent)]
    Codec(#[from] ledgerdb_codec::CodecError),

    /// An I/O error outside the storage backend.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Convenience constructor for [`LedgerError::Corruption`].
    pub fn corruption(message: impl Into<String>) -> Self {
        LedgerError::Corruption {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`LedgerError::UnknownObjectType`].
    #[must_use]
    pub fn unknown_object_type(object_type: ObjectType) -> Self {
        LedgerError::UnknownObjectType {
            space: object_type.space,
            ty: object_type.ty,
        }
    }

    /// Convenience constructor for [`LedgerError::IdSpaceExhausted`].
    #[must_use]
    pub fn id_space_exhausted(object_type: ObjectType) -> Self {
        LedgerError::IdSpaceExhausted {
            space: object_type.space,
            ty: object_type.ty,
        }
    }

    /// Returns true when this is a recoverable transaction rejection
    /// rather than a database fault.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, LedgerError::Rejection(_))
    }
}

//! # LedgerDB Core
//!
//! The state-storage and transaction-application core of a deterministic
//! replicated ledger.
//!
//! Every peer applies the same sequence of transactions and must reach
//! bit-identical state, and every peer must be able to reorganize onto a
//! competing chain by reverting applied mutations. This crate provides:
//!
//! - a strongly-typed object store keyed by (space, type, instance) ids,
//!   with declared secondary orderings ([`ObjectDatabase`], [`ObjectIndex`])
//! - a session-based undo subsystem that can roll back any bounded window
//!   of mutations ([`UndoDatabase`], [`UndoSession`])
//! - a two-phase operation evaluator with recursive weighted authority
//!   verification and deterministic fee accounting ([`Chain`],
//!   [`TransactionEvaluationState`], [`FeeSchedule`])
//!
//! The store is single-writer by construction: all mutating paths take
//! `&mut` and the session stack is strictly LIFO.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod authority;
mod chain;
mod clock;
mod config;
mod database;
mod error;
mod eval;
mod fee;
mod index;
mod object;
mod operation;
mod transaction;
mod undo;
mod value;

pub use authority::{Authority, AuthorityClass, PublicKey};
pub use chain::{Chain, CORE_ASSET_SYMBOL, SENTINEL_ACCOUNT_NAME};
pub use clock::{ClockSource, FixedClock, SystemClock, Timestamp};
pub use config::Config;
pub use database::ObjectDatabase;
pub use error::{LedgerError, LedgerResult, Rejection};
pub use eval::{
    get_relative_id, start_evaluate, EvaluationContext, TransactionEvaluationState,
    MAX_SIG_CHECK_DEPTH,
};
pub use fee::{FeeParameters, FeeSchedule, FEE_SCALE_DENOM};
pub use index::{KeyExtractor, ObjectIndex, OrderingSpec};
pub use object::{
    Account, AccountBalance, AccountStatistics, Asset, AssetDynamicData, ObjectData, ObjectId,
    ObjectType, CORE_ASSET_ID, MAX_INSTANCE, SENTINEL_ACCOUNT_ID,
};
pub use operation::{
    AccountCreateOperation, AssetCreateOperation, Operation, OperationKind, OperationResult,
    TransferOperation,
};
pub use transaction::{
    Block, Ed25519Verifier, SignatureBytes, SignatureVerifier, SignedTransaction, SkipFlags,
    Transaction, TransactionDigest, Witness,
};
pub use undo::{UndoDatabase, UndoSession, UndoState};
pub use value::{AssetAmount, Price, Share, ValueError};

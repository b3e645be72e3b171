//! # LedgerDB Storage
//!
//! Storage backend trait and implementations for LedgerDB.
//!
//! This crate provides the durable byte-store seam beneath the object
//! database. Backends are **opaque byte stores**: they read, append,
//! truncate and flush ranges of bytes and know nothing about object ids,
//! snapshot framing or undo state. The object database owns all format
//! interpretation.
//!
//! ## Available backends
//!
//! - [`InMemoryBackend`] - for tests and ephemeral nodes
//! - [`FileBackend`] - durable storage with an exclusive advisory lock
//!
//! ## Example
//!
//! ```rust
//! use ledgerdb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"snapshot bytes").unwrap();
//! assert_eq!(backend.read_at(offset, 14).unwrap(), b"snapshot bytes");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;

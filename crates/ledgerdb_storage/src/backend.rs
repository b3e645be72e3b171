//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level byte store for LedgerDB.
///
/// Backends provide plain read/append/truncate/flush operations over a
/// single logical byte range. The object database writes its snapshot
/// stream through this trait; backends never interpret the bytes.
///
/// # Invariants
///
/// - `append` returns the offset where the data landed
/// - `read_at` returns exactly the bytes previously written at that offset
/// - after `sync` returns, all appended data survives process termination
/// - backends are `Send + Sync`
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] when the range extends
    /// beyond the current size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data at the end of the store, returning the write offset.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Truncates the store to `new_size` bytes.
    ///
    /// Used when rewriting the snapshot stream from the start.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::TruncateBeyondEnd`] when `new_size`
    /// exceeds the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Flushes buffered writes to the operating system.
    fn flush(&mut self) -> StorageResult<()>;

    /// Syncs data and metadata all the way to durable media.
    ///
    /// A stronger guarantee than [`StorageBackend::flush`].
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes (the next append offset).
    fn size(&self) -> StorageResult<u64>;
}

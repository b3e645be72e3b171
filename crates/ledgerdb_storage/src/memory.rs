//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// A storage backend that keeps everything in a memory buffer.
///
/// Suitable for unit tests and for ephemeral nodes that replay state from
/// the network on startup and never persist locally.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    buf: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend seeded with existing bytes.
    ///
    /// Useful for exercising snapshot recovery paths in tests.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            buf: RwLock::new(data),
        }
    }

    /// Returns a copy of the full contents.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.buf.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let buf = self.buf.read();
        let size = buf.len() as u64;
        let start = offset as usize;
        let end = start.saturating_add(len);

        if offset > size || end > buf.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(buf[start..end].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut buf = self.buf.write();
        let offset = buf.len() as u64;
        buf.extend_from_slice(data);
        Ok(offset)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut buf = self.buf.write();
        let size = buf.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        buf.truncate(new_size as usize);
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.buf.read().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_sequential_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"abc").unwrap(), 0);
        assert_eq!(backend.append(b"defg").unwrap(), 3);
        assert_eq!(backend.size().unwrap(), 7);
    }

    #[test]
    fn read_at_returns_written_bytes() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"object database").unwrap();
        assert_eq!(backend.read_at(7, 8).unwrap(), b"database");
    }

    #[test]
    fn read_past_end_is_rejected() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"short").unwrap();
        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn truncate_then_rewrite() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"old snapshot").unwrap();
        backend.truncate(0).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert_eq!(backend.append(b"new").unwrap(), 0);
    }

    #[test]
    fn truncate_beyond_end_is_rejected() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"abc").unwrap();
        assert!(matches!(
            backend.truncate(10),
            Err(StorageError::TruncateBeyondEnd { .. })
        ));
    }

    #[test]
    fn with_data_preloads_contents() {
        let backend = InMemoryBackend::with_data(b"seeded".to_vec());
        assert_eq!(backend.size().unwrap(), 6);
        assert_eq!(backend.read_at(0, 6).unwrap(), b"seeded");
    }

    #[test]
    fn empty_read_is_fine() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"abc").unwrap();
        assert!(backend.read_at(1, 0).unwrap().is_empty());
    }
}

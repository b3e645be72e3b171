//! Error types for the codec.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding canonical CBOR.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Encoding to CBOR failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Decoding from CBOR failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// Floating point values are outside the canonical subset.
    #[error("floating point values are not permitted in canonical CBOR")]
    Float,

    /// A map contained the same key twice.
    #[error("duplicate map key in canonical CBOR")]
    DuplicateKey,

    /// A CBOR construct outside the canonical subset was encountered.
    #[error("unsupported CBOR construct: {0}")]
    Unsupported(String),
}

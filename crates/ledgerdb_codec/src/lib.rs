//! # LedgerDB Codec
//!
//! Canonical CBOR encoding/decoding for LedgerDB.
//!
//! Every replica of the ledger must serialize the same object to the same
//! bytes, because content hashes and the persisted snapshot stream are
//! compared across nodes. This crate enforces a canonical CBOR subset:
//!
//! - maps are sorted by the byte representation of their encoded keys
//! - duplicate map keys are rejected
//! - integers use the shortest encoding, lengths are always definite
//! - floating point values are rejected outright
//!
//! ## Usage
//!
//! ```
//! use ledgerdb_codec::{from_cbor, to_canonical_cbor};
//!
//! let bytes = to_canonical_cbor(&(1u8, "two")).unwrap();
//! let back: (u8, String) = from_cbor(&bytes).unwrap();
//! assert_eq!(back, (1, "two".to_string()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod canonical;
mod error;

pub use error::{CodecError, CodecResult};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to canonical CBOR bytes.
///
/// # Errors
///
/// Fails when the value contains floats, duplicate map keys, or cannot be
/// represented in the canonical subset.
pub fn to_canonical_cbor<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    let raw = ciborium::Value::serialized(value)
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    let canonical = canonical::canonicalize(raw)?;
    let mut buf = Vec::new();
    ciborium::ser::into_writer(&canonical, &mut buf)
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decodes a value from CBOR bytes.
///
/// Decoding is tolerant of key order; only encoding is canonicalized.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Types that can be encoded to canonical CBOR.
pub trait Encode {
    /// Encodes this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Types that can be decoded from CBOR bytes.
pub trait Decode: Sized {
    /// Decodes a value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl<T: Serialize> Encode for T {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl<T: DeserializeOwned> Decode for T {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        amount: u64,
        tags: Vec<i32>,
    }

    #[test]
    fn struct_roundtrip() {
        let sample = Sample {
            name: "core".into(),
            amount: 100_000,
            tags: vec![-1, 0, 7],
        };
        let bytes = to_canonical_cbor(&sample).unwrap();
        let back: Sample = from_cbor(&bytes).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn equal_values_encode_identically() {
        let a = Sample {
            name: "x".into(),
            amount: 1,
            tags: vec![],
        };
        let b = Sample {
            name: "x".into(),
            amount: 1,
            tags: vec![],
        };
        assert_eq!(to_canonical_cbor(&a).unwrap(), to_canonical_cbor(&b).unwrap());
    }

    #[test]
    fn map_key_order_does_not_matter() {
        let mut forward = BTreeMap::new();
        forward.insert("a".to_string(), 1u8);
        forward.insert("b".to_string(), 2u8);

        // BTreeMap already sorts, so build the comparison from a HashMap
        // with a different iteration order.
        let mut reversed = std::collections::HashMap::new();
        reversed.insert("b".to_string(), 2u8);
        reversed.insert("a".to_string(), 1u8);

        assert_eq!(
            to_canonical_cbor(&forward).unwrap(),
            to_canonical_cbor(&reversed).unwrap()
        );
    }

    #[test]
    fn floats_are_rejected() {
        assert!(matches!(to_canonical_cbor(&1.5f64), Err(CodecError::Float)));
    }

    #[test]
    fn bytes_roundtrip() {
        let payload = vec![0u8, 1, 2, 255];
        let bytes = to_canonical_cbor(&payload).unwrap();
        let back: Vec<u8> = from_cbor(&bytes).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn garbage_fails_to_decode() {
        let result: CodecResult<Sample> = from_cbor(&[0xff, 0x00, 0x12]);
        assert!(result.is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn maps_roundtrip(entries in proptest::collection::btree_map("[a-z]{1,8}", any::<u64>(), 0..8)) {
                let bytes = to_canonical_cbor(&entries).unwrap();
                let back: BTreeMap<String, u64> = from_cbor(&bytes).unwrap();
                prop_assert_eq!(back, entries);
            }

            #[test]
            fn encoding_is_deterministic(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
                let first = to_canonical_cbor(&payload).unwrap();
                let second = to_canonical_cbor(&payload).unwrap();
                prop_assert_eq!(first, second);
            }
        }
    }
}

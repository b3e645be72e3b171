//! Transactions, witnesses and blocks.
//!
//! A transaction's digest is the SHA-256 of its canonical encoding;
//! witnesses sign that digest. Signature verification sits behind
//! [`SignatureVerifier`] so tests can exercise authority logic without
//! producing real signatures.

use crate::authority::PublicKey;
use crate::clock::Timestamp;
use crate::error::Rejection;
use crate::operation::Operation;
use ledgerdb_codec::{to_canonical_cbor, CodecResult};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::ops;

/// SHA-256 of a transaction's canonical encoding.
pub type TransactionDigest = [u8; 32];

/// An ordered batch of operations with a shared expiration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Wall-clock time after which the transaction must not be applied.
    pub expiration: Timestamp,
    /// The operations, applied in order, all-or-nothing.
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// The digest witnesses sign.
    pub fn digest(&self) -> CodecResult<TransactionDigest> {
        let bytes = to_canonical_cbor(self)?;
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Ok(hasher.finalize().into())
    }

    /// Stateless shape validation of the transaction and every
    /// operation in it.
    pub fn validate(&self) -> Result<(), Rejection> {
        if self.operations.is_empty() {
            return Err(Rejection::malformed("transaction carries no operations"));
        }
        for operation in &self.operations {
            operation.validate()?;
        }
        Ok(())
    }
}

/// A 64-byte Ed25519 signature.
///
/// Serde stops deriving array support at 32 elements, so the encoding is
/// spelled out: a signature is one byte string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureBytes(pub [u8; 64]);

impl Serialize for SignatureBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for SignatureBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SigVisitor;

        impl<'de> Visitor<'de> for SigVisitor {
            type Value = SignatureBytes;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("64 signature bytes")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                let bytes: [u8; 64] = v
                    .try_into()
                    .map_err(|_| E::invalid_length(v.len(), &self))?;
                Ok(SignatureBytes(bytes))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut bytes = [0u8; 64];
                for (i, slot) in bytes.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                if seq.next_element::<u8>()?.is_some() {
                    return Err(de::Error::invalid_length(65, &self));
                }
                Ok(SignatureBytes(bytes))
            }
        }

        deserializer.deserialize_bytes(SigVisitor)
    }
}

/// One signature over a transaction digest, with its claimed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// The claimed signing key.
    pub key: PublicKey,
    /// The signature over the transaction digest.
    pub signature: SignatureBytes,
}

impl Witness {
    /// Signs a digest with an Ed25519 secret key.
    #[must_use]
    pub fn sign(digest: &TransactionDigest, secret: &[u8; 32]) -> Self {
        use ed25519_dalek::{Signer, SigningKey};
        let signing_key = SigningKey::from_bytes(secret);
        let signature = signing_key.sign(digest);
        Self {
            key: PublicKey::from_bytes(signing_key.verifying_key().to_bytes()),
            signature: SignatureBytes(signature.to_bytes()),
        }
    }
}

/// A transaction with its witness signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// The signed payload.
    pub transaction: Transaction,
    /// The signatures.
    pub witnesses: Vec<Witness>,
}

impl SignedTransaction {
    /// The set of keys claimed by this transaction's witnesses.
    #[must_use]
    pub fn signed_keys(&self) -> BTreeSet<PublicKey> {
        self.witnesses.iter().map(|w| w.key).collect()
    }
}

/// Verifies witness signatures over transaction digests.
pub trait SignatureVerifier: Send + Sync {
    /// Returns true when `signature` is a valid signature of `message`
    /// by `key`.
    fn verify(&self, message: &[u8], key: &PublicKey, signature: &SignatureBytes) -> bool;
}

/// The production verifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, message: &[u8], key: &PublicKey, signature: &SignatureBytes) -> bool {
        use ed25519_dalek::{Signature, VerifyingKey};
        let Ok(verifying_key) = VerifyingKey::from_bytes(key.as_bytes()) else {
            return false;
        };
        let signature = Signature::from_bytes(&signature.0);
        verifying_key.verify_strict(message, &signature).is_ok()
    }
}

/// Validation steps that may be skipped when reapplying already-verified
/// history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkipFlags(u32);

impl SkipFlags {
    /// Skip nothing.
    pub const NONE: SkipFlags = SkipFlags(0);
    /// Skip cryptographic signature verification.
    pub const SIGNATURE_CHECK: SkipFlags = SkipFlags(1);
    /// Skip authority satisfaction checks.
    pub const AUTHORITY_CHECK: SkipFlags = SkipFlags(1 << 1);
    /// Skip the recent-transaction duplicate check.
    pub const DUPE_CHECK: SkipFlags = SkipFlags(1 << 2);
    /// Skip undo bookkeeping. For replaying known-good history: a
    /// transaction applied this way cannot be reverted, and a mid-apply
    /// failure leaves whatever already applied in place.
    pub const UNDO_TRACKING: SkipFlags = SkipFlags(1 << 3);

    /// Whether every flag in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: SkipFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl ops::BitOr for SkipFlags {
    type Output = SkipFlags;

    fn bitor(self, other: SkipFlags) -> SkipFlags {
        SkipFlags(self.0 | other.0)
    }
}

/// A batch of transactions applied atomically at one timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Digest of the previous block.
    pub previous: [u8; 32],
    /// The time at which expiration is judged for every transaction in
    /// the block. Using the block's own timestamp keeps replay
    /// deterministic.
    pub timestamp: Timestamp,
    /// The transactions, applied in order.
    pub transactions: Vec<SignedTransaction>,
}

impl Block {
    /// The block's digest.
    pub fn digest(&self) -> CodecResult<[u8; 32]> {
        let bytes = to_canonical_cbor(self)?;
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Ok(hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjectId, ObjectType};
    use crate::operation::TransferOperation;
    use crate::value::{AssetAmount, Share};
    use ledgerdb_codec::from_cbor;

    fn sample_transaction(expiration: u64) -> Transaction {
        Transaction {
            expiration: Timestamp(expiration),
            operations: vec![Operation::Transfer(TransferOperation {
                fee: AssetAmount::core(Share(10)),
                from: ObjectId::new(ObjectType::ACCOUNT, 1).unwrap(),
                to: ObjectId::new(ObjectType::ACCOUNT, 2).unwrap(),
                amount: AssetAmount::core(Share(5)),
            })],
        }
    }

    #[test]
    fn digest_tracks_content() {
        let a = sample_transaction(100).digest().unwrap();
        let b = sample_transaction(100).digest().unwrap();
        let c = sample_transaction(101).digest().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn empty_transactions_are_malformed() {
        let tx = Transaction {
            expiration: Timestamp(100),
            operations: Vec::new(),
        };
        assert!(tx.validate().is_err());
        assert!(sample_transaction(100).validate().is_ok());
    }

    #[test]
    fn sign_verify_roundtrip() {
        let digest = sample_transaction(100).digest().unwrap();
        let witness = Witness::sign(&digest, &[7; 32]);
        assert!(Ed25519Verifier.verify(&digest, &witness.key, &witness.signature));

        let other = sample_transaction(101).digest().unwrap();
        assert!(!Ed25519Verifier.verify(&other, &witness.key, &witness.signature));
    }

    #[test]
    fn witness_encoding_roundtrips() {
        let digest = sample_transaction(100).digest().unwrap();
        let witness = Witness::sign(&digest, &[9; 32]);
        let bytes = to_canonical_cbor(&witness).unwrap();
        let back: Witness = from_cbor(&bytes).unwrap();
        assert_eq!(back, witness);
    }

    #[test]
    fn signed_keys_deduplicate() {
        let digest = sample_transaction(100).digest().unwrap();
        let witness = Witness::sign(&digest, &[7; 32]);
        let tx = SignedTransaction {
            transaction: sample_transaction(100),
            witnesses: vec![witness, witness],
        };
        assert_eq!(tx.signed_keys().len(), 1);
    }

    #[test]
    fn skip_flags_combine() {
        let flags = SkipFlags::SIGNATURE_CHECK | SkipFlags::DUPE_CHECK;
        assert!(flags.contains(SkipFlags::SIGNATURE_CHECK));
        assert!(flags.contains(SkipFlags::DUPE_CHECK));
        assert!(!flags.contains(SkipFlags::AUTHORITY_CHECK));
        assert!(SkipFlags::NONE.contains(SkipFlags::NONE));
    }
}

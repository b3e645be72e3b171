//! Weighted multi-party authorities.
//!
//! An [`Authority`] is satisfied when the weights of its approving keys
//! and accounts reach `weight_threshold`. Account entries delegate to
//! another account's authority of the same class, which is what makes
//! verification recursive.

use crate::object::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A 32-byte Ed25519 public key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Which of an account's two authorities is being exercised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AuthorityClass {
    /// The high-privilege authority controlling the account itself.
    Owner,
    /// The authority exercised by ordinary operations.
    Active,
}

impl fmt::Display for AuthorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorityClass::Owner => write!(f, "owner"),
            AuthorityClass::Active => write!(f, "active"),
        }
    }
}

/// A weighted threshold over keys and delegated accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    /// Total approval weight required.
    pub weight_threshold: u32,
    /// Delegations: satisfying the named account's authority of the same
    /// class contributes the mapped weight.
    pub account_auths: BTreeMap<ObjectId, u16>,
    /// Direct keys: a signature by the key contributes the mapped weight.
    pub key_auths: BTreeMap<PublicKey, u16>,
}

impl Authority {
    /// An authority satisfied by a single signature from one key.
    #[must_use]
    pub fn single_key(key: PublicKey) -> Self {
        let mut key_auths = BTreeMap::new();
        key_auths.insert(key, 1);
        Self {
            weight_threshold: 1,
            account_auths: BTreeMap::new(),
            key_auths,
        }
    }

    /// The sum of all entry weights.
    #[must_use]
    pub fn total_weight(&self) -> u64 {
        let accounts: u64 = self.account_auths.values().map(|w| u64::from(*w)).sum();
        let keys: u64 = self.key_auths.values().map(|w| u64::from(*w)).sum();
        accounts + keys
    }

    /// Checks that the threshold is reachable: a zero threshold is only
    /// legal when the authority is deliberately empty (protocol-owned
    /// accounts), and a positive threshold must not exceed the total
    /// available weight.
    pub fn validate(&self) -> Result<(), String> {
        let total = self.total_weight();
        if self.weight_threshold == 0 {
            if total != 0 {
                return Err("zero threshold with non-empty authority".to_string());
            }
            return Ok(());
        }
        if u64::from(self.weight_threshold) > total {
            return Err(format!(
                "threshold {} exceeds total available weight {total}",
                self.weight_threshold
            ));
        }
        Ok(())
    }
}

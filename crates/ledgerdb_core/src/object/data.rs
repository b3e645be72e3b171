//! The closed set of stored entity kinds.
//!
//! Every entity kind is a variant of [`ObjectData`]; dispatch is a pattern
//! match, not a virtual call. Each variant owns exactly one [`ObjectId`],
//! assigned by its index at creation and immutable thereafter.

use crate::authority::Authority;
use crate::object::{ObjectId, ObjectType};
use crate::value::{Price, Share};
use ledgerdb_codec::{to_canonical_cbor, CodecResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A named principal able to authorize operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// This entity's id.
    pub id: ObjectId,
    /// Globally unique account name.
    pub name: String,
    /// Highest-privilege authority (key rotation, ownership transfer).
    pub owner: Authority,
    /// Day-to-day authority (transfers, orders).
    pub active: Authority,
    /// Id of this account's statistics entity.
    pub statistics: ObjectId,
}

/// Frequently mutated per-account counters, split from [`Account`] so
/// that routine activity does not snapshot the authority structures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatistics {
    /// This entity's id.
    pub id: ObjectId,
    /// The account these statistics belong to.
    pub owner: ObjectId,
    /// Core-denominated fees paid but not yet redistributed at a
    /// maintenance boundary.
    pub pending_fees: Share,
}

/// Holdings of one account in one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// This entity's id.
    pub id: ObjectId,
    /// The holding account.
    pub owner: ObjectId,
    /// The held asset.
    pub asset: ObjectId,
    /// Current balance.
    pub balance: Share,
}

/// A transferable asset registered on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// This entity's id.
    pub id: ObjectId,
    /// Globally unique ticker symbol.
    pub symbol: String,
    /// The issuing account.
    pub issuer: ObjectId,
    /// Rate used to convert core-denominated fees into this asset.
    pub core_exchange_rate: Price,
    /// Id of this asset's dynamic data entity.
    pub dynamic_data: ObjectId,
}

/// Frequently mutated per-asset counters, split from [`Asset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDynamicData {
    /// This entity's id.
    pub id: ObjectId,
    /// Units currently in circulation.
    pub current_supply: Share,
    /// Fees collected in this asset, awaiting maintenance processing.
    pub accumulated_fees: Share,
    /// Core-asset reserve backing fee payment in this asset.
    pub fee_pool: Share,
}

/// A stored entity: the tagged union over every concrete kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectData {
    /// An [`Account`].
    Account(Account),
    /// An [`AccountStatistics`].
    AccountStatistics(AccountStatistics),
    /// An [`AccountBalance`].
    AccountBalance(AccountBalance),
    /// An [`Asset`].
    Asset(Asset),
    /// An [`AssetDynamicData`].
    AssetDynamicData(AssetDynamicData),
}

impl ObjectData {
    /// Returns this entity's id.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        match self {
            ObjectData::Account(o) => o.id,
            ObjectData::AccountStatistics(o) => o.id,
            ObjectData::AccountBalance(o) => o.id,
            ObjectData::Asset(o) => o.id,
            ObjectData::AssetDynamicData(o) => o.id,
        }
    }

    /// Returns the (space, type) pair this variant belongs to.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectData::Account(_) => ObjectType::ACCOUNT,
            ObjectData::AccountStatistics(_) => ObjectType::ACCOUNT_STATISTICS,
            ObjectData::AccountBalance(_) => ObjectType::ACCOUNT_BALANCE,
            ObjectData::Asset(_) => ObjectType::ASSET,
            ObjectData::AssetDynamicData(_) => ObjectType::ASSET_DYNAMIC_DATA,
        }
    }

    /// Serializes the entity to canonical bytes.
    pub fn pack(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }

    /// Returns the entity's content hash: SHA-256 over the canonical
    /// bytes. Identical entities hash identically on every replica.
    pub fn content_hash(&self) -> CodecResult<[u8; 32]> {
        let packed = self.pack()?;
        let mut hasher = Sha256::new();
        hasher.update(packed);
        Ok(hasher.finalize().into())
    }

    /// Returns the inner account, if this is one.
    #[must_use]
    pub fn as_account(&self) -> Option<&Account> {
        match self {
            ObjectData::Account(o) => Some(o),
            _ => None,
        }
    }

    /// Mutable access to the inner account.
    pub fn as_account_mut(&mut self) -> Option<&mut Account> {
        match self {
            ObjectData::Account(o) => Some(o),
            _ => None,
        }
    }

    /// Returns the inner account statistics, if this is one.
    #[must_use]
    pub fn as_account_statistics(&self) -> Option<&AccountStatistics> {
        match self {
            ObjectData::AccountStatistics(o) => Some(o),
            _ => None,
        }
    }

    /// Mutable access to the inner account statistics.
    pub fn as_account_statistics_mut(&mut self) -> Option<&mut AccountStatistics> {
        match self {
            ObjectData::AccountStatistics(o) => Some(o),
            _ => None,
        }
    }

    /// Returns the inner balance, if this is one.
    #[must_use]
    pub fn as_account_balance(&self) -> Option<&AccountBalance> {
        match self {
            ObjectData::AccountBalance(o) => Some(o),
            _ => None,
        }
    }

    /// Mutable access to the inner balance.
    pub fn as_account_balance_mut(&mut self) -> Option<&mut AccountBalance> {
        match self {
            ObjectData::AccountBalance(o) => Some(o),
            _ => None,
        }
    }

    /// Returns the inner asset, if this is one.
    #[must_use]
    pub fn as_asset(&self) -> Option<&Asset> {
        match self {
            ObjectData::Asset(o) => Some(o),
            _ => None,
        }
    }

    /// Mutable access to the inner asset.
    pub fn as_asset_mut(&mut self) -> Option<&mut Asset> {
        match self {
            ObjectData::Asset(o) => Some(o),
            _ => None,
        }
    }

    /// Returns the inner asset dynamic data, if this is one.
    #[must_use]
    pub fn as_asset_dynamic_data(&self) -> Option<&AssetDynamicData> {
        match self {
            ObjectData::AssetDynamicData(o) => Some(o),
            _ => None,
        }
    }

    /// Mutable access to the inner asset dynamic data.
    pub fn as_asset_dynamic_data_mut(&mut self) -> Option<&mut AssetDynamicData> {
        match self {
            ObjectData::AssetDynamicData(o) => Some(o),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::SENTINEL_ACCOUNT_ID;

    fn sample_balance(balance: u64) -> ObjectData {
        ObjectData::AccountBalance(AccountBalance {
            id: ObjectId::new(ObjectType::ACCOUNT_BALANCE, 3).unwrap(),
            owner: SENTINEL_ACCOUNT_ID,
            asset: crate::object::CORE_ASSET_ID,
            balance: Share(balance),
        })
    }

    #[test]
    fn object_type_matches_variant() {
        assert_eq!(
            sample_balance(1).object_type(),
            ObjectType::ACCOUNT_BALANCE
        );
    }

    #[test]
    fn content_hash_is_stable_and_content_sensitive() {
        let a = sample_balance(10);
        let b = sample_balance(10);
        let c = sample_balance(11);
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
        assert_ne!(a.content_hash().unwrap(), c.content_hash().unwrap());
    }

    #[test]
    fn accessors_are_variant_selective() {
        let obj = sample_balance(5);
        assert!(obj.as_account_balance().is_some());
        assert!(obj.as_account().is_none());
        assert!(obj.as_asset().is_none());
    }
}

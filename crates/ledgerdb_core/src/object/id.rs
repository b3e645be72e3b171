//! Object identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Space for protocol-level entities (accounts, assets).
pub const PROTOCOL_SPACE: u8 = 1;
/// Space for implementation-level entities (statistics, balances, dynamic data).
pub const IMPLEMENTATION_SPACE: u8 = 2;
/// Space for relative ids, resolved against the enclosing transaction's
/// operation results rather than the database.
pub const RELATIVE_SPACE: u8 = 0;

/// Largest representable instance number (48 bits).
pub const MAX_INSTANCE: u64 = (1 << 48) - 1;

/// The account that satisfies every authority requirement.
///
/// Checking authority against this account terminates immediately with
/// success; it anchors protocol-owned objects that no key controls.
pub const SENTINEL_ACCOUNT_ID: ObjectId = ObjectId::new_const(ObjectType::ACCOUNT, 0);

/// The network's core asset, in which all fee schedules are denominated.
pub const CORE_ASSET_ID: ObjectId = ObjectId::new_const(ObjectType::ASSET, 0);

/// A (space, type) pair identifying exactly one index in the database.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ObjectType {
    /// Id space.
    pub space: u8,
    /// Type tag within the space.
    pub ty: u8,
}

impl ObjectType {
    /// Account entities.
    pub const ACCOUNT: ObjectType = ObjectType::new(PROTOCOL_SPACE, 0);
    /// Asset entities.
    pub const ASSET: ObjectType = ObjectType::new(PROTOCOL_SPACE, 1);
    /// Per-account statistics entities.
    pub const ACCOUNT_STATISTICS: ObjectType = ObjectType::new(IMPLEMENTATION_SPACE, 0);
    /// Per-(account, asset) balance entities.
    pub const ACCOUNT_BALANCE: ObjectType = ObjectType::new(IMPLEMENTATION_SPACE, 1);
    /// Per-asset dynamic data entities.
    pub const ASSET_DYNAMIC_DATA: ObjectType = ObjectType::new(IMPLEMENTATION_SPACE, 2);

    /// Creates a (space, type) pair.
    #[must_use]
    pub const fn new(space: u8, ty: u8) -> Self {
        Self { space, ty }
    }

    /// Every type the database schema registers, in registration order.
    #[must_use]
    pub const fn all() -> [ObjectType; 5] {
        [
            Self::ACCOUNT,
            Self::ASSET,
            Self::ACCOUNT_STATISTICS,
            Self::ACCOUNT_BALANCE,
            Self::ASSET_DYNAMIC_DATA,
        ]
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.space, self.ty)
    }
}

/// Unique identifier of one stored entity: (space, type, instance).
///
/// Ids are the only cross-entity reference mechanism; entities hold ids of
/// other entities and dereference them on demand, never live pointers.
/// Ordering is lexicographic on the triple. Instances are dense within an
/// index and monotonically non-decreasing while the index exists (reused
/// only when a creation is undone).
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ObjectId {
    space: u8,
    ty: u8,
    instance: u64,
}

impl ObjectId {
    /// Creates an id, or `None` when `instance` exceeds [`MAX_INSTANCE`].
    #[must_use]
    pub fn new(object_type: ObjectType, instance: u64) -> Option<Self> {
        if instance > MAX_INSTANCE {
            return None;
        }
        Some(Self::new_const(object_type, instance))
    }

    pub(crate) const fn new_const(object_type: ObjectType, instance: u64) -> Self {
        Self {
            space: object_type.space,
            ty: object_type.ty,
            instance,
        }
    }

    /// Creates a relative id referring to the result of the `index`-th
    /// operation earlier in the same transaction.
    #[must_use]
    pub const fn relative(index: u16) -> Self {
        Self {
            space: RELATIVE_SPACE,
            ty: 0,
            instance: index as u64,
        }
    }

    /// Returns the id space.
    #[must_use]
    pub const fn space(self) -> u8 {
        self.space
    }

    /// Returns the type tag.
    #[must_use]
    pub const fn ty(self) -> u8 {
        self.ty
    }

    /// Returns the instance number.
    #[must_use]
    pub const fn instance(self) -> u64 {
        self.instance
    }

    /// Returns the (space, type) pair selecting this id's index.
    #[must_use]
    pub const fn object_type(self) -> ObjectType {
        ObjectType::new(self.space, self.ty)
    }

    /// Returns true for relative ids (space 0).
    #[must_use]
    pub const fn is_relative(self) -> bool {
        self.space == RELATIVE_SPACE
    }

    /// Packs the id into its 8-byte persistence key:
    /// space, type, then the instance as 6 big-endian bytes.
    #[must_use]
    pub fn pack(self) -> [u8; 8] {
        let inst = self.instance.to_be_bytes();
        [
            self.space, self.ty, inst[2], inst[3], inst[4], inst[5], inst[6], inst[7],
        ]
    }

    /// Unpacks an id from its 8-byte persistence key.
    #[must_use]
    pub fn unpack(bytes: &[u8; 8]) -> Self {
        let mut inst = [0u8; 8];
        inst[2..].copy_from_slice(&bytes[2..]);
        Self {
            space: bytes[0],
            ty: bytes[1],
            instance: u64::from_be_bytes(inst),
        }
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.space, self.ty, self.instance)
    }
}

impl FromStr for ObjectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        let mut next = |what: &str| {
            parts
                .next()
                .ok_or_else(|| format!("object id {s:?} is missing its {what}"))
        };
        let space = next("space")?
            .parse::<u8>()
            .map_err(|e| format!("bad space in {s:?}: {e}"))?;
        let ty = next("type")?
            .parse::<u8>()
            .map_err(|e| format!("bad type in {s:?}: {e}"))?;
        let instance = next("instance")?
            .parse::<u64>()
            .map_err(|e| format!("bad instance in {s:?}: {e}"))?;
        ObjectId::new(ObjectType::new(space, ty), instance)
            .ok_or_else(|| format!("instance out of range in {s:?}"))
    }
}

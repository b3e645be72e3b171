//! Object identifiers and the closed set of stored entity kinds.

mod data;
mod id;

pub use data::{Account, AccountBalance, AccountStatistics, Asset, AssetDynamicData, ObjectData};
pub use id::{
    ObjectId, ObjectType, CORE_ASSET_ID, IMPLEMENTATION_SPACE, MAX_INSTANCE, PROTOCOL_SPACE,
    RELATIVE_SPACE, SENTINEL_ACCOUNT_ID,
};

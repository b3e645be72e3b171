//! The object database: one index per registered type plus snapshot
//! persistence.
//!
//! The database is the committed-state layer. It knows nothing about
//! undo; [`crate::UndoDatabase`] wraps it and routes every mutation
//! through here after recording what is needed to reverse it.
//!
//! # Snapshot format
//!
//! State persists as a tagged record stream:
//!
//! ```text
//! magic "LDBS" | version u16 BE | record* | END record
//! record := tag u8 | len u32 BE | payload
//! ```
//!
//! Object records carry the packed id followed by the entity's canonical
//! bytes; next-id records carry each index's id counter. A stream without
//! its END record was interrupted mid-write and is rejected as corrupt.

use crate::config::Config;
use crate::error::{LedgerError, LedgerResult};
use crate::index::{ObjectIndex, OrderingSpec};
use crate::object::{
    Account, AccountBalance, AccountStatistics, Asset, AssetDynamicData, ObjectData, ObjectId,
    ObjectType,
};
use ledgerdb_codec::{from_cbor, to_canonical_cbor};
use ledgerdb_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

const MAGIC: &[u8; 4] = b"LDBS";
const VERSION: u16 = 1;

const TAG_OBJECT: u8 = 1;
const TAG_NEXT_ID: u8 = 2;
const TAG_END: u8 = 3;

/// Strongly-typed object store with secondary orderings and snapshot
/// persistence.
pub struct ObjectDatabase {
    config: Config,
    indexes: BTreeMap<ObjectType, ObjectIndex>,
    backend: Option<Box<dyn StorageBackend>>,
}

fn schema() -> BTreeMap<ObjectType, ObjectIndex> {
    let mut indexes = BTreeMap::new();

    indexes.insert(
        ObjectType::ACCOUNT,
        ObjectIndex::new(
            ObjectType::ACCOUNT,
            vec![OrderingSpec {
                name: "by_name",
                unique: true,
                extract: |obj| obj.as_account().map(|a| a.name.as_bytes().to_vec()),
            }],
        ),
    );

    indexes.insert(
        ObjectType::ASSET,
        ObjectIndex::new(
            ObjectType::ASSET,
            vec![OrderingSpec {
                name: "by_symbol",
                unique: true,
                extract: |obj| obj.as_asset().map(|a| a.symbol.as_bytes().to_vec()),
            }],
        ),
    );

    indexes.insert(
        ObjectType::ACCOUNT_STATISTICS,
        ObjectIndex::new(
            ObjectType::ACCOUNT_STATISTICS,
            vec![OrderingSpec {
                name: "by_owner",
                unique: true,
                extract: |obj| {
                    obj.as_account_statistics()
                        .map(|s| s.owner.pack().to_vec())
                },
            }],
        ),
    );

    indexes.insert(
        ObjectType::ACCOUNT_BALANCE,
        ObjectIndex::new(
            ObjectType::ACCOUNT_BALANCE,
            vec![
                OrderingSpec {
                    name: "by_owner_asset",
                    unique: true,
                    extract: |obj| {
                        obj.as_account_balance().map(|b| {
                            let mut key = b.owner.pack().to_vec();
                            key.extend_from_slice(&b.asset.pack());
                            key
                        })
                    },
                },
                OrderingSpec {
                    name: "by_owner",
                    unique: false,
                    extract: |obj| obj.as_account_balance().map(|b| b.owner.pack().to_vec()),
                },
            ],
        ),
    );

    indexes.insert(
        ObjectType::ASSET_DYNAMIC_DATA,
        ObjectIndex::new(ObjectType::ASSET_DYNAMIC_DATA, Vec::new()),
    );

    indexes
}

impl ObjectDatabase {
    /// Opens a database persisted to the given file.
    pub fn open(path: &Path, config: Config) -> LedgerResult<Self> {
        if !config.create_if_missing && !path.exists() {
            return Err(LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("snapshot {} does not exist", path.display()),
            )));
        }
        let backend = FileBackend::open_with_create_dirs(path)?;
        info!(path = %path.display(), "opening object database");
        Self::open_with_backend(Box::new(backend), config)
    }

    /// Opens a database backed by volatile memory.
    pub fn open_in_memory(config: Config) -> LedgerResult<Self> {
        Self::open_with_backend(Box::new(InMemoryBackend::new()), config)
    }

    /// Opens a database over an arbitrary backend, loading any existing
    /// snapshot.
    pub fn open_with_backend(
        backend: Box<dyn StorageBackend>,
        config: Config,
    ) -> LedgerResult<Self> {
        let mut db = Self {
            config,
            indexes: schema(),
            backend: Some(backend),
        };
        db.load()?;
        Ok(db)
    }

    /// Writes the full snapshot stream to the backend.
    pub fn flush(&mut self) -> LedgerResult<()> {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_be_bytes());

        for index in self.indexes.values() {
            for object in index.iter() {
                let mut payload = object.id().pack().to_vec();
                payload.extend_from_slice(&to_canonical_cbor(object)?);
                push_record(&mut buf, TAG_OBJECT, &payload);
            }
            let object_type = index.object_type();
            let mut payload = vec![object_type.space, object_type.ty];
            payload.extend_from_slice(&index.next_instance().to_be_bytes());
            push_record(&mut buf, TAG_NEXT_ID, &payload);
        }
        push_record(&mut buf, TAG_END, &[]);

        let backend = self
            .backend
            .as_mut()
            .ok_or(LedgerError::DatabaseClosed)?;
        backend.truncate(0)?;
        backend.append(&buf)?;
        backend.flush()?;
        if self.config.sync_on_flush {
            backend.sync()?;
        }
        debug!(bytes = buf.len(), "flushed snapshot");
        Ok(())
    }

    /// Flushes and releases the backend. Further flushes fail with
    /// [`LedgerError::DatabaseClosed`].
    pub fn close(&mut self) -> LedgerResult<()> {
        self.flush()?;
        self.backend = None;
        Ok(())
    }

    /// Discards all state, in memory and on the backend.
    pub fn wipe(&mut self) -> LedgerResult<()> {
        self.indexes = schema();
        if let Some(backend) = self.backend.as_mut() {
            backend.truncate(0)?;
            backend.flush()?;
        }
        Ok(())
    }

    fn load(&mut self) -> LedgerResult<()> {
        let backend = self
            .backend
            .as_ref()
            .ok_or(LedgerError::DatabaseClosed)?;
        let size = backend.size()?;
        if size == 0 {
            return Ok(());
        }
        let bytes = backend.read_at(0, usize::try_from(size).map_err(|_| {
            LedgerError::corruption("snapshot too large for this platform")
        })?)?;

        if bytes.len() < 6 || &bytes[..4] != MAGIC {
            return Err(LedgerError::corruption("snapshot magic mismatch"));
        }
        let version = u16::from_be_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(LedgerError::corruption(format!(
                "unsupported snapshot version {version}"
            )));
        }

        let mut pos = 6;
        let mut objects = 0usize;
        loop {
            let (tag, payload, next) = read_record(&bytes, pos)?;
            pos = next;
            match tag {
                TAG_OBJECT => {
                    if payload.len() < 8 {
                        return Err(LedgerError::corruption("truncated object record"));
                    }
                    let mut id_bytes = [0u8; 8];
                    id_bytes.copy_from_slice(&payload[..8]);
                    let id = ObjectId::unpack(&id_bytes);
                    let object: ObjectData = from_cbor(&payload[8..])?;
                    if object.id() != id {
                        return Err(LedgerError::corruption(format!(
                            "object record keyed {id} contains object {}",
                            object.id()
                        )));
                    }
                    let index = self
                        .indexes
                        .get_mut(&object.object_type())
                        .ok_or_else(|| LedgerError::unknown_object_type(object.object_type()))?;
                    index.put(object);
                    objects += 1;
                }
                TAG_NEXT_ID => {
                    if payload.len() != 10 {
                        return Err(LedgerError::corruption("truncated next-id record"));
                    }
                    let object_type = ObjectType::new(payload[0], payload[1]);
                    let mut counter = [0u8; 8];
                    counter.copy_from_slice(&payload[2..]);
                    let index = self
                        .indexes
                        .get_mut(&object_type)
                        .ok_or_else(|| LedgerError::unknown_object_type(object_type))?;
                    index.set_next_instance(u64::from_be_bytes(counter));
                }
                TAG_END => {
                    info!(objects, "loaded snapshot");
                    return Ok(());
                }
                other => {
                    return Err(LedgerError::corruption(format!(
                        "unknown snapshot record tag {other}"
                    )));
                }
            }
        }
    }

    /// The configuration the database was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The index for a registered type.
    pub fn index(&self, object_type: ObjectType) -> LedgerResult<&ObjectIndex> {
        self.indexes
            .get(&object_type)
            .ok_or_else(|| LedgerError::unknown_object_type(object_type))
    }

    pub(crate) fn index_mut(&mut self, object_type: ObjectType) -> LedgerResult<&mut ObjectIndex> {
        self.indexes
            .get_mut(&object_type)
            .ok_or_else(|| LedgerError::unknown_object_type(object_type))
    }

    /// Creates an entity in the index for `object_type`.
    pub fn create<F>(&mut self, object_type: ObjectType, build: F) -> LedgerResult<ObjectId>
    where
        F: FnOnce(ObjectId) -> ObjectData,
    {
        self.index_mut(object_type)?.create(build)
    }

    /// Modifies an entity in place through a copy-validate-commit cycle.
    pub fn modify<F>(&mut self, id: ObjectId, mutate: F) -> LedgerResult<()>
    where
        F: FnOnce(&mut ObjectData),
    {
        self.index_mut(id.object_type())?.modify(id, mutate)
    }

    /// Removes an entity, returning it.
    pub fn remove(&mut self, id: ObjectId) -> LedgerResult<ObjectData> {
        self.index_mut(id.object_type())?.remove(id)
    }

    /// Looks up an entity by id across all indexes.
    #[must_use]
    pub fn find(&self, id: ObjectId) -> Option<&ObjectData> {
        self.indexes.get(&id.object_type())?.find(id)
    }

    /// Looks up an entity by id, failing when absent.
    pub fn get(&self, id: ObjectId) -> LedgerResult<&ObjectData> {
        self.index(id.object_type())?.get(id)
    }

    /// Content digest over the entire database: SHA-256-based,
    /// order-independent within each index, covering id counters.
    pub fn digest(&self) -> LedgerResult<[u8; 32]> {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        for index in self.indexes.values() {
            hasher.update(index.digest()?);
        }
        Ok(hasher.finalize().into())
    }

    /// Fetches an account by id.
    pub fn account(&self, id: ObjectId) -> LedgerResult<&Account> {
        self.get(id)?
            .as_account()
            .ok_or(LedgerError::TypeMismatch { id })
    }

    /// Fetches an asset by id.
    pub fn asset(&self, id: ObjectId) -> LedgerResult<&Asset> {
        self.get(id)?
            .as_asset()
            .ok_or(LedgerError::TypeMismatch { id })
    }

    /// Fetches account statistics by id.
    pub fn account_statistics(&self, id: ObjectId) -> LedgerResult<&AccountStatistics> {
        self.get(id)?
            .as_account_statistics()
            .ok_or(LedgerError::TypeMismatch { id })
    }

    /// Fetches a balance entity by id.
    pub fn account_balance(&self, id: ObjectId) -> LedgerResult<&AccountBalance> {
        self.get(id)?
            .as_account_balance()
            .ok_or(LedgerError::TypeMismatch { id })
    }

    /// Fetches asset dynamic data by id.
    pub fn asset_dynamic_data(&self, id: ObjectId) -> LedgerResult<&AssetDynamicData> {
        self.get(id)?
            .as_asset_dynamic_data()
            .ok_or(LedgerError::TypeMismatch { id })
    }

    /// Looks up an account by its unique name.
    #[must_use]
    pub fn account_by_name(&self, name: &str) -> Option<&Account> {
        self.indexes
            .get(&ObjectType::ACCOUNT)?
            .by_unique_key("by_name", name.as_bytes())?
            .as_account()
    }

    /// Looks up an asset by its unique symbol.
    #[must_use]
    pub fn asset_by_symbol(&self, symbol: &str) -> Option<&Asset> {
        self.indexes
            .get(&ObjectType::ASSET)?
            .by_unique_key("by_symbol", symbol.as_bytes())?
            .as_asset()
    }

    /// Looks up the balance entity of one account in one asset.
    #[must_use]
    pub fn account_balance_of(&self, owner: ObjectId, asset: ObjectId) -> Option<&AccountBalance> {
        let mut key = owner.pack().to_vec();
        key.extend_from_slice(&asset.pack());
        self.indexes
            .get(&ObjectType::ACCOUNT_BALANCE)?
            .by_unique_key("by_owner_asset", &key)?
            .as_account_balance()
    }

    /// All balance entities of one account, in id order.
    #[must_use]
    pub fn balances_of(&self, owner: ObjectId) -> Vec<&AccountBalance> {
        let Some(index) = self.indexes.get(&ObjectType::ACCOUNT_BALANCE) else {
            return Vec::new();
        };
        index
            .by_key("by_owner", &owner.pack())
            .into_iter()
            .filter_map(ObjectData::as_account_balance)
            .collect()
    }
}

fn push_record(buf: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    buf.push(tag);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
}

fn read_record(bytes: &[u8], pos: usize) -> LedgerResult<(u8, &[u8], usize)> {
    if pos + 5 > bytes.len() {
        return Err(LedgerError::corruption(
            "snapshot ends without an END record",
        ));
    }
    let tag = bytes[pos];
    let len = u32::from_be_bytes([bytes[pos + 1], bytes[pos + 2], bytes[pos + 3], bytes[pos + 4]])
        as usize;
    let start = pos + 5;
    let end = start
        .checked_add(len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| LedgerError::corruption("snapshot record overruns the stream"))?;
    Ok((tag, &bytes[start..end], end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::Authority;
    use crate::object::{CORE_ASSET_ID, SENTINEL_ACCOUNT_ID};
    use crate::value::Share;
    use std::collections::BTreeMap as Map;
    use tempfile::tempdir;

    fn empty_authority() -> Authority {
        Authority {
            weight_threshold: 0,
            account_auths: Map::new(),
            key_auths: Map::new(),
        }
    }

    fn create_account(db: &mut ObjectDatabase, name: &str) -> ObjectId {
        let stats = db
            .create(ObjectType::ACCOUNT_STATISTICS, |id| {
                ObjectData::AccountStatistics(AccountStatistics {
                    id,
                    owner: SENTINEL_ACCOUNT_ID,
                    pending_fees: Share::ZERO,
                })
            })
            .unwrap();
        let name = name.to_string();
        let account = db
            .create(ObjectType::ACCOUNT, move |id| {
                ObjectData::Account(Account {
                    id,
                    name,
                    owner: empty_authority(),
                    active: empty_authority(),
                    statistics: stats,
                })
            })
            .unwrap();
        db.modify(stats, |obj| {
            obj.as_account_statistics_mut().unwrap().owner = account;
        })
        .unwrap();
        account
    }

    #[test]
    fn named_lookup_roundtrip() {
        let mut db = ObjectDatabase::open_in_memory(Config::default()).unwrap();
        let id = create_account(&mut db, "alice");
        assert_eq!(db.account_by_name("alice").unwrap().id, id);
        assert!(db.account_by_name("bob").is_none());
    }

    #[test]
    fn typed_accessor_rejects_wrong_kind() {
        let mut db = ObjectDatabase::open_in_memory(Config::default()).unwrap();
        let id = create_account(&mut db, "alice");
        assert!(matches!(db.asset(id), Err(LedgerError::TypeMismatch { .. })));
        let stats_id = db.account(id).unwrap().statistics;
        assert!(db.account_statistics(stats_id).is_ok());
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.ldb");

        let digest = {
            let mut db = ObjectDatabase::open(&path, Config::default()).unwrap();
            create_account(&mut db, "alice");
            create_account(&mut db, "bob");
            db.create(ObjectType::ACCOUNT_BALANCE, |id| {
                ObjectData::AccountBalance(AccountBalance {
                    id,
                    owner: SENTINEL_ACCOUNT_ID,
                    asset: CORE_ASSET_ID,
                    balance: Share(42),
                })
            })
            .unwrap();
            db.flush().unwrap();
            db.digest().unwrap()
        };

        let db = ObjectDatabase::open(&path, Config::default()).unwrap();
        assert_eq!(db.digest().unwrap(), digest);
        assert!(db.account_by_name("bob").is_some());
        assert_eq!(
            db.index(ObjectType::ACCOUNT).unwrap().next_instance(),
            2
        );
    }

    #[test]
    fn truncated_snapshot_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.ldb");

        {
            let mut db = ObjectDatabase::open(&path, Config::default()).unwrap();
            create_account(&mut db, "alice");
            db.flush().unwrap();
        }
        // Chop off the END record.
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        assert!(matches!(
            ObjectDatabase::open(&path, Config::default()),
            Err(LedgerError::Corruption { .. })
        ));
    }

    #[test]
    fn missing_snapshot_without_create_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.ldb");
        let config = Config::default().create_if_missing(false);
        assert!(ObjectDatabase::open(&path, config).is_err());
    }

    #[test]
    fn close_then_flush_fails() {
        let mut db = ObjectDatabase::open_in_memory(Config::default()).unwrap();
        db.close().unwrap();
        assert!(matches!(db.flush(), Err(LedgerError::DatabaseClosed)));
    }

    #[test]
    fn wipe_resets_indexes_and_counters() {
        let mut db = ObjectDatabase::open_in_memory(Config::default()).unwrap();
        create_account(&mut db, "alice");
        db.wipe().unwrap();
        assert!(db.account_by_name("alice").is_none());
        assert_eq!(db.index(ObjectType::ACCOUNT).unwrap().next_instance(), 0);
    }

    #[test]
    fn digests_agree_across_construction_orders() {
        let mut a = ObjectDatabase::open_in_memory(Config::default()).unwrap();
        let mut b = ObjectDatabase::open_in_memory(Config::default()).unwrap();
        create_account(&mut a, "alice");
        create_account(&mut a, "bob");
        create_account(&mut b, "alice");
        create_account(&mut b, "bob");
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
    }
}

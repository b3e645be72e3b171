//! Per-type object indexes.
//!
//! One [`ObjectIndex`] holds every entity of a single (space, type) pair,
//! owns the id assignment counter for that pair, and maintains the
//! declared secondary orderings. Secondary keys are extracted byte
//! strings, so all orderings share one map shape and comparisons stay
//! deterministic.
//!
//! Mutations are check-first: unique constraints are verified before any
//! map is touched, so a rejected mutation leaves the index exactly as it
//! was.

use crate::error::{LedgerError, LedgerResult};
use crate::object::{ObjectData, ObjectId, ObjectType};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Extracts an ordering key from an entity, or `None` when the entity
/// does not participate in the ordering.
pub type KeyExtractor = fn(&ObjectData) -> Option<Vec<u8>>;

/// Declaration of one secondary ordering over an index.
pub struct OrderingSpec {
    /// Name used for diagnostics and lookups.
    pub name: &'static str,
    /// Whether two entities may share a key.
    pub unique: bool,
    /// The key extraction function.
    pub extract: KeyExtractor,
}

/// All entities of one (space, type) pair, with id assignment and
/// secondary orderings.
pub struct ObjectIndex {
    object_type: ObjectType,
    next_instance: u64,
    objects: BTreeMap<ObjectId, ObjectData>,
    orderings: Vec<OrderingSpec>,
    entries: Vec<BTreeMap<Vec<u8>, BTreeSet<ObjectId>>>,
}

impl ObjectIndex {
    /// Creates an empty index with the given orderings.
    #[must_use]
    pub fn new(object_type: ObjectType, orderings: Vec<OrderingSpec>) -> Self {
        let entries = orderings.iter().map(|_| BTreeMap::new()).collect();
        Self {
            object_type,
            next_instance: 0,
            objects: BTreeMap::new(),
            orderings,
            entries,
        }
    }

    /// The (space, type) pair this index holds.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// The id the next creation will receive, without assigning it.
    pub fn next_id(&self) -> LedgerResult<ObjectId> {
        ObjectId::new(self.object_type, self.next_instance)
            .ok_or_else(|| LedgerError::id_space_exhausted(self.object_type))
    }

    /// The instance counter's current value.
    #[must_use]
    pub fn next_instance(&self) -> u64 {
        self.next_instance
    }

    pub(crate) fn set_next_instance(&mut self, next_instance: u64) {
        self.next_instance = next_instance;
    }

    /// Creates a new entity. `build` receives the assigned id and must
    /// return an entity carrying that id with this index's type.
    pub fn create<F>(&mut self, build: F) -> LedgerResult<ObjectId>
    where
        F: FnOnce(ObjectId) -> ObjectData,
    {
        let id = self.next_id()?;
        let object = build(id);
        if object.id() != id {
            return Err(LedgerError::corruption(format!(
                "created object carries id {}, expected {id}",
                object.id()
            )));
        }
        if object.object_type() != self.object_type {
            return Err(LedgerError::TypeMismatch { id });
        }
        self.check_unique(&object, None)?;

        self.insert_entries(&object);
        self.objects.insert(id, object);
        self.next_instance += 1;
        Ok(id)
    }

    /// Applies `mutate` to a copy of the entity, then commits the copy if
    /// it still satisfies every constraint. The id must not change.
    pub fn modify<F>(&mut self, id: ObjectId, mutate: F) -> LedgerResult<()>
    where
        F: FnOnce(&mut ObjectData),
    {
        let old = self
            .objects
            .get(&id)
            .ok_or(LedgerError::ObjectMissing { id })?;
        let mut updated = old.clone();
        mutate(&mut updated);
        if updated.id() != id {
            return Err(LedgerError::corruption(format!(
                "modification changed id {id} to {}",
                updated.id()
            )));
        }
        self.check_unique(&updated, Some(id))?;

        let old = self
            .objects
            .remove(&id)
            .ok_or(LedgerError::ObjectMissing { id })?;
        self.remove_entries(&old);
        self.insert_entries(&updated);
        self.objects.insert(id, updated);
        Ok(())
    }

    /// Removes an entity, returning it.
    pub fn remove(&mut self, id: ObjectId) -> LedgerResult<ObjectData> {
        let object = self
            .objects
            .remove(&id)
            .ok_or(LedgerError::ObjectMissing { id })?;
        self.remove_entries(&object);
        Ok(object)
    }

    /// Looks up an entity by id.
    #[must_use]
    pub fn find(&self, id: ObjectId) -> Option<&ObjectData> {
        self.objects.get(&id)
    }

    /// Looks up an entity by id, failing when absent.
    pub fn get(&self, id: ObjectId) -> LedgerResult<&ObjectData> {
        self.find(id).ok_or(LedgerError::ObjectMissing { id })
    }

    /// Iterates all entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ObjectData> {
        self.objects.values()
    }

    /// Number of entities held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the index holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Looks up the single entity with the given key in a unique
    /// ordering.
    #[must_use]
    pub fn by_unique_key(&self, ordering: &str, key: &[u8]) -> Option<&ObjectData> {
        let pos = self.ordering_position(ordering)?;
        let ids = self.entries[pos].get(key)?;
        let id = ids.iter().next()?;
        self.objects.get(id)
    }

    /// Looks up every entity with the given key in an ordering, in id
    /// order.
    #[must_use]
    pub fn by_key(&self, ordering: &str, key: &[u8]) -> Vec<&ObjectData> {
        let Some(pos) = self.ordering_position(ordering) else {
            return Vec::new();
        };
        let Some(ids) = self.entries[pos].get(key) else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| self.objects.get(id)).collect()
    }

    /// Content digest of the whole index.
    ///
    /// The per-object hashes are combined with a wrapping byte-sum, so
    /// the digest does not depend on iteration order. The id counter is
    /// folded in as a synthetic record: two indexes that hold the same
    /// objects but would assign different next ids must not compare
    /// equal.
    pub fn digest(&self) -> LedgerResult<[u8; 32]> {
        let mut sum = [0u8; 32];
        for object in self.objects.values() {
            add_hash(&mut sum, &object.content_hash()?);
        }
        let mut hasher = Sha256::new();
        hasher.update(b"ledgerdb.next");
        hasher.update([self.object_type.space, self.object_type.ty]);
        hasher.update(self.next_instance.to_be_bytes());
        add_hash(&mut sum, &hasher.finalize().into());
        Ok(sum)
    }

    /// Reinserts an entity without touching the id counter. Undo
    /// restoration path: constraints were satisfied when the snapshot was
    /// taken, so they are not rechecked.
    pub(crate) fn put(&mut self, object: ObjectData) {
        let id = object.id();
        if let Some(old) = self.objects.remove(&id) {
            self.remove_entries(&old);
        }
        self.insert_entries(&object);
        self.objects.insert(id, object);
    }

    /// Removes an entity without treating absence as an error. Undo
    /// restoration path.
    pub(crate) fn take(&mut self, id: ObjectId) -> Option<ObjectData> {
        let object = self.objects.remove(&id)?;
        self.remove_entries(&object);
        Some(object)
    }

    fn ordering_position(&self, name: &str) -> Option<usize> {
        self.orderings.iter().position(|o| o.name == name)
    }

    fn check_unique(&self, object: &ObjectData, exclude: Option<ObjectId>) -> LedgerResult<()> {
        for (ordering, entries) in self.orderings.iter().zip(&self.entries) {
            if !ordering.unique {
                continue;
            }
            let Some(key) = (ordering.extract)(object) else {
                continue;
            };
            if let Some(ids) = entries.get(&key) {
                let occupied = ids.iter().any(|id| Some(*id) != exclude);
                if occupied {
                    return Err(LedgerError::UniqueConstraint {
                        ordering: ordering.name,
                    });
                }
            }
        }
        Ok(())
    }

    fn insert_entries(&mut self, object: &ObjectData) {
        let id = object.id();
        for (ordering, entries) in self.orderings.iter().zip(self.entries.iter_mut()) {
            if let Some(key) = (ordering.extract)(object) {
                entries.entry(key).or_default().insert(id);
            }
        }
    }

    fn remove_entries(&mut self, object: &ObjectData) {
        let id = object.id();
        for (ordering, entries) in self.orderings.iter().zip(self.entries.iter_mut()) {
            if let Some(key) = (ordering.extract)(object) {
                if let Some(ids) = entries.get_mut(&key) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        entries.remove(&key);
                    }
                }
            }
        }
    }
}

/// Byte-wise wrapping addition, used to fold per-object hashes into an
/// order-independent digest.
fn add_hash(sum: &mut [u8; 32], hash: &[u8; 32]) {
    for (s, h) in sum.iter_mut().zip(hash) {
        *s = s.wrapping_add(*h);
    }
}

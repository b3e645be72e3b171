//! Session-based undo over the object database.
//!
//! Every mutating path runs inside an [`UndoSession`]. While a session is
//! open, the first touch of each entity records what is needed to reverse
//! it: the pre-modification value, the id of a fresh creation, the full
//! value of a removal, and each index's pre-session id counter. Dropping
//! a session without resolving it rolls everything back; committing keeps
//! the state on the stack so an enclosing reorganization can still revert
//! it; merging folds it into the session below.
//!
//! The stack is strictly LIFO and bounded: when it outgrows the
//! configured depth the oldest state is discarded silently, which only
//! limits how far back the chain can reorganize.

use crate::database::ObjectDatabase;
use crate::error::{LedgerError, LedgerResult};
use crate::object::{ObjectData, ObjectId, ObjectType};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ops;
use tracing::{error, trace};

/// Everything needed to reverse one session's mutations.
#[derive(Debug, Default)]
pub struct UndoState {
    /// Monotonic tag identifying the session that produced this state.
    pub revision: u64,
    /// Pre-modification values of entities changed in this session.
    pub old_values: BTreeMap<ObjectId, ObjectData>,
    /// Pre-session id counters of every index that assigned an id.
    pub old_index_next_ids: BTreeMap<ObjectType, u64>,
    /// Ids of entities created in this session.
    pub new_ids: BTreeSet<ObjectId>,
    /// Full values of entities removed in this session.
    pub removed: BTreeMap<ObjectId, ObjectData>,
}

impl UndoState {
    fn new(revision: u64) -> Self {
        Self {
            revision,
            ..Self::default()
        }
    }
}

/// An object database wrapped with an undo stack.
///
/// Reads pass straight through (the wrapper derefs to
/// [`ObjectDatabase`]); writes go through [`UndoDatabase::create`],
/// [`UndoDatabase::modify`] and [`UndoDatabase::remove`], which record
/// undo information when a session is open.
pub struct UndoDatabase {
    db: ObjectDatabase,
    stack: VecDeque<UndoState>,
    next_revision: u64,
    max_depth: usize,
    enabled: bool,
}

impl UndoDatabase {
    /// Wraps a database, taking the stack bound from its configuration.
    #[must_use]
    pub fn new(db: ObjectDatabase) -> Self {
        let max_depth = db.config().max_undo_depth.max(1);
        Self {
            db,
            stack: VecDeque::new(),
            next_revision: 1,
            max_depth,
            enabled: true,
        }
    }

    /// The wrapped database.
    #[must_use]
    pub fn db(&self) -> &ObjectDatabase {
        &self.db
    }

    /// Consumes the wrapper, returning the database.
    #[must_use]
    pub fn into_inner(self) -> ObjectDatabase {
        self.db
    }

    /// Turns undo tracking back on.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Turns undo tracking off. Used during state initialization, when
    /// there is nothing meaningful to roll back to.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Whether mutations are currently being recorded.
    #[must_use]
    pub fn tracking(&self) -> bool {
        self.enabled && !self.stack.is_empty()
    }

    /// Number of states on the undo stack.
    #[must_use]
    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    /// The current stack bound.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_depth
    }

    /// Adjusts the stack bound at runtime. Shrinking it discards the
    /// oldest retained states, exactly as if they had been pop-committed.
    pub fn set_max_size(&mut self, max_depth: usize) {
        self.max_depth = max_depth.max(1);
        while self.stack.len() > self.max_depth {
            self.stack.pop_front();
        }
    }

    /// Opens a new session. With tracking disabled the returned session
    /// is inert: its resolution methods do nothing.
    pub fn start_undo_session(&mut self) -> UndoSession<'_> {
        if !self.enabled {
            return UndoSession {
                db: self,
                revision: 0,
                apply_undo: false,
            };
        }
        let revision = self.next_revision;
        self.next_revision += 1;
        self.stack.push_back(UndoState::new(revision));
        while self.stack.len() > self.max_depth {
            // Oldest states fall off silently; this only bounds how far
            // back a reorganization can reach.
            self.stack.pop_front();
        }
        trace!(revision, depth = self.stack.len(), "opened undo session");
        UndoSession {
            db: self,
            revision,
            apply_undo: true,
        }
    }

    /// Creates an entity, recording enough to reverse the creation.
    pub fn create<F>(&mut self, object_type: ObjectType, build: F) -> LedgerResult<ObjectId>
    where
        F: FnOnce(ObjectId) -> ObjectData,
    {
        if !self.tracking() {
            return self.db.create(object_type, build);
        }
        let next_instance = self.db.index(object_type)?.next_instance();
        let id = self.db.create(object_type, build)?;
        let state = self.top_mut()?;
        state
            .old_index_next_ids
            .entry(object_type)
            .or_insert(next_instance);
        state.new_ids.insert(id);
        Ok(id)
    }

    /// Modifies an entity, snapshotting its prior value on first touch.
    pub fn modify<F>(&mut self, id: ObjectId, mutate: F) -> LedgerResult<()>
    where
        F: FnOnce(&mut ObjectData),
    {
        if !self.tracking() {
            return self.db.modify(id, mutate);
        }
        let needs_snapshot = {
            let state = self.top()?;
            !state.new_ids.contains(&id) && !state.old_values.contains_key(&id)
        };
        if needs_snapshot {
            let old = self.db.get(id)?.clone();
            self.top_mut()?.old_values.insert(id, old);
        }
        self.db.modify(id, mutate)
    }

    /// Removes an entity, recording its value for restoration.
    pub fn remove(&mut self, id: ObjectId) -> LedgerResult<ObjectData> {
        if !self.tracking() {
            return self.db.remove(id);
        }
        let removed = self.db.remove(id)?;
        let state = self.top_mut()?;
        if state.new_ids.remove(&id) {
            // Created and removed in the same session: nothing to restore.
            return Ok(removed);
        }
        if let Some(snapshot) = state.old_values.remove(&id) {
            // The pre-session value is what an undo must bring back.
            state.removed.insert(id, snapshot);
        } else {
            state.removed.insert(id, removed.clone());
        }
        Ok(removed)
    }

    /// Reverts the most recent undo state.
    pub fn undo(&mut self) -> LedgerResult<()> {
        let state = self.stack.pop_back().ok_or(LedgerError::UndoStackUnderflow)?;
        trace!(revision = state.revision, "reverting undo state");
        Self::revert(&mut self.db, state)
    }

    /// Flushes the wrapped database's snapshot. The snapshot reflects
    /// currently applied state, including mutations still on the stack.
    pub fn flush(&mut self) -> LedgerResult<()> {
        self.db.flush()
    }

    /// Discards the oldest undo state, making its mutations permanent.
    pub fn pop_commit(&mut self) -> LedgerResult<()> {
        self.stack
            .pop_front()
            .map(|_| ())
            .ok_or(LedgerError::UndoStackUnderflow)
    }

    fn revert(db: &mut ObjectDatabase, state: UndoState) -> LedgerResult<()> {
        for id in &state.new_ids {
            if db.index_mut(id.object_type())?.take(*id).is_none() {
                return Err(LedgerError::corruption(format!(
                    "undo expected created object {id} to exist"
                )));
            }
        }
        for (_, object) in state.old_values {
            db.index_mut(object.object_type())?.put(object);
        }
        for (_, object) in state.removed {
            db.index_mut(object.object_type())?.put(object);
        }
        for (object_type, next_instance) in state.old_index_next_ids {
            db.index_mut(object_type)?.set_next_instance(next_instance);
        }
        Ok(())
    }

    fn merge_top(&mut self) -> LedgerResult<()> {
        if self.stack.len() < 2 {
            return Err(LedgerError::UndoStackUnderflow);
        }
        let newer = self
            .stack
            .pop_back()
            .ok_or(LedgerError::UndoStackUnderflow)?;
        let older = self
            .stack
            .back_mut()
            .ok_or(LedgerError::UndoStackUnderflow)?;

        for (id, old) in newer.old_values {
            // The older session already knows the pre-image of anything
            // it created or touched itself.
            if older.new_ids.contains(&id) {
                continue;
            }
            older.old_values.entry(id).or_insert(old);
        }
        for (object_type, next_instance) in newer.old_index_next_ids {
            older
                .old_index_next_ids
                .entry(object_type)
                .or_insert(next_instance);
        }
        for id in newer.new_ids {
            older.new_ids.insert(id);
        }
        for (id, object) in newer.removed {
            if older.new_ids.remove(&id) {
                // Created in the older session, removed in the newer one:
                // the pair cancels and leaves no trace.
                continue;
            }
            if let Some(snapshot) = older.old_values.remove(&id) {
                older.removed.insert(id, snapshot);
            } else {
                older.removed.entry(id).or_insert(object);
            }
        }
        Ok(())
    }

    fn top(&self) -> LedgerResult<&UndoState> {
        self.stack.back().ok_or(LedgerError::UndoStackUnderflow)
    }

    fn top_mut(&mut self) -> LedgerResult<&mut UndoState> {
        self.stack.back_mut().ok_or(LedgerError::UndoStackUnderflow)
    }
}

impl ops::Deref for UndoDatabase {
    type Target = ObjectDatabase;

    fn deref(&self) -> &ObjectDatabase {
        &self.db
    }
}

/// A handle over one open undo state.
///
/// Exactly one of [`UndoSession::commit`], [`UndoSession::merge`] or
/// [`UndoSession::undo`] resolves the session; dropping an unresolved
/// session rolls it back. Sessions nest through the borrow checker: an
/// inner session borrows the database mutably, so the outer one cannot
/// be touched until the inner one resolves.
pub struct UndoSession<'a> {
    db: &'a mut UndoDatabase,
    revision: u64,
    apply_undo: bool,
}

impl UndoSession<'_> {
    /// The revision tag of this session's state, zero when inert.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Rolls this session's mutations back, together with any states an
    /// inner session committed on top of it. Idempotent.
    pub fn undo(&mut self) -> LedgerResult<()> {
        if !self.apply_undo {
            return Ok(());
        }
        self.apply_undo = false;
        // Stack nesting guarantees every state at or above this
        // session's revision descends from it, so they revert together.
        loop {
            let top_revision = self.db.top()?.revision;
            if top_revision < self.revision {
                return Err(LedgerError::corruption(format!(
                    "undo of session {} found older state {top_revision} on top",
                    self.revision
                )));
            }
            self.db.undo()?;
            if top_revision == self.revision {
                return Ok(());
            }
        }
    }

    /// Keeps the mutations and leaves the state on the stack, so an
    /// enclosing reorganization can still revert them.
    pub fn commit(&mut self) {
        self.apply_undo = false;
    }

    /// Folds this session's state into the one below it.
    pub fn merge(&mut self) -> LedgerResult<()> {
        if !self.apply_undo {
            return Ok(());
        }
        self.apply_undo = false;
        self.db.merge_top()
    }
}

impl ops::Deref for UndoSession<'_> {
    type Target = UndoDatabase;

    fn deref(&self) -> &UndoDatabase {
        self.db
    }
}

impl ops::DerefMut for UndoSession<'_> {
    fn deref_mut(&mut self) -> &mut UndoDatabase {
        self.db
    }
}

impl Drop for UndoSession<'_> {
    fn drop(&mut self) {
        if !self.apply_undo {
            return;
        }
        if let Err(err) = self.undo() {
            // Nothing sensible to do in drop; the database is suspect.
            error!(revision = self.revision, %err, "failed to roll back session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::object::{AccountBalance, CORE_ASSET_ID, SENTINEL_ACCOUNT_ID};
    use crate::value::Share;

    fn new_db() -> UndoDatabase {
        UndoDatabase::new(ObjectDatabase::open_in_memory(Config::default()).unwrap())
    }

    fn balance(id: ObjectId, asset_instance: u64, amount: u64) -> ObjectData {
        ObjectData::AccountBalance(AccountBalance {
            id,
            owner: SENTINEL_ACCOUNT_ID,
            asset: ObjectId::new(ObjectType::ASSET, asset_instance).unwrap(),
            balance: Share(amount),
        })
    }

    fn create_balance(db: &mut UndoDatabase, asset_instance: u64, amount: u64) -> ObjectId {
        db.create(ObjectType::ACCOUNT_BALANCE, |id| {
            balance(id, asset_instance, amount)
        })
        .unwrap()
    }

    #[test]
    fn dropped_session_rolls_back_everything() {
        let mut db = new_db();
        let kept = create_balance(&mut db, 0, 10);
        let digest = db.digest().unwrap();

        {
            let mut session = db.start_undo_session();
            let id = create_balance(&mut session, 1, 5);
            session
                .modify(kept, |obj| {
                    obj.as_account_balance_mut().unwrap().balance = Share(99);
                })
                .unwrap();
            session.remove(id).unwrap();
        }

        assert_eq!(db.digest().unwrap(), digest);
        assert_eq!(
            db.get(kept).unwrap().as_account_balance().unwrap().balance,
            Share(10)
        );
    }

    #[test]
    fn undone_creation_releases_its_id() {
        let mut db = new_db();
        let first = {
            let mut session = db.start_undo_session();
            let id = create_balance(&mut session, 0, 1);
            session.undo().unwrap();
            id
        };
        let second = {
            let mut session = db.start_undo_session();
            let id = create_balance(&mut session, 0, 1);
            session.commit();
            id
        };
        assert_eq!(first, second);
    }

    #[test]
    fn committed_session_keeps_mutations_and_stays_revertible() {
        let mut db = new_db();
        let digest_before = db.digest().unwrap();
        {
            let mut session = db.start_undo_session();
            create_balance(&mut session, 0, 7);
            session.commit();
        }
        assert_eq!(db.stack_size(), 1);
        assert!(db.account_balance_of(SENTINEL_ACCOUNT_ID, CORE_ASSET_ID).is_some());

        db.undo().unwrap();
        assert_eq!(db.digest().unwrap(), digest_before);
    }

    #[test]
    fn pop_commit_makes_the_oldest_state_permanent() {
        let mut db = new_db();
        {
            let mut session = db.start_undo_session();
            create_balance(&mut session, 0, 7);
            session.commit();
        }
        db.pop_commit().unwrap();
        assert_eq!(db.stack_size(), 0);
        assert!(matches!(db.undo(), Err(LedgerError::UndoStackUnderflow)));
        assert!(db.account_balance_of(SENTINEL_ACCOUNT_ID, CORE_ASSET_ID).is_some());
    }

    #[test]
    fn merged_sessions_undo_as_one() {
        let mut db = new_db();
        let kept = create_balance(&mut db, 0, 10);
        let digest = db.digest().unwrap();

        {
            let mut outer = db.start_undo_session();
            outer
                .modify(kept, |obj| {
                    obj.as_account_balance_mut().unwrap().balance = Share(20);
                })
                .unwrap();
            {
                let mut inner = outer.start_undo_session();
                inner
                    .modify(kept, |obj| {
                        obj.as_account_balance_mut().unwrap().balance = Share(30);
                    })
                    .unwrap();
                create_balance(&mut inner, 1, 5);
                inner.merge().unwrap();
            }
            // outer now owns both mutations; dropping it reverts both.
        }

        assert_eq!(db.digest().unwrap(), digest);
        assert_eq!(
            db.get(kept).unwrap().as_account_balance().unwrap().balance,
            Share(10)
        );
    }

    #[test]
    fn outer_undo_reverts_a_committed_inner_session() {
        let mut db = new_db();
        let kept = create_balance(&mut db, 0, 10);
        let digest = db.digest().unwrap();

        let mut outer = db.start_undo_session();
        outer
            .modify(kept, |obj| {
                obj.as_account_balance_mut().unwrap().balance = Share(20);
            })
            .unwrap();
        {
            let mut inner = outer.start_undo_session();
            create_balance(&mut inner, 1, 5);
            inner.commit();
        }
        // The inner state is still on the stack above the outer one;
        // undoing the outer session must revert both.
        outer.undo().unwrap();
        drop(outer);

        assert_eq!(db.stack_size(), 0);
        assert_eq!(db.digest().unwrap(), digest);
        assert_eq!(
            db.get(kept).unwrap().as_account_balance().unwrap().balance,
            Share(10)
        );
    }

    #[test]
    fn dropped_outer_session_rolls_back_committed_inner_states() {
        let mut db = new_db();
        let digest = db.digest().unwrap();
        {
            let mut outer = db.start_undo_session();
            create_balance(&mut outer, 0, 1);
            let mut inner = outer.start_undo_session();
            create_balance(&mut inner, 1, 2);
            inner.commit();
            // Neither session resolved the outer state; dropping it must
            // take the committed inner state down with it.
        }
        assert_eq!(db.stack_size(), 0);
        assert_eq!(db.digest().unwrap(), digest);
    }

    #[test]
    fn merge_preserves_the_oldest_snapshot() {
        let mut db = new_db();
        let id = create_balance(&mut db, 0, 10);

        let mut outer = db.start_undo_session();
        outer
            .modify(id, |obj| {
                obj.as_account_balance_mut().unwrap().balance = Share(20);
            })
            .unwrap();
        let mut inner = outer.start_undo_session();
        inner
            .modify(id, |obj| {
                obj.as_account_balance_mut().unwrap().balance = Share(30);
            })
            .unwrap();
        inner.merge().unwrap();
        drop(inner);
        outer.undo().unwrap();
        drop(outer);

        // The value from before the outer session, not the intermediate 20.
        assert_eq!(
            db.get(id).unwrap().as_account_balance().unwrap().balance,
            Share(10)
        );
    }

    #[test]
    fn create_then_remove_cancels_across_a_merge() {
        let mut db = new_db();
        let digest = db.digest().unwrap();

        let mut outer = db.start_undo_session();
        let id = create_balance(&mut outer, 0, 5);
        let mut inner = outer.start_undo_session();
        inner.remove(id).unwrap();
        inner.merge().unwrap();
        drop(inner);
        outer.undo().unwrap();
        drop(outer);

        // The cancelled pair must not resurrect the object, and the undo
        // must still restore the id counter.
        assert!(db.find(id).is_none());
        assert_eq!(db.digest().unwrap(), digest);
    }

    #[test]
    fn removal_restores_the_presession_value() {
        let mut db = new_db();
        let id = create_balance(&mut db, 0, 10);

        {
            let mut session = db.start_undo_session();
            session
                .modify(id, |obj| {
                    obj.as_account_balance_mut().unwrap().balance = Share(50);
                })
                .unwrap();
            session.remove(id).unwrap();
        }

        assert_eq!(
            db.get(id).unwrap().as_account_balance().unwrap().balance,
            Share(10)
        );
    }

    #[test]
    fn stack_depth_is_bounded() {
        let config = Config::default().max_undo_depth(2);
        let mut db = UndoDatabase::new(ObjectDatabase::open_in_memory(config).unwrap());
        for i in 0..5 {
            let mut session = db.start_undo_session();
            create_balance(&mut session, i, 1);
            session.commit();
        }
        assert_eq!(db.stack_size(), 2);
        // Only the two newest states can be reverted.
        db.undo().unwrap();
        db.undo().unwrap();
        assert!(matches!(db.undo(), Err(LedgerError::UndoStackUnderflow)));
    }

    #[test]
    fn shrinking_the_stack_bound_discards_oldest_states() {
        let mut db = new_db();
        for i in 0..4 {
            let mut session = db.start_undo_session();
            create_balance(&mut session, i, 1);
            session.commit();
        }
        assert_eq!(db.stack_size(), 4);

        db.set_max_size(2);
        assert_eq!(db.max_size(), 2);
        assert_eq!(db.stack_size(), 2);

        // Only the two newest states survive to be reverted.
        db.undo().unwrap();
        db.undo().unwrap();
        assert!(matches!(db.undo(), Err(LedgerError::UndoStackUnderflow)));
    }

    #[test]
    fn disabled_tracking_yields_inert_sessions() {
        let mut db = new_db();
        db.disable();
        {
            let mut session = db.start_undo_session();
            create_balance(&mut session, 0, 1);
            // Dropping without resolution must not roll back.
        }
        assert_eq!(db.stack_size(), 0);
        assert!(db.account_balance_of(SENTINEL_ACCOUNT_ID, CORE_ASSET_ID).is_some());
        db.enable();
    }

    #[test]
    fn undo_is_idempotent_on_the_session() {
        let mut db = new_db();
        let digest = db.digest().unwrap();
        let mut session = db.start_undo_session();
        create_balance(&mut session, 0, 1);
        session.undo().unwrap();
        session.undo().unwrap();
        drop(session);
        assert_eq!(db.digest().unwrap(), digest);
    }
}

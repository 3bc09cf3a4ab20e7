//! Local storage and operation log contracts, with in-memory implementations.

use crate::error::SyncResult;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tidesync_protocol::{
    Checkpoint, CheckpointKey, Entity, EntityData, EntityId, LogicalOplog, OperationKind,
    PendingOperation, Query, VersionToken,
};

/// The local persistent store holding the replica and pull checkpoints.
///
/// Each method is atomic from the caller's point of view. Reads return
/// fresh copies with `dirty = false`.
pub trait LocalStore<T: EntityData>: Send + Sync {
    /// Looks up one entity.
    fn get(&self, id: &EntityId) -> SyncResult<Option<Entity<T>>>;

    /// Returns the entities selected by `query`, in identity order.
    fn query(&self, query: &Query<T>) -> SyncResult<Vec<Entity<T>>>;

    /// Inserts or replaces an entity, keeping its dirty flag.
    fn upsert(&self, entity: Entity<T>) -> SyncResult<()>;

    /// Removes an entity. Returns false if it was absent.
    fn remove(&self, id: &EntityId) -> SyncResult<bool>;

    /// Applies one page of remote changes as a single batch.
    fn apply_remote(&self, rows: Vec<Entity<T>>, deleted: &[EntityId]) -> SyncResult<()>;

    /// Removes the entities selected by `query` and returns how many.
    fn purge(&self, query: &Query<T>) -> SyncResult<usize>;

    /// Returns the stored checkpoint for `key`.
    fn checkpoint(&self, key: &CheckpointKey) -> SyncResult<Option<Checkpoint>>;

    /// Stores the checkpoint for `key`.
    fn set_checkpoint(&self, key: &CheckpointKey, checkpoint: Checkpoint) -> SyncResult<()>;

    /// Clears checkpoints of `collection`; all of them when `query` is `None`.
    fn clear_checkpoints(&self, collection: &str, query: Option<&str>) -> SyncResult<usize>;
}

/// The durable queue of local mutations.
///
/// `pending_count` must be cheap; the coordinator calls it before every
/// push to skip needless round trips.
pub trait OperationLog<T: EntityData>: Send + Sync {
    /// Appends a mutation and returns its sequence number.
    fn append(&self, kind: OperationKind, entity: Entity<T>) -> SyncResult<u64>;

    /// Returns all pending operations in sequence order.
    fn pending(&self) -> SyncResult<Vec<PendingOperation<T>>>;

    /// Looks up one pending operation.
    fn get(&self, sequence: u64) -> SyncResult<Option<PendingOperation<T>>>;

    /// Removes an operation the remote store acknowledged.
    fn acknowledge(&self, sequence: u64) -> SyncResult<bool>;

    /// Rewrites a pending operation in place.
    fn replace(&self, sequence: u64, kind: OperationKind, entity: Entity<T>) -> SyncResult<bool>;

    /// Sets the base version of every pending operation for `id`.
    fn rebase(&self, id: &EntityId, version: &VersionToken) -> SyncResult<usize>;

    /// Removes and returns every pending operation matching `predicate`.
    fn discard_matching(
        &self,
        predicate: &dyn Fn(&PendingOperation<T>) -> bool,
    ) -> SyncResult<Vec<PendingOperation<T>>>;

    /// Returns true if any operation for `id` is pending.
    fn has_pending_for(&self, id: &EntityId) -> bool;

    /// Returns the number of pending operations.
    fn pending_count(&self) -> usize;
}

/// In-memory local store.
pub struct MemoryStore<T> {
    rows: RwLock<BTreeMap<EntityId, Entity<T>>>,
    checkpoints: RwLock<HashMap<CheckpointKey, Checkpoint>>,
}

impl<T: EntityData> MemoryStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            checkpoints: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Returns true if the stored copy of `id` carries unsynced changes.
    pub fn is_dirty(&self, id: &EntityId) -> bool {
        self.rows.read().get(id).map_or(false, |e| e.dirty)
    }
}

impl<T: EntityData> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: EntityData> LocalStore<T> for MemoryStore<T> {
    fn get(&self, id: &EntityId) -> SyncResult<Option<Entity<T>>> {
        Ok(self.rows.read().get(id).cloned().map(Entity::into_clean))
    }

    fn query(&self, query: &Query<T>) -> SyncResult<Vec<Entity<T>>> {
        let rows = self.rows.read();
        Ok(query
            .select(rows.values())
            .into_iter()
            .cloned()
            .map(Entity::into_clean)
            .collect())
    }

    fn upsert(&self, entity: Entity<T>) -> SyncResult<()> {
        self.rows.write().insert(entity.id.clone(), entity);
        Ok(())
    }

    fn remove(&self, id: &EntityId) -> SyncResult<bool> {
        Ok(self.rows.write().remove(id).is_some())
    }

    fn apply_remote(&self, rows: Vec<Entity<T>>, deleted: &[EntityId]) -> SyncResult<()> {
        let mut stored = self.rows.write();
        for row in rows {
            stored.insert(row.id.clone(), row.into_clean());
        }
        for id in deleted {
            stored.remove(id);
        }
        Ok(())
    }

    fn purge(&self, query: &Query<T>) -> SyncResult<usize> {
        let mut rows = self.rows.write();
        let doomed: Vec<EntityId> = query
            .select(rows.values())
            .into_iter()
            .map(|e| e.id.clone())
            .collect();
        for id in &doomed {
            rows.remove(id);
        }
        Ok(doomed.len())
    }

    fn checkpoint(&self, key: &CheckpointKey) -> SyncResult<Option<Checkpoint>> {
        Ok(self.checkpoints.read().get(key).cloned())
    }

    fn set_checkpoint(&self, key: &CheckpointKey, checkpoint: Checkpoint) -> SyncResult<()> {
        self.checkpoints.write().insert(key.clone(), checkpoint);
        Ok(())
    }

    fn clear_checkpoints(&self, collection: &str, query: Option<&str>) -> SyncResult<usize> {
        let mut checkpoints = self.checkpoints.write();
        let before = checkpoints.len();
        checkpoints.retain(|key, _| {
            key.collection != collection || query.map_or(false, |q| key.query != q)
        });
        Ok(before - checkpoints.len())
    }
}

/// In-memory operation log backed by a [`LogicalOplog`].
pub struct MemoryOperationLog<T> {
    oplog: RwLock<LogicalOplog<T>>,
}

impl<T: EntityData> MemoryOperationLog<T> {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self {
            oplog: RwLock::new(LogicalOplog::new()),
        }
    }
}

impl<T: EntityData> Default for MemoryOperationLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: EntityData> OperationLog<T> for MemoryOperationLog<T> {
    fn append(&self, kind: OperationKind, entity: Entity<T>) -> SyncResult<u64> {
        Ok(self.oplog.write().append(kind, entity))
    }

    fn pending(&self) -> SyncResult<Vec<PendingOperation<T>>> {
        Ok(self.oplog.read().pending().cloned().collect())
    }

    fn get(&self, sequence: u64) -> SyncResult<Option<PendingOperation<T>>> {
        Ok(self.oplog.read().get(sequence).cloned())
    }

    fn acknowledge(&self, sequence: u64) -> SyncResult<bool> {
        Ok(self.oplog.write().acknowledge(sequence))
    }

    fn replace(&self, sequence: u64, kind: OperationKind, entity: Entity<T>) -> SyncResult<bool> {
        Ok(self.oplog.write().replace(sequence, kind, entity))
    }

    fn rebase(&self, id: &EntityId, version: &VersionToken) -> SyncResult<usize> {
        Ok(self.oplog.write().rebase(id, version))
    }

    fn discard_matching(
        &self,
        predicate: &dyn Fn(&PendingOperation<T>) -> bool,
    ) -> SyncResult<Vec<PendingOperation<T>>> {
        Ok(self.oplog.write().discard_where(|op| predicate(op)))
    }

    fn has_pending_for(&self, id: &EntityId) -> bool {
        self.oplog.read().has_pending_for(id)
    }

    fn pending_count(&self) -> usize {
        self.oplog.read().pending_count()
    }
}

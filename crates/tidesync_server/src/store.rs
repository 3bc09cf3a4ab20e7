//! The authoritative row store.

use crate::error::{ServerError, ServerResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use tidesync_protocol::{
    ChangeSet, Checkpoint, Entity, EntityData, EntityId, OperationKind, PendingOperation,
    SubmitOutcome, VersionToken,
};
use tracing::debug;

/// Validation hook for incoming rows. `Err` carries the rejection reason.
pub type RowValidator<T> = Box<dyn Fn(&Entity<T>) -> Result<(), String> + Send + Sync>;

struct StoredRow<T> {
    entity: Entity<T>,
    version: VersionToken,
    change: u64,
    deleted: bool,
}

impl<T: Clone> StoredRow<T> {
    fn snapshot(&self) -> Option<Entity<T>> {
        if self.deleted {
            None
        } else {
            Some(self.entity.clone())
        }
    }
}

struct State<T> {
    rows: HashMap<EntityId, StoredRow<T>>,
    last_change: u64,
}

impl<T: EntityData> State<T> {
    fn next_change(&mut self) -> u64 {
        self.last_change += 1;
        self.last_change
    }

    /// Stores a live row under a fresh change number.
    fn upsert(&mut self, id: &EntityId, data: T) -> Entity<T> {
        let change = self.next_change();
        let version = VersionToken::new(change.to_string());
        let entity = Entity::confirmed(id.clone(), version.clone(), data);
        self.rows.insert(
            id.clone(),
            StoredRow {
                entity: entity.clone(),
                version,
                change,
                deleted: false,
            },
        );
        entity
    }

    fn tombstone(&mut self, id: &EntityId) {
        let change = self.next_change();
        if let Some(row) = self.rows.get_mut(id) {
            row.version = VersionToken::new(change.to_string());
            row.entity.version = Some(row.version.clone());
            row.change = change;
            row.deleted = true;
        }
    }
}

/// An in-memory remote store with optimistic concurrency.
///
/// Each write stamps a fresh change number, which doubles as the row's
/// version token and as the pull cursor. Deleted rows are kept as
/// tombstones so incremental pulls can report them.
pub struct RemoteStore<T> {
    state: RwLock<State<T>>,
    validator: Option<RowValidator<T>>,
}

impl<T: EntityData> RemoteStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                rows: HashMap::new(),
                last_change: 0,
            }),
            validator: None,
        }
    }

    /// Rejects inserts and updates the validator refuses.
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Entity<T>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Applies one client operation.
    ///
    /// - insert of a live row conflicts; insert over a tombstone revives it
    /// - update and delete conflict when the base version is stale
    /// - update of an unknown row is rejected
    /// - delete of an unknown or already deleted row is accepted
    pub fn apply(&self, op: &PendingOperation<T>) -> SubmitOutcome<T> {
        if op.kind != OperationKind::Delete {
            if let Some(validator) = &self.validator {
                if let Err(reason) = validator(&op.entity) {
                    return SubmitOutcome::Rejected { reason };
                }
            }
        }

        let mut state = self.state.write();
        let id = op.entity_id();
        let current = state
            .rows
            .get(id)
            .map(|row| (row.version.clone(), row.deleted, row.snapshot()));

        let outcome = match (op.kind, current) {
            (OperationKind::Insert, Some((version, false, server))) => {
                SubmitOutcome::Conflict { server, version }
            }
            (OperationKind::Insert, _) => {
                SubmitOutcome::Accepted(Some(state.upsert(id, op.entity.data.clone())))
            }
            (OperationKind::Update, None) => SubmitOutcome::Rejected {
                reason: format!("entity {id} does not exist"),
            },
            (OperationKind::Delete, None) | (OperationKind::Delete, Some((_, true, _))) => {
                SubmitOutcome::Accepted(None)
            }
            (OperationKind::Update | OperationKind::Delete, Some((version, _, server)))
                if op.base_version() != Some(&version) =>
            {
                SubmitOutcome::Conflict { server, version }
            }
            (OperationKind::Update, Some(_)) => {
                SubmitOutcome::Accepted(Some(state.upsert(id, op.entity.data.clone())))
            }
            (OperationKind::Delete, Some(_)) => {
                state.tombstone(id);
                SubmitOutcome::Accepted(None)
            }
        };

        debug!(
            collection = T::COLLECTION,
            entity = %id,
            kind = op.kind.as_str(),
            accepted = outcome.is_accepted(),
            "operation applied"
        );
        outcome
    }

    /// Returns up to `limit` changes after `checkpoint`, oldest first.
    pub fn changes_since(
        &self,
        checkpoint: Option<&Checkpoint>,
        limit: usize,
    ) -> ServerResult<ChangeSet<T>> {
        let after = match checkpoint {
            None => 0,
            Some(cp) => cp.as_str().parse::<u64>().map_err(|_| {
                ServerError::InvalidRequest(format!("unknown checkpoint {cp}"))
            })?,
        };

        let state = self.state.read();
        let mut changed: Vec<&StoredRow<T>> =
            state.rows.values().filter(|row| row.change > after).collect();
        changed.sort_by_key(|row| row.change);

        let has_more = changed.len() > limit;
        changed.truncate(limit);

        let next = changed.last().map_or(after, |row| row.change);
        let mut rows = Vec::new();
        let mut deleted = Vec::new();
        for row in changed {
            match row.snapshot() {
                Some(entity) => rows.push(entity),
                None => deleted.push(row.entity.id.clone()),
            }
        }

        Ok(ChangeSet::new(rows, Checkpoint::new(next.to_string()))
            .with_deleted(deleted)
            .with_more(has_more))
    }

    /// Writes a row directly, as another client would. Returns the stored copy.
    pub fn put(&self, id: impl Into<EntityId>, data: T) -> Entity<T> {
        self.state.write().upsert(&id.into(), data)
    }

    /// Deletes a row directly. Returns false if it was not live.
    pub fn delete(&self, id: &EntityId) -> bool {
        let mut state = self.state.write();
        let live = state.rows.get(id).is_some_and(|row| !row.deleted);
        if live {
            state.tombstone(id);
        }
        live
    }

    /// Returns the live copy of a row.
    pub fn get(&self, id: &EntityId) -> Option<Entity<T>> {
        self.state.read().rows.get(id).and_then(StoredRow::snapshot)
    }

    /// Returns the number of live rows.
    pub fn len(&self) -> usize {
        self.state.read().rows.values().filter(|row| !row.deleted).count()
    }

    /// Returns true if no live rows exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the latest change number.
    pub fn last_change(&self) -> u64 {
        self.state.read().last_change
    }
}

impl<T: EntityData> Default for RemoteStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

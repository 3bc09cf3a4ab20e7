//! In-memory logical operation log.

use crate::entity::{Entity, EntityId, VersionToken};
use crate::operation::{OperationKind, PendingOperation};
use std::collections::VecDeque;

/// A logical log of local mutations awaiting transmission.
///
/// # Invariants
///
/// - Entries are kept in append order, which is sequence order
/// - Sequence numbers are never reused
/// - An entry is removed only by acknowledgement or an explicit discard
pub struct LogicalOplog<T> {
    entries: VecDeque<PendingOperation<T>>,
    next_sequence: u64,
}

impl<T: Clone> LogicalOplog<T> {
    /// Creates a new empty log.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_sequence: 1,
        }
    }

    /// Appends a mutation and returns its assigned sequence number.
    pub fn append(&mut self, kind: OperationKind, entity: Entity<T>) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries
            .push_back(PendingOperation::new(sequence, kind, entity));
        sequence
    }

    /// Returns pending operations in sequence order.
    pub fn pending(&self) -> impl Iterator<Item = &PendingOperation<T>> {
        self.entries.iter()
    }

    /// Looks up a pending operation by sequence number.
    pub fn get(&self, sequence: u64) -> Option<&PendingOperation<T>> {
        self.position(sequence).map(|i| &self.entries[i])
    }

    /// Removes an acknowledged operation. Returns false if it was not queued.
    pub fn acknowledge(&mut self, sequence: u64) -> bool {
        match self.position(sequence) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Rewrites a queued operation in place, keeping its queue position.
    pub fn replace(&mut self, sequence: u64, kind: OperationKind, entity: Entity<T>) -> bool {
        match self.position(sequence) {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.kind = kind;
                entry.entity = entity;
                true
            }
            None => false,
        }
    }

    /// Sets the base version of every queued operation for `id`.
    ///
    /// Returns the number of operations touched.
    pub fn rebase(&mut self, id: &EntityId, version: &VersionToken) -> usize {
        let mut touched = 0;
        for entry in self.entries.iter_mut().filter(|e| &e.entity.id == id) {
            entry.entity.version = Some(version.clone());
            touched += 1;
        }
        touched
    }

    /// Returns true if any operation for `id` is queued.
    pub fn has_pending_for(&self, id: &EntityId) -> bool {
        self.entries.iter().any(|e| &e.entity.id == id)
    }

    /// Removes and returns every operation matching `predicate`.
    pub fn discard_where<F>(&mut self, mut predicate: F) -> Vec<PendingOperation<T>>
    where
        F: FnMut(&PendingOperation<T>) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if predicate(&entry) {
                removed.push(entry);
            } else {
                kept.push_back(entry);
            }
        }
        self.entries = kept;
        removed
    }

    /// Returns the number of pending operations.
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, sequence: u64) -> Option<usize> {
        // entries are sorted by sequence
        self.entries
            .binary_search_by_key(&sequence, |e| e.sequence)
            .ok()
    }
}

impl<T: Clone> Default for LogicalOplog<T> {
    fn default() -> Self {
        Self::new()
    }
}

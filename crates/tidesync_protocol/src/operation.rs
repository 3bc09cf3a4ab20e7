//! Pending local mutations.

use crate::entity::{Entity, EntityId, VersionToken};
use serde::{Deserialize, Serialize};

/// Kind of local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Entity was created locally.
    Insert,
    /// Entity was modified locally.
    Update,
    /// Entity was deleted locally.
    Delete,
}

impl OperationKind {
    /// Returns the lowercase name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

/// A queued local mutation awaiting transmission.
///
/// # Fields
///
/// - `sequence`: queue position, assigned by the log on append
/// - `kind`: insert, update or delete
/// - `entity`: snapshot of the entity at the time of the mutation; its
///   version token is the base version the remote store checks against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation<T> {
    /// Queue sequence number.
    pub sequence: u64,
    /// Operation kind.
    pub kind: OperationKind,
    /// Target entity snapshot.
    pub entity: Entity<T>,
}

impl<T> PendingOperation<T> {
    /// Creates an operation. The sequence is normally reassigned by the log.
    pub fn new(sequence: u64, kind: OperationKind, entity: Entity<T>) -> Self {
        Self {
            sequence,
            kind,
            entity,
        }
    }

    /// Returns the identity of the target entity.
    pub fn entity_id(&self) -> &EntityId {
        &self.entity.id
    }

    /// Returns the version token the client last saw for this entity.
    pub fn base_version(&self) -> Option<&VersionToken> {
        self.entity.version.as_ref()
    }
}

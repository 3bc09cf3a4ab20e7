//! Submission outcomes and incremental pull payloads.

use crate::conflict::ConflictRecord;
use crate::entity::{Entity, EntityId, VersionToken};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The remote store's answer to one submitted operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubmitOutcome<T> {
    /// Accepted. Carries the stored row with its new version (`None` for deletes).
    Accepted(Option<Entity<T>>),
    /// Rejected because the base version is stale.
    Conflict {
        /// Current server copy, `None` if deleted on the server.
        server: Option<Entity<T>>,
        /// Current server version token.
        version: VersionToken,
    },
    /// Rejected permanently (validation, authorization, missing row).
    Rejected {
        /// Reason reported by the remote store.
        reason: String,
    },
}

impl<T> SubmitOutcome<T> {
    /// Returns true for `Accepted`.
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted(_))
    }
}

/// Opaque cursor marking pull progress for one collection and query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(String);

impl Checkpoint {
    /// Wraps a cursor issued by the remote store.
    pub fn new(cursor: impl Into<String>) -> Self {
        Self(cursor.into())
    }

    /// Returns the cursor as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one checkpoint: a (collection, query signature) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckpointKey {
    /// Collection name.
    pub collection: String,
    /// Query signature.
    pub query: String,
}

impl CheckpointKey {
    /// Creates a checkpoint key.
    pub fn new(collection: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            query: query.into(),
        }
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.query)
    }
}

/// One page of remote changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet<T> {
    /// Rows changed since the checkpoint.
    pub rows: Vec<Entity<T>>,
    /// Rows deleted since the checkpoint.
    pub deleted: Vec<EntityId>,
    /// Cursor to persist once this page is applied.
    pub checkpoint: Checkpoint,
    /// Whether another page follows.
    pub has_more: bool,
    /// Rejected operations the backend reported alongside the rows.
    #[serde(default)]
    pub push_conflicts: Vec<ConflictRecord<T>>,
}

impl<T> ChangeSet<T> {
    /// Creates a final page with the given rows.
    pub fn new(rows: Vec<Entity<T>>, checkpoint: Checkpoint) -> Self {
        Self {
            rows,
            deleted: Vec::new(),
            checkpoint,
            has_more: false,
            push_conflicts: Vec::new(),
        }
    }

    /// Creates an empty final page.
    pub fn empty(checkpoint: Checkpoint) -> Self {
        Self::new(Vec::new(), checkpoint)
    }

    /// Sets the deleted ids.
    pub fn with_deleted(mut self, deleted: Vec<EntityId>) -> Self {
        self.deleted = deleted;
        self
    }

    /// Marks that another page follows.
    pub fn with_more(mut self, has_more: bool) -> Self {
        self.has_more = has_more;
        self
    }

    /// Attaches backend-reported conflicts.
    pub fn with_conflicts(mut self, conflicts: Vec<ConflictRecord<T>>) -> Self {
        self.push_conflicts = conflicts;
        self
    }

    /// Returns the number of changed and deleted rows.
    pub fn len(&self) -> usize {
        self.rows.len() + self.deleted.len()
    }

    /// Returns true if the page carries no row changes.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.deleted.is_empty()
    }
}

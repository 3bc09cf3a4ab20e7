//! Version conflicts and resolution policies.

use crate::entity::{Entity, VersionToken};
use crate::operation::OperationKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A pending operation rejected because its base version is stale.
///
/// Created while a push fails and consumed immediately by a
/// [`ConflictResolver`]. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord<T> {
    /// Sequence number of the rejected operation.
    pub sequence: u64,
    /// Kind of the rejected operation.
    pub kind: OperationKind,
    /// Local snapshot carried by the operation.
    pub local: Entity<T>,
    /// Server copy, or `None` if the row is deleted on the server.
    pub server: Option<Entity<T>>,
    /// The server's current version token.
    pub server_version: VersionToken,
}

impl<T> ConflictRecord<T> {
    /// Creates a conflict record.
    pub fn new(
        sequence: u64,
        kind: OperationKind,
        local: Entity<T>,
        server: Option<Entity<T>>,
        server_version: VersionToken,
    ) -> Self {
        Self {
            sequence,
            kind,
            local,
            server,
            server_version,
        }
    }

    /// Returns true if the server deleted the row.
    pub fn is_remote_delete(&self) -> bool {
        self.server.is_none()
    }
}

/// What to do about a conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionAction<T> {
    /// Rewrite the queued operation and send it once more.
    Resubmit {
        /// Kind to resubmit as.
        kind: OperationKind,
        /// Entity to send, carrying the server's version as its base.
        entity: Entity<T>,
    },
    /// Drop the local operation and adopt the server snapshot.
    AcceptServer,
    /// Leave the operation queued and report the conflict as unresolved.
    Skip,
}

/// Decides how a conflict is resolved.
///
/// Implementations must be pure: the coordinator carries out the
/// returned action and guarantees at most one resubmission.
pub trait ConflictResolver<T>: Send + Sync {
    /// Chooses the resolution for one conflict.
    fn resolve(&self, conflict: &ConflictRecord<T>) -> ResolutionAction<T>;
}

/// Built-in resolution policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// The local snapshot is resent on top of the server's version.
    #[default]
    LocalWins,
    /// The server snapshot replaces the local one.
    ServerWins,
    /// Conflicts are left for the caller.
    Manual,
}

impl ConflictPolicy {
    /// Returns true if this policy resolves conflicts without the caller.
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ConflictPolicy::Manual)
    }
}

impl<T: Clone> ConflictResolver<T> for ConflictPolicy {
    fn resolve(&self, conflict: &ConflictRecord<T>) -> ResolutionAction<T> {
        match self {
            ConflictPolicy::LocalWins => {
                // Field contents are never compared.
                let kind = match conflict.kind {
                    OperationKind::Delete => OperationKind::Delete,
                    OperationKind::Insert | OperationKind::Update => OperationKind::Update,
                };
                ResolutionAction::Resubmit {
                    kind,
                    entity: conflict
                        .local
                        .clone()
                        .with_version(conflict.server_version.clone()),
                }
            }
            ConflictPolicy::ServerWins => ResolutionAction::AcceptServer,
            ConflictPolicy::Manual => ResolutionAction::Skip,
        }
    }
}

/// Resolves conflicts with a caller-supplied merge of local and server data.
///
/// When the server copy is gone, or the local operation is a delete, the
/// merge function is not consulted and the local operation is resent.
pub struct MergeResolver<F> {
    merge: F,
}

impl<F> MergeResolver<F> {
    /// Wraps a merge function `fn(local, server) -> merged`.
    pub fn new(merge: F) -> Self {
        Self { merge }
    }
}

impl<F> fmt::Debug for MergeResolver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeResolver").finish_non_exhaustive()
    }
}

impl<T, F> ConflictResolver<T> for MergeResolver<F>
where
    T: Clone,
    F: Fn(&T, &T) -> T + Send + Sync,
{
    fn resolve(&self, conflict: &ConflictRecord<T>) -> ResolutionAction<T> {
        match (&conflict.server, conflict.kind) {
            (Some(server), OperationKind::Insert | OperationKind::Update) => {
                let mut entity = conflict
                    .local
                    .clone()
                    .with_version(conflict.server_version.clone());
                entity.data = (self.merge)(&conflict.local.data, &server.data);
                ResolutionAction::Resubmit {
                    kind: OperationKind::Update,
                    entity,
                }
            }
            _ => ConflictPolicy::LocalWins.resolve(conflict),
        }
    }
}

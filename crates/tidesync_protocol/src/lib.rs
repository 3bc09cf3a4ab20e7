//! # tidesync protocol
//!
//! Data types shared by the tidesync engine, its collaborators and the
//! reference server.
//!
//! This crate provides:
//! - `Entity<T>` with identity, version token and dirty flag
//! - `PendingOperation` and the in-memory `LogicalOplog`
//! - `ConflictRecord` and pluggable `ConflictResolver` policies
//! - `ChangeSet` / `Checkpoint` for incremental pulls
//! - `Query` for local reads and purges
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changes;
mod conflict;
mod entity;
mod operation;
mod oplog;
mod query;

pub use changes::{ChangeSet, Checkpoint, CheckpointKey, SubmitOutcome};
pub use conflict::{
    ConflictPolicy, ConflictRecord, ConflictResolver, MergeResolver, ResolutionAction,
};
pub use entity::{Entity, EntityData, EntityId, VersionToken};
pub use operation::{OperationKind, PendingOperation};
pub use oplog::LogicalOplog;
pub use query::{Filter, Query};

//! # tidesync engine
//!
//! Keeps a local replica of an entity collection consistent with a remote
//! authoritative store across unreliable connectivity.
//!
//! This crate provides:
//! - `SyncCoordinator`: push (drain the operation log), pull (fetch remote
//!   deltas), conflict resolution and local CRUD pass-through
//! - Collaborator contracts: `RemoteGateway`, `LocalStore`,
//!   `OperationLog`, `Connectivity`, `TokenProvider`
//! - In-memory reference collaborators for tests and embedding
//! - `ConnectivityWatcher`: debounced sync on reconnect
//!
//! ## Architecture
//!
//! The coordinator implements a **push-then-pull** cycle:
//! 1. Drain queued local mutations through the gateway, in queue order
//! 2. Route version conflicts through the injected `ConflictResolver`
//! 3. Fetch remote changes since the stored checkpoint and apply them
//!
//! ## Key Invariants
//!
//! - At most one cycle in flight per coordinator
//! - A queued operation is removed only after the remote store answers
//! - Transport failures leave the unacknowledged remainder queued
//! - A conflict is resubmitted at most once per cycle
//! - Reads always return clean copies

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod cancel;
mod config;
mod connectivity;
mod coordinator;
mod error;
mod gateway;
mod report;
mod store;

pub use auth::{StaticTokenProvider, TokenProvider};
pub use cancel::CancelToken;
pub use config::{RetryConfig, SyncConfig};
pub use connectivity::{Connectivity, ConnectivityWatcher, ManualConnectivity};
pub use coordinator::SyncCoordinator;
pub use error::{SyncError, SyncResult};
pub use gateway::{MockGateway, RemoteGateway};
pub use report::{RejectedOperation, SyncReport, SyncState, SyncStats, SyncStatus};
pub use store::{LocalStore, MemoryOperationLog, MemoryStore, OperationLog};

pub use tidesync_protocol as protocol;

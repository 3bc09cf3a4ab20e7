//! Sync cycle outcomes and running statistics.

use crate::error::SyncError;
use std::time::Duration;
use tidesync_protocol::{ConflictRecord, EntityId, OperationKind};
use tokio::time::Instant;

/// What the coordinator is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle is running.
    Idle,
    /// Draining the operation log.
    Pushing,
    /// Carrying out conflict resolutions.
    Resolving,
    /// Fetching and applying remote changes.
    Pulling,
}

impl SyncState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }
}

/// Overall outcome of a sync call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Every queued operation was acknowledged and the pull completed.
    Success,
    /// The cycle completed but some operations are still queued because of
    /// conflicts or rejections.
    PartialWithConflicts,
    /// A gateway call failed; the unacknowledged remainder stays queued.
    TransportFailed,
    /// The caller cancelled the cycle.
    Cancelled,
    /// Connectivity was down at entry; nothing was attempted.
    Offline,
    /// There was nothing to push.
    Idle,
}

impl SyncStatus {
    /// Returns true if the cycle ran to completion.
    pub fn is_complete(&self) -> bool {
        matches!(self, SyncStatus::Success | SyncStatus::PartialWithConflicts)
    }
}

/// An operation the remote store refused permanently.
///
/// The operation stays queued until the caller discards it.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedOperation {
    /// Sequence number of the refused operation.
    pub sequence: u64,
    /// Target entity.
    pub entity_id: EntityId,
    /// Operation kind.
    pub kind: OperationKind,
    /// Reason given by the remote store.
    pub reason: String,
}

/// Result of one push, pull or sync call.
#[derive(Debug, Clone)]
pub struct SyncReport<T> {
    /// Overall outcome.
    pub status: SyncStatus,
    /// Operations acknowledged by the remote store, resubmissions included.
    pub pushed: usize,
    /// Rows and deletions applied from the remote store.
    pub pulled: usize,
    /// Conflicts settled during this cycle.
    pub resolved: Vec<ConflictRecord<T>>,
    /// Conflicts left for the caller; their operations remain queued.
    pub unresolved: Vec<ConflictRecord<T>>,
    /// Operations the remote store refused.
    pub rejected: Vec<RejectedOperation>,
    /// The gateway failure that ended the cycle, if any.
    pub error: Option<SyncError>,
    /// Wall time of the call.
    pub duration: Duration,
}

impl<T> SyncReport<T> {
    pub(crate) fn new(status: SyncStatus) -> Self {
        Self {
            status,
            pushed: 0,
            pulled: 0,
            resolved: Vec::new(),
            unresolved: Vec::new(),
            rejected: Vec::new(),
            error: None,
            duration: Duration::ZERO,
        }
    }

    /// Returns true if the cycle completed with nothing left over.
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }

    /// Returns true if any conflict or rejection needs the caller's attention.
    pub fn needs_attention(&self) -> bool {
        !self.unresolved.is_empty() || !self.rejected.is_empty()
    }

    /// Records the gateway failure that stopped the cycle.
    pub(crate) fn halt(&mut self, error: SyncError) {
        if error == SyncError::Cancelled {
            self.status = SyncStatus::Cancelled;
        } else {
            self.status = SyncStatus::TransportFailed;
            self.error = Some(error);
        }
    }

    pub(crate) fn finish(mut self, started: Instant) -> Self {
        if self.status == SyncStatus::Success && self.needs_attention() {
            self.status = SyncStatus::PartialWithConflicts;
        }
        self.duration = started.elapsed();
        self
    }
}

/// Statistics accumulated over the coordinator's lifetime.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that reached the gateway.
    pub cycles_started: u64,
    /// Cycles that ran to completion.
    pub cycles_completed: u64,
    /// Operations acknowledged.
    pub operations_pushed: u64,
    /// Rows and deletions applied.
    pub rows_pulled: u64,
    /// Conflicts settled.
    pub conflicts_resolved: u64,
    /// Conflicts left for the caller.
    pub conflicts_unresolved: u64,
    /// Retries performed by `sync_with_retry`.
    pub retries: u64,
    /// Last gateway error.
    pub last_error: Option<String>,
}

impl SyncStats {
    pub(crate) fn record<T>(&mut self, report: &SyncReport<T>) {
        self.operations_pushed += report.pushed as u64;
        self.rows_pulled += report.pulled as u64;
        self.conflicts_resolved += report.resolved.len() as u64;
        self.conflicts_unresolved += report.unresolved.len() as u64;
        if report.status.is_complete() {
            self.cycles_completed += 1;
            self.last_error = None;
        }
        if let Some(error) = &report.error {
            self.last_error = Some(error.to_string());
        }
    }
}

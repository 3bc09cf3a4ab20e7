//! Remote gateway abstraction.

use crate::error::SyncResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tidesync_protocol::{
    ChangeSet, Checkpoint, EntityData, OperationKind, PendingOperation, SubmitOutcome,
    VersionToken,
};

/// The authoritative remote store, as seen by the coordinator.
///
/// Each call is one network round trip and a suspension point. The
/// coordinator never issues two calls concurrently on behalf of one
/// collection.
#[async_trait]
pub trait RemoteGateway<T: EntityData>: Send + Sync {
    /// Submits one queued operation.
    ///
    /// The operation's entity carries identity, full body and the base
    /// version token. Transport failures are returned as `Err`; the
    /// remote store's verdict is returned as `Ok`.
    async fn submit(&self, operation: &PendingOperation<T>) -> SyncResult<SubmitOutcome<T>>;

    /// Fetches rows changed since `checkpoint` that match `query`.
    async fn fetch_changes(
        &self,
        checkpoint: Option<&Checkpoint>,
        query: &str,
    ) -> SyncResult<ChangeSet<T>>;
}

/// A scripted in-process gateway for testing.
///
/// Queued outcomes are returned in order; once the script is empty every
/// submission is accepted with a fresh `mock-N` version and every fetch
/// returns an empty final page.
pub struct MockGateway<T> {
    state: Mutex<MockState<T>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct MockState<T> {
    submit_script: VecDeque<SyncResult<SubmitOutcome<T>>>,
    change_script: VecDeque<SyncResult<ChangeSet<T>>>,
    submitted: Vec<PendingOperation<T>>,
    fetched: Vec<(Option<Checkpoint>, String)>,
    delay: Duration,
    issued_versions: u64,
}

impl<T: EntityData> MockGateway<T> {
    /// Creates a gateway that accepts everything.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                submit_script: VecDeque::new(),
                change_script: VecDeque::new(),
                submitted: Vec::new(),
                fetched: Vec::new(),
                delay: Duration::ZERO,
                issued_versions: 0,
            }),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Queues the result of a future `submit` call.
    pub fn queue_submit(&self, outcome: SyncResult<SubmitOutcome<T>>) {
        self.state.lock().submit_script.push_back(outcome);
    }

    /// Queues the result of a future `fetch_changes` call.
    pub fn queue_changes(&self, changes: SyncResult<ChangeSet<T>>) {
        self.state.lock().change_script.push_back(changes);
    }

    /// Makes every call wait `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = delay;
    }

    /// Returns the operations that reached the gateway, in arrival order.
    pub fn submitted(&self) -> Vec<PendingOperation<T>> {
        self.state.lock().submitted.clone()
    }

    /// Returns the number of `submit` calls answered.
    pub fn submit_count(&self) -> usize {
        self.state.lock().submitted.len()
    }

    /// Returns the checkpoints and query labels passed to `fetch_changes`.
    pub fn fetched(&self) -> Vec<(Option<Checkpoint>, String)> {
        self.state.lock().fetched.clone()
    }

    /// Returns the highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        let delay = self.state.lock().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        guard
    }
}

impl<T: EntityData> Default for MockGateway<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter, also when the call is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<T: EntityData> RemoteGateway<T> for MockGateway<T> {
    async fn submit(&self, operation: &PendingOperation<T>) -> SyncResult<SubmitOutcome<T>> {
        let _guard = self.enter().await;

        let mut state = self.state.lock();
        let outcome = match state.submit_script.pop_front() {
            Some(scripted) => scripted?,
            None => {
                state.issued_versions += 1;
                let version = VersionToken::new(format!("mock-{}", state.issued_versions));
                match operation.kind {
                    OperationKind::Delete => SubmitOutcome::Accepted(None),
                    OperationKind::Insert | OperationKind::Update => SubmitOutcome::Accepted(
                        Some(operation.entity.clone().into_clean().with_version(version)),
                    ),
                }
            }
        };
        state.submitted.push(operation.clone());
        Ok(outcome)
    }

    async fn fetch_changes(
        &self,
        checkpoint: Option<&Checkpoint>,
        query: &str,
    ) -> SyncResult<ChangeSet<T>> {
        let _guard = self.enter().await;

        let mut state = self.state.lock();
        state.fetched.push((checkpoint.cloned(), query.to_string()));
        match state.change_script.pop_front() {
            Some(scripted) => scripted,
            None => Ok(ChangeSet::empty(
                checkpoint.cloned().unwrap_or_else(|| Checkpoint::new("0")),
            )),
        }
    }
}

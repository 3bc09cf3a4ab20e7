//! In-process gateway that talks to a [`SyncServer`] directly.
//!
//! Used by tests and demos to exercise the full client/server path without
//! a network. Faults can be injected to simulate outages and lost answers.

use crate::error::ServerError;
use crate::server::SyncServer;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tidesync_engine::{RemoteGateway, SyncError, SyncResult, TokenProvider};
use tidesync_protocol::{ChangeSet, Checkpoint, EntityData, PendingOperation, SubmitOutcome};
use tracing::debug;

#[derive(Debug, Default)]
struct Faults {
    unreachable: bool,
    /// Submissions still allowed before the link drops.
    fail_after: Option<usize>,
    /// Submissions whose answer is dropped after the server applied them.
    lost_responses: usize,
    latency: Duration,
}

/// A [`RemoteGateway`] backed by an in-process [`SyncServer`].
pub struct LoopbackGateway<T> {
    server: Arc<SyncServer<T>>,
    tokens: Option<Arc<dyn TokenProvider>>,
    faults: Mutex<Faults>,
    submissions: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl<T: EntityData> LoopbackGateway<T> {
    /// Creates a gateway that sends no credentials.
    pub fn new(server: Arc<SyncServer<T>>) -> Self {
        Self {
            server,
            tokens: None,
            faults: Mutex::new(Faults::default()),
            submissions: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Stamps every request with a token from `provider`.
    pub fn with_tokens(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(provider);
        self
    }

    /// Makes every call wait `latency` before reaching the server.
    pub fn set_latency(&self, latency: Duration) {
        self.faults.lock().latency = latency;
    }

    /// Simulates the link going down or coming back.
    pub fn set_reachable(&self, reachable: bool) {
        self.faults.lock().unreachable = !reachable;
    }

    /// Lets `count` more submissions through, then drops the link.
    pub fn fail_after(&self, count: usize) {
        self.faults.lock().fail_after = Some(count);
    }

    /// Clears every injected fault except latency.
    pub fn restore(&self) {
        let mut faults = self.faults.lock();
        faults.unreachable = false;
        faults.fail_after = None;
        faults.lost_responses = 0;
    }

    /// Drops the answer of the next `count` submissions after the server
    /// has applied them.
    pub fn lose_responses(&self, count: usize) {
        self.faults.lock().lost_responses = count;
    }

    /// Returns the number of submissions the server received.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Returns the highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        let latency = self.faults.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        guard
    }

    /// Decides whether the next call gets through.
    fn admit(&self, submission: bool) -> SyncResult<()> {
        let mut faults = self.faults.lock();
        if faults.unreachable {
            return Err(SyncError::transport_retryable("server unreachable"));
        }
        match faults.fail_after {
            Some(0) => Err(SyncError::transport_retryable("connection reset")),
            Some(ref mut left) if submission => {
                *left -= 1;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn take_lost_response(&self) -> bool {
        let mut faults = self.faults.lock();
        if faults.lost_responses > 0 {
            faults.lost_responses -= 1;
            true
        } else {
            false
        }
    }

    /// Runs `call` with a token, refreshing it once if the server refuses it.
    async fn authorized<R, F>(&self, call: F) -> SyncResult<R>
    where
        F: Fn(Option<&str>) -> Result<R, ServerError>,
    {
        let Some(provider) = &self.tokens else {
            return call(None).map_err(into_sync_error);
        };

        let token = provider.token().await?;
        match call(Some(&token)) {
            Err(ServerError::NotAuthorized(reason)) => {
                debug!(collection = T::COLLECTION, %reason, "token refused, refreshing");
                provider.invalidate();
                let token = provider.token().await?;
                call(Some(&token)).map_err(into_sync_error)
            }
            other => other.map_err(into_sync_error),
        }
    }
}

/// Decrements the in-flight counter, also when the call is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn into_sync_error(error: ServerError) -> SyncError {
    match error {
        ServerError::NotAuthorized(reason) | ServerError::AuthenticationFailed(reason) => {
            SyncError::AuthenticationFailed(reason)
        }
        ServerError::InvalidRequest(reason) => SyncError::Protocol(reason),
        ServerError::Internal(reason) => SyncError::transport_retryable(reason),
    }
}

#[async_trait]
impl<T: EntityData> RemoteGateway<T> for LoopbackGateway<T> {
    async fn submit(&self, operation: &PendingOperation<T>) -> SyncResult<SubmitOutcome<T>> {
        let _guard = self.enter().await;
        self.admit(true)?;

        let outcome = self
            .authorized(|token| self.server.handle_submit(token, operation))
            .await?;
        self.submissions.fetch_add(1, Ordering::SeqCst);

        if self.take_lost_response() {
            debug!(
                collection = T::COLLECTION,
                sequence = operation.sequence,
                "dropping submit response"
            );
            return Err(SyncError::transport_retryable("response lost"));
        }
        Ok(outcome)
    }

    async fn fetch_changes(
        &self,
        checkpoint: Option<&Checkpoint>,
        query: &str,
    ) -> SyncResult<ChangeSet<T>> {
        let _guard = self.enter().await;
        self.admit(false)?;

        self.authorized(|token| self.server.handle_fetch(token, checkpoint, query))
            .await
    }
}

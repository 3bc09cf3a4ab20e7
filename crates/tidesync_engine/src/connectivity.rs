//! Connectivity signal and the reconnect watcher.

use crate::cancel::CancelToken;
use crate::coordinator::SyncCoordinator;
use std::sync::Arc;
use tidesync_protocol::EntityData;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reports whether the remote store is reachable.
pub trait Connectivity: Send + Sync {
    /// Returns the current state.
    fn is_connected(&self) -> bool;

    /// Subscribes to state transitions.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// A connectivity source driven by the embedding application.
#[derive(Debug)]
pub struct ManualConnectivity {
    sender: watch::Sender<bool>,
}

impl ManualConnectivity {
    /// Creates a source with the given initial state.
    pub fn new(connected: bool) -> Self {
        let (sender, _) = watch::channel(connected);
        Self { sender }
    }

    /// Sets the state. Subscribers are notified only if it changed.
    ///
    /// Returns true on a transition.
    pub fn set_connected(&self, connected: bool) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == connected {
                false
            } else {
                *current = connected;
                true
            }
        })
    }
}

impl Connectivity for ManualConnectivity {
    fn is_connected(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Runs a sync cycle when connectivity returns.
///
/// A cycle starts only if no sync has completed within the reconnect
/// debounce window. Overlap with caller-invoked cycles is prevented by the
/// coordinator itself.
#[derive(Debug)]
pub struct ConnectivityWatcher {
    task: Option<JoinHandle<()>>,
    shutdown: CancelToken,
}

impl ConnectivityWatcher {
    /// Subscribes to the coordinator's connectivity source.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<T: EntityData>(coordinator: Arc<SyncCoordinator<T>>) -> Self {
        let shutdown = CancelToken::new();
        let mut changes = coordinator.connectivity().subscribe();
        let stop = shutdown.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            debug!(collection = T::COLLECTION, "connectivity source closed");
                            break;
                        }
                    }
                }

                let connected = *changes.borrow_and_update();
                if !connected {
                    debug!(collection = T::COLLECTION, "connectivity lost");
                    continue;
                }
                if !coordinator.should_sync_on_reconnect() {
                    debug!(collection = T::COLLECTION, "reconnect within debounce window");
                    continue;
                }

                match coordinator.sync(&stop).await {
                    Ok(report) => info!(
                        collection = T::COLLECTION,
                        status = ?report.status,
                        pushed = report.pushed,
                        pulled = report.pulled,
                        "reconnect sync finished"
                    ),
                    Err(error) => warn!(
                        collection = T::COLLECTION,
                        %error,
                        "reconnect sync failed"
                    ),
                }
            }
        });

        Self {
            task: Some(task),
            shutdown,
        }
    }

    /// Unsubscribes and cancels any cycle the watcher started.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                warn!(%error, "connectivity watcher task ended abnormally");
            }
        }
    }
}

impl Drop for ConnectivityWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

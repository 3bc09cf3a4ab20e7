//! Credentials used to stamp outgoing gateway requests.

use crate::error::SyncResult;
use async_trait::async_trait;
use parking_lot::RwLock;

/// Supplies the bearer token a gateway attaches to each request.
///
/// Gateways call `invalidate` when the server refuses a token and then ask
/// for a fresh one exactly once before giving up.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a token, logging in if none is cached.
    async fn token(&self) -> SyncResult<String>;

    /// Drops the cached token so the next `token` call re-authenticates.
    fn invalidate(&self);
}

/// A provider that hands out a fixed token, optionally replaced later.
#[derive(Debug)]
pub struct StaticTokenProvider {
    token: RwLock<String>,
    next: RwLock<Option<String>>,
}

impl StaticTokenProvider {
    /// Creates a provider returning `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(token.into()),
            next: RwLock::new(None),
        }
    }

    /// Sets the token handed out after the next `invalidate`.
    pub fn rotate_to(&self, token: impl Into<String>) {
        *self.next.write() = Some(token.into());
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> SyncResult<String> {
        Ok(self.token.read().clone())
    }

    fn invalidate(&self) {
        if let Some(next) = self.next.write().take() {
            *self.token.write() = next;
        }
    }
}

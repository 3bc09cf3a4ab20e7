//! Request handling for the reference server.

use crate::auth::{AuthConfig, TokenValidator};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::RemoteStore;
use std::sync::Arc;
use tidesync_protocol::{ChangeSet, Checkpoint, EntityData, PendingOperation, SubmitOutcome};
use tracing::{debug, warn};

/// The reference sync server for one collection.
///
/// Authorizes each request, then answers submissions and change fetches
/// from a [`RemoteStore`].
///
/// # Example
///
/// ```
/// use tidesync_protocol::{Entity, EntityData, OperationKind, PendingOperation};
/// use tidesync_server::{ServerConfig, SyncServer};
///
/// #[derive(Debug, Clone)]
/// struct Note(String);
///
/// impl EntityData for Note {
///     const COLLECTION: &'static str = "Note";
/// }
///
/// let server = SyncServer::new(ServerConfig::default());
/// let op = PendingOperation::new(
///     1,
///     OperationKind::Insert,
///     Entity::new("n1", Note("hello".into())),
/// );
/// assert!(server.handle_submit(None, &op).unwrap().is_accepted());
/// assert_eq!(server.handle_fetch(None, None, "Note").unwrap().len(), 1);
/// ```
pub struct SyncServer<T> {
    config: ServerConfig,
    store: Arc<RemoteStore<T>>,
    tokens: Option<TokenValidator>,
}

impl<T: EntityData> SyncServer<T> {
    /// Creates a server with an empty store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(RemoteStore::new()))
    }

    /// Creates a server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<RemoteStore<T>>) -> Self {
        let tokens = config.auth_secret.clone().map(|secret| {
            TokenValidator::new(AuthConfig::new(secret).with_expiry(config.token_expiry))
        });
        Self {
            config,
            store,
            tokens,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<RemoteStore<T>> {
        &self.store
    }

    /// Issues a token for `user_id`.
    pub fn issue_token(&self, user_id: &str) -> ServerResult<String> {
        self.validator()?.create_token(user_id)
    }

    /// Checks the request token. Returns the user id, or `None` when
    /// authentication is disabled.
    pub fn authorize(&self, token: Option<&str>) -> ServerResult<Option<String>> {
        if !self.config.require_auth {
            return Ok(None);
        }
        let token = token.ok_or_else(|| ServerError::NotAuthorized("missing token".into()))?;
        match self.validator()?.validate_token(token) {
            Ok(user) => Ok(Some(user)),
            Err(error) => {
                warn!(collection = T::COLLECTION, %error, "request refused");
                Err(error)
            }
        }
    }

    /// Handles one submitted operation.
    pub fn handle_submit(
        &self,
        token: Option<&str>,
        operation: &PendingOperation<T>,
    ) -> ServerResult<SubmitOutcome<T>> {
        let user = self.authorize(token)?;
        debug!(
            collection = T::COLLECTION,
            user = user.as_deref().unwrap_or("anonymous"),
            sequence = operation.sequence,
            "submit"
        );
        Ok(self.store.apply(operation))
    }

    /// Handles a change fetch.
    ///
    /// The query label only identifies the client's pull stream; every
    /// change in the collection is served.
    pub fn handle_fetch(
        &self,
        token: Option<&str>,
        checkpoint: Option<&Checkpoint>,
        query: &str,
    ) -> ServerResult<ChangeSet<T>> {
        let user = self.authorize(token)?;
        let changes = self
            .store
            .changes_since(checkpoint, self.config.max_fetch_batch)?;
        debug!(
            collection = T::COLLECTION,
            user = user.as_deref().unwrap_or("anonymous"),
            query,
            rows = changes.rows.len(),
            deleted = changes.deleted.len(),
            has_more = changes.has_more,
            "fetch"
        );
        Ok(changes)
    }

    fn validator(&self) -> ServerResult<&TokenValidator> {
        self.tokens
            .as_ref()
            .ok_or_else(|| ServerError::AuthenticationFailed("no signing secret configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidesync_protocol::{Entity, EntityId, OperationKind};

    #[derive(Debug, Clone, PartialEq)]
    struct Item(u8);

    impl EntityData for Item {
        const COLLECTION: &'static str = "Item";
    }

    fn insert(id: &str) -> PendingOperation<Item> {
        PendingOperation::new(1, OperationKind::Insert, Entity::new(id, Item(1)))
    }

    fn secured() -> SyncServer<Item> {
        SyncServer::new(ServerConfig::new().with_auth(b"server-secret".to_vec()))
    }

    #[test]
    fn open_server_accepts_anonymous_requests() {
        let server = SyncServer::new(ServerConfig::default());
        assert_eq!(server.authorize(None), Ok(None));
        assert!(server.handle_submit(None, &insert("a")).unwrap().is_accepted());
        assert!(server.issue_token("alice").is_err());
    }

    #[test]
    fn secured_server_requires_a_valid_token() {
        let server = secured();
        assert!(matches!(
            server.handle_submit(None, &insert("a")),
            Err(ServerError::NotAuthorized(_))
        ));
        assert!(matches!(
            server.handle_fetch(Some("alice.1.00"), None, "Item"),
            Err(ServerError::NotAuthorized(_))
        ));

        let token = server.issue_token("alice").unwrap();
        assert_eq!(server.authorize(Some(&token)), Ok(Some("alice".into())));
        assert!(server
            .handle_submit(Some(&token), &insert("a"))
            .unwrap()
            .is_accepted());
        assert!(server.store().get(&EntityId::new("a")).is_some());
    }

    #[test]
    fn auth_without_secret_fails() {
        let mut config = ServerConfig::default();
        config.require_auth = true;
        let server: SyncServer<Item> = SyncServer::new(config);
        assert!(matches!(
            server.authorize(Some("anything")),
            Err(ServerError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn fetch_respects_batch_size() {
        let server = SyncServer::new(ServerConfig::new().with_max_fetch_batch(2));
        for id in ["a", "b", "c"] {
            server.store().put(id, Item(0));
        }

        let first = server.handle_fetch(None, None, "Item").unwrap();
        assert_eq!(first.rows.len(), 2);
        assert!(first.has_more);

        let rest = server
            .handle_fetch(None, Some(&first.checkpoint), "Item")
            .unwrap();
        assert_eq!(rest.rows.len(), 1);
        assert!(!rest.has_more);
    }

    #[test]
    fn shared_store() {
        let store = Arc::new(RemoteStore::new());
        let server = SyncServer::with_store(ServerConfig::default(), Arc::clone(&store));
        server.handle_submit(None, &insert("a")).unwrap();
        assert_eq!(store.len(), 1);
    }
}

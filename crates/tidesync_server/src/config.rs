//! Server configuration.

use std::time::Duration;

/// Configuration for the reference server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum rows and deletions returned by one fetch.
    pub max_fetch_batch: usize,
    /// Whether requests must carry a valid token.
    pub require_auth: bool,
    /// Secret key for token signing (if auth enabled).
    pub auth_secret: Option<Vec<u8>>,
    /// Lifetime of issued tokens.
    pub token_expiry: Duration,
}

impl ServerConfig {
    /// Creates a configuration with defaults: batches of 100, no auth.
    pub fn new() -> Self {
        Self {
            max_fetch_batch: 100,
            require_auth: false,
            auth_secret: None,
            token_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Sets the maximum fetch batch size.
    pub fn with_max_fetch_batch(mut self, size: usize) -> Self {
        self.max_fetch_batch = size.max(1);
        self
    }

    /// Enables authentication with the given secret.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.require_auth = true;
        self.auth_secret = Some(secret);
        self
    }

    /// Sets the token lifetime.
    pub fn with_token_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

//! Token authentication for the reference server.
//!
//! Tokens are HMAC-SHA256 signed and bound to a user id and an issue time.
//!
//! ## Token Format
//!
//! `{user_id}.{issued_at_millis}.{signature_hex}` where the signature covers
//! `{user_id}.{issued_at_millis}`. The user id may itself contain dots; the
//! last two fields are split off from the right.

use crate::error::{ServerError, ServerResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token expiration duration.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates a configuration with a 24 hour token lifetime.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Sets the token expiration duration.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

/// Issues and checks bearer tokens.
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    /// Creates a validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Issues a token for `user_id`, valid from now.
    pub fn create_token(&self, user_id: &str) -> ServerResult<String> {
        self.create_token_at(user_id, SystemTime::now())
    }

    fn create_token_at(&self, user_id: &str, issued_at: SystemTime) -> ServerResult<String> {
        let millis = unix_millis(issued_at);
        let claims = format!("{user_id}.{millis}");
        let signature = self.mac(&claims)?.finalize().into_bytes();
        Ok(format!("{claims}.{}", hex::encode(signature)))
    }

    /// Checks a token and returns the user id it was issued for.
    pub fn validate_token(&self, token: &str) -> ServerResult<String> {
        let mut parts = token.rsplitn(3, '.');
        let (Some(signature), Some(millis), Some(user_id)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(ServerError::NotAuthorized("malformed token".into()));
        };

        let signature = hex::decode(signature)
            .map_err(|_| ServerError::NotAuthorized("malformed signature".into()))?;
        let claims = &token[..user_id.len() + 1 + millis.len()];
        self.mac(claims)?
            .verify_slice(&signature)
            .map_err(|_| ServerError::NotAuthorized("invalid signature".into()))?;

        let issued: u64 = millis
            .parse()
            .map_err(|_| ServerError::NotAuthorized("malformed timestamp".into()))?;
        let expiry = u64::try_from(self.config.token_expiry.as_millis()).unwrap_or(u64::MAX);
        if unix_millis(SystemTime::now()) > issued.saturating_add(expiry) {
            return Err(ServerError::NotAuthorized("token expired".into()));
        }

        Ok(user_id.to_string())
    }

    fn mac(&self, claims: &str) -> ServerResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::AuthenticationFailed(e.to_string()))?;
        mac.update(claims.as_bytes());
        Ok(mac)
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("token_expiry", &self.config.token_expiry)
            .finish_non_exhaustive()
    }
}

fn unix_millis(at: SystemTime) -> u64 {
    let millis = at.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

//! # tidesync server
//!
//! In-process reference remote store for the tidesync engine.
//!
//! This crate provides:
//! - `RemoteStore`: authoritative rows with optimistic version checks and
//!   an incremental change feed
//! - `SyncServer`: request authorization and dispatch
//! - `LoopbackGateway`: a `RemoteGateway` that calls the server directly,
//!   with fault injection for outage and lost-response scenarios
//! - HMAC-SHA256 bearer tokens
//!
//! # Versioning
//!
//! Every accepted write stamps a new change number. The number is the
//! row's version token and the pull checkpoint at the same time, so a
//! client's base version is stale exactly when someone else wrote since.
//!
//! # Authentication
//!
//! ```
//! use tidesync_server::{AuthConfig, ServerConfig, TokenValidator};
//!
//! let secret = b"my-secure-secret-32-bytes-long!".to_vec();
//! let _config = ServerConfig::default().with_auth(secret.clone());
//!
//! let validator = TokenValidator::new(AuthConfig::new(secret));
//! let token = validator.create_token("device-7").unwrap();
//! assert_eq!(validator.validate_token(&token).unwrap(), "device-7");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod loopback;
mod server;
mod store;

pub use auth::{AuthConfig, TokenValidator};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use loopback::LoopbackGateway;
pub use server::SyncServer;
pub use store::{RemoteStore, RowValidator};

//! Client-side OAuth 2.0 Authorization Code + PKCE session management
//!
//! Manages the full lifecycle of an authorization handshake for
//! browser-style single-page clients: PKCE challenge generation, the
//! authorize redirect, the code-for-token exchange, token persistence, and
//! proactive refresh — with replay protection on the callback and
//! recovery from stuck handshakes.
//!
//! The host environment is injected through three small traits, so any UI
//! binding layer (signals, observables, callback registries) can sit on top
//! without this crate depending on a specific reactivity runtime:
//!
//! - [`traits::StorageBackend`] — key-value persistence (may be absent;
//!   everything degrades to no-ops),
//! - [`traits::Navigator`] — location control (redirect, reload, query
//!   read/scrub),
//! - [`traits::StateSink`] — the reactive state container receiving
//!   [`traits::AuthEvent`] updates.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  AuthService │  State machine (login / callback / refresh / logout)
//! └──────┬───────┘
//!        │
//!        ├──► TokenClient       (authorize/logout URLs, token exchanges)
//!        ├──► CredentialStore   (namespaced shallow-merge persistence)
//!        │         └──► StorageBackend (host)
//!        ├──► pkce utilities    (verifier/challenge, state nonce)
//!        ├──► Navigator (host)  (terminal redirects, query scrubbing)
//!        └──► StateSink (host)  (token/error projection)
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use authflow::testing::{MemoryStorage, MockNavigator, RecordingSink};
//! use authflow::{AuthConfig, AuthService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::new(
//!     "client_id",
//!     "https://ex.com/oauth2",
//!     "https://app/cb",
//!     vec!["openid".to_string(), "profile".to_string()],
//! );
//!
//! let service = AuthService::new(
//!     config,
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(MockNavigator::new()),
//!     Arc::new(RecordingSink::new()),
//! );
//!
//! // Once per page load: watchdog, projection, callback detection.
//! service.initialize().await?;
//!
//! if !service.is_authenticated() {
//!     // Terminal: redirects to the provider's authorize endpoint.
//!     service.login()?;
//! }
//!
//! if let Some(token) = service.get_access_token().await {
//!     let _bearer = token.access_token;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`types`]: configuration, token, and handshake records
//! - [`pkce`]: verifier/challenge generation and the state nonce
//! - [`store`]: namespaced shallow-merge credential storage
//! - [`client`]: provider URLs and token endpoint exchanges
//! - [`service`]: the authorization state machine
//! - [`traits`]: host-environment injection seams
//! - [`testing`]: in-memory mocks for the seams

pub mod client;
pub mod pkce;
pub mod service;
pub mod store;
pub mod testing;
pub mod traits;
pub mod types;

pub use client::{TokenClient, TokenClientError};
pub use pkce::{base64url_encode, challenge_for, random_nonce, PkceError, PkcePair};
pub use service::{
    AuthService, AuthServiceError, CallbackOutcome, HANDSHAKE_WATCHDOG_MS,
};
pub use store::{CredentialStore, HANDSHAKE_KEY, TOKEN_KEY};
pub use traits::{AuthEvent, Navigator, StateSink, StorageBackend, UnavailableStorage};
pub use types::{
    AuthConfig, AuthStatus, AuthToken, HandshakeRecord, REFRESH_SLACK_SECS,
};

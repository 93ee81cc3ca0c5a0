//! Authorization state machine
//!
//! Orchestrates the full session lifecycle over the injected collaborators:
//! login redirect, callback handling with state validation, code and refresh
//! exchanges, token persistence and projection, proactive refresh
//! scheduling, logout, and stuck-handshake recovery.
//!
//! States are `Unauthenticated`, `HandshakePending`, `Authenticated`, and
//! `Error`, derived from persisted storage plus the last surfaced error. The
//! persisted `is_pending` flag is the advisory mutual exclusion across rapid
//! or concurrent invocations; the watchdog keeps it from sticking forever.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::{TokenClient, TokenClientError};
use crate::pkce::{random_nonce, PkceError, PkcePair, STATE_NONCE_BYTES};
use crate::store::{CredentialStore, HANDSHAKE_KEY, TOKEN_KEY};
use crate::traits::{AuthEvent, Navigator, StateSink, StorageBackend};
use crate::types::{AuthConfig, AuthStatus, AuthToken, HandshakeRecord};

/// How long a handshake may sit with `is_pending` set before the watchdog
/// force-clears it and reloads (milliseconds).
pub const HANDSHAKE_WATCHDOG_MS: i64 = 60_000;

const EXCHANGE_FAILED_MESSAGE: &str = "Failed to fetch access token";
const REFRESH_FAILED_MESSAGE: &str = "Failed to refresh access token";

/// Error type for state machine operations
#[derive(Debug)]
pub enum AuthServiceError {
    /// The handshake record held no code verifier at exchange time
    /// (lost or tampered handshake; a programming/state error)
    MissingVerifier,

    /// PKCE material generation failed
    Pkce(PkceError),

    /// Token endpoint operation failed
    Client(TokenClientError),
}

impl std::fmt::Display for AuthServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingVerifier => write!(f, "Code verifier not found"),
            Self::Pkce(e) => write!(f, "PKCE error: {e}"),
            Self::Client(e) => write!(f, "Token client error: {e}"),
        }
    }
}

impl std::error::Error for AuthServiceError {}

impl From<PkceError> for AuthServiceError {
    fn from(err: PkceError) -> Self {
        Self::Pkce(err)
    }
}

impl From<TokenClientError> for AuthServiceError {
    fn from(err: TokenClientError) -> Self {
        Self::Client(err)
    }
}

/// What `handle_callback` found and did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// A token or pending handshake already exists; nothing to do
    Skipped,
    /// The current location carries no authorization response
    NoCallback,
    /// The `state` nonce did not match the stored handshake; discarded
    /// silently as a replay or forged redirect
    StateMismatch,
    /// The code exchange completed and the token was saved
    Completed,
    /// The exchange failed; the error was surfaced to consumers
    ExchangeFailed,
}

/// The authorization state machine
///
/// One instance per namespace. Construction wires the injected storage,
/// navigator, and state sink; [`AuthService::initialize`] runs the
/// once-per-page-load work (watchdog, projection, callback detection).
pub struct AuthService<S, N, K>
where
    S: StorageBackend + 'static,
    N: Navigator + 'static,
    K: StateSink + 'static,
{
    config: AuthConfig,
    store: CredentialStore<S>,
    client: TokenClient,
    navigator: Arc<N>,
    sink: Arc<K>,
    last_error: Mutex<Option<String>>,
    refresh_timer: Mutex<Option<JoinHandle<()>>>,
}

impl<S, N, K> AuthService<S, N, K>
where
    S: StorageBackend + 'static,
    N: Navigator + 'static,
    K: StateSink + 'static,
{
    /// Create a service over the injected collaborators.
    ///
    /// The returned service is wrapped in `Arc` because the refresh timer
    /// task holds a clone across its sleep.
    #[must_use]
    pub fn new(config: AuthConfig, backend: Arc<S>, navigator: Arc<N>, sink: Arc<K>) -> Arc<Self> {
        let store = CredentialStore::new(backend, config.storage_prefix());
        let client = TokenClient::new(config.clone());

        Arc::new(Self {
            config,
            store,
            client,
            navigator,
            sink,
            last_error: Mutex::new(None),
            refresh_timer: Mutex::new(None),
        })
    }

    /// Run the once-per-page-load startup sequence
    ///
    /// Recovers a stuck handshake, publishes the configuration, projects any
    /// stored token (arming refresh for it), and otherwise runs callback
    /// detection on the current location.
    ///
    /// # Errors
    /// Propagates [`AuthServiceError::MissingVerifier`] from callback
    /// handling; transport and provider failures are surfaced through the
    /// sink instead.
    pub async fn initialize(self: &Arc<Self>) -> Result<CallbackOutcome, AuthServiceError> {
        self.recover_stuck_handshake();
        self.sink.dispatch(AuthEvent::SetConfig(self.config.clone()));

        if let Some(token) = self.store.get::<AuthToken>(TOKEN_KEY) {
            self.sink.dispatch(AuthEvent::SetToken(token));
            self.schedule_refresh();
            return Ok(CallbackOutcome::Skipped);
        }

        self.handle_callback().await
    }

    /// Whether a token request is currently in flight
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.store.get::<HandshakeRecord>(HANDSHAKE_KEY).is_some_and(|h| h.is_pending)
    }

    /// Whether a usable token is held and no handshake is in flight
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        if self.is_pending() {
            return false;
        }

        self.store.get::<AuthToken>(TOKEN_KEY).is_some_and(|token| token.is_usable())
    }

    /// The authoritative view of the current session state
    #[must_use]
    pub fn status(&self) -> AuthStatus {
        if self.is_pending() {
            AuthStatus::HandshakePending
        } else if self.last_error.lock().is_some() {
            AuthStatus::Error
        } else if self.is_authenticated() {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Unauthenticated
        }
    }

    /// Start a login attempt
    ///
    /// No-op while a handshake is already pending. Otherwise clears any
    /// stored token, persists a fresh handshake record (overwriting a prior
    /// one), and redirects to the authorize endpoint. The redirect is a
    /// terminal navigation: in a real page nothing runs after it.
    ///
    /// # Errors
    /// Returns [`AuthServiceError::Pkce`] if secure randomness is
    /// unavailable; the attempt aborts without side effects in that case.
    pub fn login(&self) -> Result<(), AuthServiceError> {
        if self.is_pending() {
            debug!("login ignored: a handshake is already pending");
            return Ok(());
        }

        let pair = PkcePair::generate()?;
        let state = random_nonce(STATE_NONCE_BYTES)?;

        self.cancel_refresh();
        self.store.remove(TOKEN_KEY);

        let record = HandshakeRecord {
            code_verifier: Some(pair.code_verifier),
            code_challenge: Some(pair.code_challenge.clone()),
            state: Some(state.clone()),
            is_pending: false,
            created_at: pair.created_at,
        };
        // overwrite, not merge: a new attempt must not inherit prior fields
        self.store.remove(HANDSHAKE_KEY);
        self.store.set(HANDSHAKE_KEY, &record);

        let url = self.client.authorize_url(&state, &pair.code_challenge);
        info!("redirecting to authorize endpoint");
        self.navigator.redirect(&url);

        Ok(())
    }

    /// Consume an authorization response from the current location
    ///
    /// Runs once per page load when no token or pending handshake exists.
    /// Absent `code` means nothing happens. A `state` nonce that does not
    /// match the persisted handshake is treated as a replay or forgery and
    /// discarded silently, with no exchange attempted. On a match the code
    /// is exchanged, the token saved, and the query string scrubbed.
    ///
    /// # Errors
    /// Returns [`AuthServiceError::MissingVerifier`] when the matched
    /// handshake holds no code verifier; transport failures are handled
    /// internally (token and handshake cleared, query scrubbed, error
    /// dispatched).
    pub async fn handle_callback(self: &Arc<Self>) -> Result<CallbackOutcome, AuthServiceError> {
        if self.store.get::<AuthToken>(TOKEN_KEY).is_some() || self.is_pending() {
            return Ok(CallbackOutcome::Skipped);
        }

        let params = self.navigator.query_params();
        let Some(code) = params.get("code") else {
            return Ok(CallbackOutcome::NoCallback);
        };
        let callback_state = params.get("state").map(String::as_str);

        let handshake = self.store.get::<HandshakeRecord>(HANDSHAKE_KEY);
        let stored_state = handshake.as_ref().and_then(|h| h.state.as_deref());

        if stored_state.is_none() || stored_state != callback_state {
            // indistinguishable from a stale or duplicated redirect; no
            // user-visible error
            debug!("state nonce mismatch on callback, discarding handshake");
            self.store.remove(HANDSHAKE_KEY);
            self.navigator.strip_query();
            return Ok(CallbackOutcome::StateMismatch);
        }

        let Some(code_verifier) = handshake.and_then(|h| h.code_verifier) else {
            self.store.remove(HANDSHAKE_KEY);
            self.navigator.strip_query();
            self.set_error(EXCHANGE_FAILED_MESSAGE);
            return Err(AuthServiceError::MissingVerifier);
        };

        self.store.set(HANDSHAKE_KEY, &serde_json::json!({ "is_pending": true }));

        match self.client.exchange_code(code, &code_verifier).await {
            Ok(payload) => {
                self.store.set(HANDSHAKE_KEY, &serde_json::json!({ "is_pending": false }));
                let saved = self.save_token(payload);
                self.navigator.strip_query();

                if saved.error.is_some() {
                    Ok(CallbackOutcome::ExchangeFailed)
                } else {
                    info!("authorization code exchange completed");
                    Ok(CallbackOutcome::Completed)
                }
            }
            Err(e) => {
                error!(error = %e, "authorization code exchange failed");
                self.store.remove(TOKEN_KEY);
                self.store.remove(HANDSHAKE_KEY);
                self.navigator.strip_query();
                self.set_error(EXCHANGE_FAILED_MESSAGE);
                Ok(CallbackOutcome::ExchangeFailed)
            }
        }
    }

    /// Persist and project a token-endpoint payload
    ///
    /// An `error` payload transitions to the Error state: the message is
    /// dispatched and the payload persisted as-is so the error survives
    /// storage reads, but it is never treated as authenticated. Otherwise
    /// the derived `expires_at` is attached, the handshake cleared, the
    /// token dispatched, and the refresh timer re-armed. Dispatches happen
    /// synchronously before the surrounding async operation resolves.
    ///
    /// Returns the payload as persisted (with `expires_at` attached).
    pub fn save_token(self: &Arc<Self>, mut payload: AuthToken) -> AuthToken {
        if let Some(message) = payload.error.clone() {
            error!(error = %message, "token endpoint returned an error payload");
            self.cancel_refresh();
            self.set_error(message);
        } else {
            payload.derive_expiry();
            *self.last_error.lock() = None;
        }

        self.store.set(TOKEN_KEY, &payload);
        self.store.remove(HANDSHAKE_KEY);
        self.sink.dispatch(AuthEvent::SetToken(payload.clone()));

        if payload.error.is_none() {
            self.schedule_refresh();
        }

        payload
    }

    /// Get the current access token, refreshing it when expired
    ///
    /// Returns the stored token immediately while unexpired. When expired
    /// with a refresh token available, performs a refresh exchange and
    /// returns the renewed token. Returns `None` while pending or errored,
    /// when the stored token carries no derived expiry, or when no refresh
    /// path exists.
    pub async fn get_access_token(self: &Arc<Self>) -> Option<AuthToken> {
        if self.is_pending() {
            return None;
        }

        let token = self.store.get::<AuthToken>(TOKEN_KEY)?;
        if token.error.is_some() || token.access_token.is_none() {
            return None;
        }

        // no derived expiry means the token never went through save_token;
        // its lifetime is unknown, so no refresh is attempted on a guess
        token.expires_at?;

        if !token.is_expired(Utc::now().timestamp_millis()) {
            return Some(token);
        }

        let refresh_token = token.refresh_token?;
        self.refresh_with(&refresh_token).await
    }

    /// Force a refresh exchange regardless of expiry
    ///
    /// Returns the renewed token, or `None` while pending or errored or when
    /// no refresh token is held.
    pub async fn renew_access_token(self: &Arc<Self>) -> Option<AuthToken> {
        if self.is_pending() {
            return None;
        }

        let token = self.store.get::<AuthToken>(TOKEN_KEY)?;
        if token.error.is_some() {
            return None;
        }

        let refresh_token = token.refresh_token?;
        self.refresh_with(&refresh_token).await
    }

    async fn refresh_with(self: &Arc<Self>, refresh_token: &str) -> Option<AuthToken> {
        match self.client.exchange_refresh(refresh_token).await {
            Ok(payload) => {
                let saved = self.save_token(payload);
                if saved.error.is_some() {
                    None
                } else {
                    Some(saved)
                }
            }
            Err(e) => {
                error!(error = %e, "refresh exchange failed");
                self.store.remove(TOKEN_KEY);
                self.store.remove(HANDSHAKE_KEY);
                self.set_error(REFRESH_FAILED_MESSAGE);
                None
            }
        }
    }

    /// Log out, always clearing the local token first
    ///
    /// No-op when no token is held. With `logout_from_provider` the browser
    /// is redirected to the provider's logout endpoint carrying
    /// `id_token_hint`; otherwise the page is reloaded, which resets the
    /// in-memory projection cleanly since no partial-teardown path exists.
    pub fn logout(&self, logout_from_provider: bool) {
        let Some(token) = self.store.get::<AuthToken>(TOKEN_KEY) else {
            return;
        };

        self.cancel_refresh();
        self.store.remove(TOKEN_KEY);
        *self.last_error.lock() = None;

        if logout_from_provider {
            let url = self.client.logout_url(token.id_token.as_deref());
            info!("redirecting to provider logout endpoint");
            self.navigator.redirect(&url);
        } else {
            self.navigator.reload();
        }
    }

    /// Arm the proactive refresh timer for the stored token
    ///
    /// Cancel-before-arm: at most one timer is outstanding per namespace.
    /// Nothing is armed unless `auto_refresh` is on, no error is surfaced,
    /// and the stored token carries a refresh token and a future
    /// `expires_at`. A token already past its expiry is removed instead.
    /// When the timer fires, the refresh exchange runs; a provider error
    /// payload clears the token and re-invokes `login()`.
    pub fn schedule_refresh(self: &Arc<Self>) {
        self.cancel_refresh();

        if !self.config.auto_refresh || self.last_error.lock().is_some() {
            return;
        }

        let Some(token) = self.store.get::<AuthToken>(TOKEN_KEY) else {
            return;
        };
        if token.error.is_some() {
            return;
        }
        let (Some(expires_at), Some(refresh_token)) = (token.expires_at, token.refresh_token)
        else {
            return;
        };

        let delay_ms = expires_at - Utc::now().timestamp_millis();
        if delay_ms <= 0 {
            debug!("token already expired at arm time, dropping it");
            self.store.remove(TOKEN_KEY);
            return;
        }

        debug!(delay_ms, "arming refresh timer");
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms as u64)).await;
            service.run_scheduled_refresh(&refresh_token).await;
        });
        *self.refresh_timer.lock() = Some(handle);
    }

    async fn run_scheduled_refresh(self: Arc<Self>, refresh_token: &str) {
        debug!("refresh timer fired");
        match self.client.exchange_refresh(refresh_token).await {
            Ok(payload) => {
                if let Some(message) = payload.error.clone() {
                    // the provider rejected the refresh token: drop the
                    // session and start a fresh handshake
                    warn!(error = %message, "scheduled refresh rejected by provider");
                    self.store.remove(TOKEN_KEY);
                    self.set_error(message);
                    if let Err(e) = self.login() {
                        error!(error = %e, "re-login after rejected refresh failed");
                    }
                } else {
                    self.save_token(payload);
                }
            }
            Err(e) => {
                error!(error = %e, "scheduled refresh failed");
                self.store.remove(TOKEN_KEY);
                self.set_error(REFRESH_FAILED_MESSAGE);
            }
        }
    }

    /// Disarm any outstanding refresh timer
    ///
    /// Plain timer cancellation; an in-flight exchange response is simply
    /// discarded once state has moved on.
    pub fn cancel_refresh(&self) {
        if let Some(handle) = self.refresh_timer.lock().take() {
            handle.abort();
        }
    }

    /// Whether a refresh timer is currently armed
    #[must_use]
    pub fn has_refresh_timer(&self) -> bool {
        self.refresh_timer.lock().is_some()
    }

    /// Force-clear a handshake stuck pending beyond the watchdog window
    ///
    /// Recovery-by-reset: the record is removed and the page reloaded, since
    /// a deadlocked pending flag would otherwise lock the client out
    /// permanently. A pending record without a creation time counts as
    /// stuck.
    pub fn recover_stuck_handshake(&self) {
        let Some(handshake) = self.store.get::<HandshakeRecord>(HANDSHAKE_KEY) else {
            return;
        };
        if !handshake.is_pending {
            return;
        }

        let age_ms = Utc::now().timestamp_millis() - handshake.created_at;
        if handshake.created_at == 0 || age_ms > HANDSHAKE_WATCHDOG_MS {
            warn!(age_ms, "force-clearing stuck pending handshake");
            self.store.remove(HANDSHAKE_KEY);
            self.navigator.reload();
        }
    }

    /// Get a reference to the session configuration
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        *self.last_error.lock() = Some(message.clone());
        self.sink.dispatch(AuthEvent::SetError(message));
    }
}

impl<S, N, K> Drop for AuthService<S, N, K>
where
    S: StorageBackend + 'static,
    N: Navigator + 'static,
    K: StateSink + 'static,
{
    fn drop(&mut self) {
        if let Some(handle) = self.refresh_timer.lock().take() {
            handle.abort();
        }
    }
}

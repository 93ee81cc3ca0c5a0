//! OAuth 2.0 types and structures
//!
//! Defines the configuration, token, and handshake records used across the
//! authorization flow. Token fields mirror the RFC 6749 token-endpoint
//! response; provider error payloads (`{"error": ...}`) deserialize into the
//! same type so every endpoint response can flow through `save_token`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Safety margin in seconds applied when deriving `expires_at` from the
/// provider-stated `expires_in`, covering clock skew and exchange latency.
pub const REFRESH_SLACK_SECS: i64 = 5;

/// Authorization session configuration
///
/// Supplied once at service construction and immutable for the session.
/// Endpoint overrides default to paths under `provider`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OAuth client ID
    pub client_id: String,

    /// Authorization server base URL (e.g., "https://ex.com/oauth2")
    pub provider: String,

    /// Override for `{provider}/authorize`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorize_endpoint: Option<String>,

    /// Override for `{provider}/token`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// Override for `{provider}/logout`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logout_endpoint: Option<String>,

    /// Redirect URI the provider sends the authorization response to
    pub redirect_uri: String,

    /// Scopes to request, joined space-delimited in the authorize request
    pub scopes: Vec<String>,

    /// Arm a proactive refresh timer whenever an unexpired token is held
    pub auto_refresh: bool,

    /// Storage-key prefix isolating coexisting auth instances on one origin
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl AuthConfig {
    /// Create a configuration with default endpoints, auto-refresh enabled,
    /// and no namespace.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        provider: impl Into<String>,
        redirect_uri: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            provider: provider.into(),
            authorize_endpoint: None,
            token_endpoint: None,
            logout_endpoint: None,
            redirect_uri: redirect_uri.into(),
            scopes,
            auto_refresh: true,
            namespace: None,
        }
    }

    /// Get the authorize endpoint (`authorize_endpoint` or
    /// `{provider}/authorize`)
    #[must_use]
    pub fn authorization_url(&self) -> String {
        self.authorize_endpoint.clone().unwrap_or_else(|| format!("{}/authorize", self.provider))
    }

    /// Get the token endpoint (`token_endpoint` or `{provider}/token`)
    #[must_use]
    pub fn token_url(&self) -> String {
        self.token_endpoint.clone().unwrap_or_else(|| format!("{}/token", self.provider))
    }

    /// Get the logout endpoint (`logout_endpoint` or `{provider}/logout`)
    #[must_use]
    pub fn logout_url(&self) -> String {
        self.logout_endpoint.clone().unwrap_or_else(|| format!("{}/logout", self.provider))
    }

    /// Get scopes as a space-separated string
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Storage-key prefix: `"{name}."` when a namespace is set, else `""`
    #[must_use]
    pub fn storage_prefix(&self) -> String {
        self.namespace.as_ref().map(|name| format!("{name}.")).unwrap_or_default()
    }
}

/// Ephemeral handshake state for one login attempt
///
/// Created by `login()`, consumed and deleted when the code exchange
/// completes (either way). During the in-flight-exchange sub-window the
/// stored record may carry only `is_pending`, so every verifier/state field
/// is optional at the deserialization boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeRecord {
    /// High-entropy random string, 43-128 chars base64url
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,

    /// base64url(SHA-256(code_verifier))
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    /// Anti-CSRF/anti-replay nonce echoed back by the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// True while a token request is in flight
    #[serde(default)]
    pub is_pending: bool,

    /// Creation time, epoch millis; drives the stuck-handshake watchdog
    #[serde(default)]
    pub created_at: i64,
}

/// OAuth 2.0 token material as returned by the token endpoint
///
/// All provider-supplied fields are optional: a provider error response
/// carries only `error` (and possibly `error_description`), and such a
/// payload is never treated as authenticated. `expires_at` is always derived
/// locally, never provider-supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    /// Access token for API authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Refresh token for obtaining new access tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// ID token (JWT) containing user claims (OpenID Connect)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Token type ("bearer")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Granted scopes (space-separated)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Access token lifetime in seconds, as stated by the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Derived absolute expiry, epoch millis =
    /// save time + (`expires_in` + `REFRESH_SLACK_SECS`) * 1000
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,

    /// Provider-reported error code; presence marks the token unusable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Human-readable provider error detail (RFC 6749 §5.2)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl AuthToken {
    /// Whether this token authenticates the session: it must carry an access
    /// token and no provider error.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.access_token.is_some() && self.error.is_none()
    }

    /// Whether the derived expiry has passed at `now_ms`.
    ///
    /// A token without `expires_at` is treated as expired; it never went
    /// through `save_token` and its lifetime is unknown.
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.map_or(true, |at| at <= now_ms)
    }

    /// Derive and attach `expires_at` from `expires_in` at the current time.
    pub fn derive_expiry(&mut self) {
        let now = Utc::now().timestamp_millis();
        self.expires_at = self.expires_in.map(|secs| now + (secs + REFRESH_SLACK_SECS) * 1000);
    }
}

/// Authoritative view of the session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// No token held and no handshake in flight
    Unauthenticated,
    /// A handshake record is mid-exchange
    HandshakePending,
    /// A usable token is held
    Authenticated,
    /// A terminal error was surfaced to consumers
    Error,
}

#[cfg(test)]
mod tests {
    //! Unit tests for types.
    use super::*;

    /// Validates `AuthConfig::new` behavior for the endpoint default scenario.
    ///
    /// Assertions:
    /// - Confirms `config.authorization_url()` equals `"https://ex.com/oauth2/authorize"`.
    /// - Confirms `config.token_url()` equals `"https://ex.com/oauth2/token"`.
    /// - Confirms `config.logout_url()` equals `"https://ex.com/oauth2/logout"`.
    /// - Confirms `config.scope_string()` equals `"openid profile"`.
    #[test]
    fn test_endpoint_defaults() {
        let config = AuthConfig::new(
            "c1",
            "https://ex.com/oauth2",
            "https://app/cb",
            vec!["openid".to_string(), "profile".to_string()],
        );

        assert_eq!(config.authorization_url(), "https://ex.com/oauth2/authorize");
        assert_eq!(config.token_url(), "https://ex.com/oauth2/token");
        assert_eq!(config.logout_url(), "https://ex.com/oauth2/logout");
        assert_eq!(config.scope_string(), "openid profile");
    }

    /// Validates `AuthConfig` behavior for the endpoint override scenario.
    ///
    /// Assertions:
    /// - Confirms `config.token_url()` equals the explicit override.
    /// - Confirms `config.authorization_url()` stays derived from `provider`.
    #[test]
    fn test_endpoint_overrides() {
        let mut config =
            AuthConfig::new("c1", "https://ex.com/oauth2", "https://app/cb", vec![]);
        config.token_endpoint = Some("https://tokens.ex.com/exchange".to_string());

        assert_eq!(config.token_url(), "https://tokens.ex.com/exchange");
        assert_eq!(config.authorization_url(), "https://ex.com/oauth2/authorize");
    }

    /// Validates `AuthConfig::storage_prefix` behavior for the namespace
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the prefix is empty without a namespace.
    /// - Confirms the prefix is `"tenant."` with namespace `"tenant"`.
    #[test]
    fn test_storage_prefix() {
        let mut config = AuthConfig::new("c1", "https://ex.com", "https://app/cb", vec![]);
        assert_eq!(config.storage_prefix(), "");

        config.namespace = Some("tenant".to_string());
        assert_eq!(config.storage_prefix(), "tenant.");
    }

    /// Validates `AuthToken::derive_expiry` behavior for the slack arithmetic
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures `expires_at` lands at now + (expires_in + 5) * 1000 within a
    ///   small clock-read tolerance.
    #[test]
    fn test_derive_expiry_applies_slack() {
        let mut token = AuthToken {
            access_token: Some("at".to_string()),
            refresh_token: None,
            id_token: None,
            token_type: Some("bearer".to_string()),
            scope: None,
            expires_in: Some(3600),
            expires_at: None,
            error: None,
            error_description: None,
        };

        let before = Utc::now().timestamp_millis();
        token.derive_expiry();
        let after = Utc::now().timestamp_millis();

        let expires_at = token.expires_at.unwrap();
        assert!(expires_at >= before + (3600 + REFRESH_SLACK_SECS) * 1000);
        assert!(expires_at <= after + (3600 + REFRESH_SLACK_SECS) * 1000);
    }

    /// Validates `AuthToken::is_usable` behavior for the error payload
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures a token carrying `error` is never usable.
    /// - Ensures a token without an access token is never usable.
    #[test]
    fn test_error_payload_is_never_usable() {
        let errored = AuthToken {
            access_token: Some("at".to_string()),
            refresh_token: None,
            id_token: None,
            token_type: None,
            scope: None,
            expires_in: None,
            expires_at: None,
            error: Some("invalid_grant".to_string()),
            error_description: None,
        };
        assert!(!errored.is_usable());

        let empty: AuthToken = serde_json::from_str("{}").unwrap();
        assert!(!empty.is_usable());
    }

    /// Validates `AuthToken::is_expired` behavior for the missing-expiry
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures a token without `expires_at` reports expired.
    /// - Ensures a future `expires_at` reports unexpired.
    #[test]
    fn test_is_expired() {
        let mut token: AuthToken = serde_json::from_str("{}").unwrap();
        let now = Utc::now().timestamp_millis();
        assert!(token.is_expired(now));

        token.expires_at = Some(now + 10_000);
        assert!(!token.is_expired(now));
        assert!(token.is_expired(now + 10_000));
    }

    /// Validates `AuthToken` deserialization for the provider error response
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms a bare `{error, error_description}` payload parses.
    /// - Confirms `error` is preserved and no access token is present.
    #[test]
    fn test_provider_error_payload_parses() {
        let token: AuthToken = serde_json::from_str(
            r#"{"error":"invalid_request","error_description":"missing code"}"#,
        )
        .unwrap();

        assert_eq!(token.error.as_deref(), Some("invalid_request"));
        assert_eq!(token.error_description.as_deref(), Some("missing code"));
        assert!(token.access_token.is_none());
    }

    /// Validates `HandshakeRecord` deserialization for the pending-only
    /// sub-window scenario.
    ///
    /// Assertions:
    /// - Confirms `{"is_pending":true}` parses with all other fields absent.
    #[test]
    fn test_partial_handshake_record_parses() {
        let record: HandshakeRecord = serde_json::from_str(r#"{"is_pending":true}"#).unwrap();

        assert!(record.is_pending);
        assert!(record.code_verifier.is_none());
        assert!(record.state.is_none());
        assert_eq!(record.created_at, 0);
    }
}

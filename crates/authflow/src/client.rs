//! Token endpoint client and provider URL construction
//!
//! Builds the authorize and logout redirect URLs with exact parameter
//! ordering, and performs the two form-encoded POST exchanges (authorization
//! code and refresh token) against the token endpoint.
//!
//! Provider-reported failures arrive inside the response JSON as an `error`
//! field, so exchange responses are parsed as [`AuthToken`] regardless of
//! HTTP status and the state machine decides what an errored payload means.

use reqwest::Client;
use tracing::debug;
use url::form_urlencoded;

use crate::types::{AuthConfig, AuthToken};

/// Error type for token endpoint operations
#[derive(Debug)]
pub enum TokenClientError {
    /// HTTP request failed (network/transport)
    RequestFailed(reqwest::Error),

    /// Failed to parse the response body
    ParseError(String),
}

impl std::fmt::Display for TokenClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestFailed(e) => write!(f, "HTTP request failed: {e}"),
            Self::ParseError(msg) => write!(f, "Parse error: {msg}"),
        }
    }
}

impl std::error::Error for TokenClientError {}

impl From<reqwest::Error> for TokenClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::RequestFailed(err)
    }
}

/// HTTP client for the provider's token endpoint
#[derive(Debug, Clone)]
pub struct TokenClient {
    config: AuthConfig,
    client: Client,
}

impl TokenClient {
    /// Create a client for `config` with a 30 second request timeout.
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { config, client }
    }

    /// Build the authorize redirect URL
    ///
    /// Query parameters appear in this exact order: `response_type=code`,
    /// `client_id`, `scope` (space-joined, `+`-encoded), `redirect_uri`,
    /// `state`, `code_challenge`, `code_challenge_method=S256`.
    #[must_use]
    pub fn authorize_url(&self, state: &str, code_challenge: &str) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("response_type", "code");
        query.append_pair("client_id", &self.config.client_id);
        query.append_pair("scope", &self.config.scope_string());
        query.append_pair("redirect_uri", &self.config.redirect_uri);
        query.append_pair("state", state);
        query.append_pair("code_challenge", code_challenge);
        query.append_pair("code_challenge_method", "S256");

        format!("{}?{}", self.config.authorization_url(), query.finish())
    }

    /// Build the provider logout redirect URL
    ///
    /// Parameters: `client_id`, `post_logout_redirect_uri`, and
    /// `id_token_hint` when an ID token is held.
    #[must_use]
    pub fn logout_url(&self, id_token_hint: Option<&str>) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("client_id", &self.config.client_id);
        query.append_pair("post_logout_redirect_uri", &self.config.redirect_uri);
        if let Some(hint) = id_token_hint {
            query.append_pair("id_token_hint", hint);
        }

        format!("{}?{}", self.config.logout_url(), query.finish())
    }

    /// Exchange an authorization code for tokens
    ///
    /// POSTs the form body `{client_id, code, code_verifier, grant_type:
    /// "authorization_code", redirect_uri}` to the token endpoint.
    ///
    /// # Errors
    /// Returns error on transport failure or an unparseable response body;
    /// provider errors come back inside the payload's `error` field.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<AuthToken, TokenClientError> {
        let body = vec![
            ("client_id", self.config.client_id.clone()),
            ("code", code.to_string()),
            ("code_verifier", code_verifier.to_string()),
            ("grant_type", "authorization_code".to_string()),
            ("redirect_uri", self.config.redirect_uri.clone()),
        ];

        debug!("exchanging authorization code for tokens");
        self.post_token(&body).await
    }

    /// Exchange a refresh token for a new token set
    ///
    /// POSTs the form body `{client_id, grant_type: "refresh_token",
    /// redirect_uri, refresh_token}` to the token endpoint.
    ///
    /// # Errors
    /// Returns error on transport failure or an unparseable response body.
    pub async fn exchange_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<AuthToken, TokenClientError> {
        let body = vec![
            ("client_id", self.config.client_id.clone()),
            ("grant_type", "refresh_token".to_string()),
            ("redirect_uri", self.config.redirect_uri.clone()),
            ("refresh_token", refresh_token.to_string()),
        ];

        debug!("exchanging refresh token for tokens");
        self.post_token(&body).await
    }

    async fn post_token(&self, body: &[(&str, String)]) -> Result<AuthToken, TokenClientError> {
        let response = self.client.post(self.config.token_url()).form(body).send().await?;

        response.json::<AuthToken>().await.map_err(|e| TokenClientError::ParseError(e.to_string()))
    }

    /// Get a reference to the session configuration
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for client.
    use super::*;
    use crate::pkce::challenge_for;

    fn create_test_config() -> AuthConfig {
        AuthConfig::new(
            "c1",
            "https://ex.com/oauth2",
            "https://app/cb",
            vec!["openid".to_string(), "profile".to_string()],
        )
    }

    /// Validates `TokenClient::authorize_url` behavior for the exact
    /// parameter ordering scenario.
    ///
    /// Assertions:
    /// - Confirms the URL starts with the provider authorize endpoint.
    /// - Confirms all seven parameters appear in the documented order.
    /// - Confirms the scope is `+`-joined and the redirect URI is
    ///   percent-encoded.
    #[test]
    fn test_authorize_url_ordering() {
        let client = TokenClient::new(create_test_config());

        let url = client.authorize_url("st4te", "ch4llenge");

        assert_eq!(
            url,
            "https://ex.com/oauth2/authorize?response_type=code&client_id=c1\
             &scope=openid+profile&redirect_uri=https%3A%2F%2Fapp%2Fcb\
             &state=st4te&code_challenge=ch4llenge&code_challenge_method=S256"
        );
    }

    /// Validates `TokenClient::authorize_url` behavior for the PKCE binding
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the URL carries the challenge computed from a verifier.
    #[test]
    fn test_authorize_url_carries_challenge() {
        let client = TokenClient::new(create_test_config());
        let challenge = challenge_for("v1");

        let url = client.authorize_url("s1", &challenge);
        assert!(url.contains(&format!("code_challenge={challenge}")));
    }

    /// Validates `TokenClient::logout_url` behavior for the id-token-hint
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `client_id`, `post_logout_redirect_uri`, and
    ///   `id_token_hint` appear when an ID token is held.
    /// - Confirms `id_token_hint` is omitted when no ID token is held.
    #[test]
    fn test_logout_url() {
        let client = TokenClient::new(create_test_config());

        let with_hint = client.logout_url(Some("idt1"));
        assert_eq!(
            with_hint,
            "https://ex.com/oauth2/logout?client_id=c1\
             &post_logout_redirect_uri=https%3A%2F%2Fapp%2Fcb&id_token_hint=idt1"
        );

        let without_hint = client.logout_url(None);
        assert!(!without_hint.contains("id_token_hint"));
    }

    /// Validates `TokenClient::authorize_url` behavior for the endpoint
    /// override scenario.
    ///
    /// Assertions:
    /// - Confirms an explicit `authorize_endpoint` replaces the derived one.
    #[test]
    fn test_authorize_endpoint_override() {
        let mut config = create_test_config();
        config.authorize_endpoint = Some("https://login.ex.com/oauth/authorize".to_string());
        let client = TokenClient::new(config);

        let url = client.authorize_url("s1", "c1");
        assert!(url.starts_with("https://login.ex.com/oauth/authorize?response_type=code"));
    }
}

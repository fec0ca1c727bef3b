//! OAuth2 authorization servers
//!
//! An [`OAuthProvider`] knows how to build the consent URL and how to talk to
//! the token endpoint. Everything stateful (states, verifiers, records) lives
//! in the flow controller.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::config::GoogleOAuthConfig;
use crate::error::Error;
use crate::Result;

use super::credentials::TokenGrant;

/// Google OAuth2 endpoints
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

pub const GOOGLE_PROVIDER: &str = "google";

/// Authorization server for one provider name
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Provider name as used in routes and tool arguments
    fn name(&self) -> &str;

    /// Consent screen URL carrying the state and S256 challenge
    fn authorization_url(&self, state: &str, code_challenge: &str, redirect_uri: &str) -> Result<String>;

    /// Exchange an authorization code for tokens
    async fn exchange_code(&self, code: &str, code_verifier: &str, redirect_uri: &str) -> Result<TokenGrant>;

    /// Obtain a fresh access token
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// Token refresh request
#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
    grant_type: &'a str,
}

/// Token exchange request
#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    code_verifier: &'a str,
    redirect_uri: &'a str,
    grant_type: &'a str,
}

/// Google authorization server, web application client
#[derive(Clone)]
pub struct GoogleOAuthProvider {
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    http_client: Client,
}

impl GoogleOAuthProvider {
    pub fn new(config: &GoogleOAuthConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scopes: config.scopes.clone(),
            http_client: Client::new(),
        }
    }

    async fn post_token<T: Serialize + ?Sized>(&self, form: &T, what: &str) -> Result<TokenGrant> {
        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Token {} request failed: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(token_error(what, status.as_u16(), &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Malformed token response: {}", e)))
    }
}

/// 400 and 401 from the token endpoint mean the grant itself is bad
/// (`invalid_grant`, revoked consent). Anything else may pass on retry.
fn token_error(what: &str, status: u16, body: &str) -> Error {
    let message = format!("Token {} failed ({}): {}", what, status, body);
    match status {
        400 | 401 => Error::GrantRejected(message),
        _ => Error::Upstream(message),
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuthProvider {
    fn name(&self) -> &str {
        GOOGLE_PROVIDER
    }

    fn authorization_url(&self, state: &str, code_challenge: &str, redirect_uri: &str) -> Result<String> {
        let mut url = Url::parse(GOOGLE_AUTH_URL)
            .map_err(|e| Error::Config(format!("Invalid auth URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("include_granted_scopes", "true")
            .append_pair("prompt", "consent");

        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str, redirect_uri: &str) -> Result<TokenGrant> {
        let request = TokenExchangeRequest {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            code,
            code_verifier,
            redirect_uri,
            grant_type: "authorization_code",
        };
        self.post_token(&request, "exchange").await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let request = RefreshRequest {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            refresh_token,
            grant_type: "refresh_token",
        };
        self.post_token(&request, "refresh").await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GoogleOAuthProvider {
        GoogleOAuthProvider::new(&GoogleOAuthConfig {
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec!["https://mail.google.com/".to_string()],
        })
    }

    #[test]
    fn test_authorization_url() {
        let url = provider()
            .authorization_url("state-abc", "challenge-xyz", "https://bot.example.com/auth/google/callback")
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let query: std::collections::HashMap<String, String> = parsed.query_pairs().into_owned().collect();

        assert_eq!(parsed.host_str(), Some("accounts.google.com"));
        assert_eq!(query["client_id"], "client-123");
        assert_eq!(query["state"], "state-abc");
        assert_eq!(query["code_challenge"], "challenge-xyz");
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["redirect_uri"], "https://bot.example.com/auth/google/callback");
        assert_eq!(query["scope"], "https://mail.google.com/");
        assert_eq!(query["access_type"], "offline");
        assert_eq!(query["include_granted_scopes"], "true");
        assert_eq!(query["prompt"], "consent");
    }

    #[test]
    fn test_token_error_kinds() {
        let body = r#"{"error": "invalid_grant"}"#;
        assert!(matches!(token_error("refresh", 400, body), Error::GrantRejected(_)));
        assert!(matches!(token_error("refresh", 401, body), Error::GrantRejected(_)));
        assert!(matches!(token_error("refresh", 429, ""), Error::Upstream(_)));
        assert!(matches!(token_error("refresh", 503, ""), Error::Upstream(_)));
    }

    #[test]
    fn test_name() {
        assert_eq!(provider().name(), GOOGLE_PROVIDER);
    }
}

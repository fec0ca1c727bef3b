//! Credential records kept per user and provider
//!
//! `OAuthToken` outlives requests (persisted by the token store); `OAuthState`
//! lives only between login initiation and the provider callback.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens within this window of expiry are treated as expired
const EXPIRY_BUFFER_MINUTES: i64 = 5;

/// OAuth2 credentials for one (user, provider) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub user_id: String,

    pub provider: String,

    /// The access token for API requests
    pub access_token: String,

    /// The refresh token for obtaining new access tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// When the access token expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Scopes granted, space separated as the provider returns them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    pub updated_at: DateTime<Utc>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthToken {
    /// Build a record from a provider grant issued now
    pub fn from_grant(user_id: &str, provider: &str, grant: TokenGrant) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            provider: provider.to_string(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_type: grant.token_type.unwrap_or_else(default_token_type),
            expires_at: grant.expires_in.map(|secs| now + Duration::seconds(secs)),
            scope: grant.scope,
            updated_at: now,
        }
    }

    /// Check if the access token is expired or about to expire
    ///
    /// Returns true if the token expires within the next 5 minutes
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => Utc::now() + Duration::minutes(EXPIRY_BUFFER_MINUTES) >= expires,
            None => false,
        }
    }

    /// Check if we have a refresh token
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Usable now or recoverable without user interaction
    pub fn is_usable(&self) -> bool {
        !self.is_expired() || self.can_refresh()
    }
}

/// Token endpoint response, independent of the provider
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Pending authorization, keyed by its opaque state token
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthState {
    pub state: String,
    pub user_id: String,
    pub provider: String,
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
}

impl OAuthState {
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.created_at + ttl < now
    }
}

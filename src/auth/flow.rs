//! OAuth flow controller
//!
//! Per (user, provider) the credential moves through
//! `Unauthenticated -> Pending -> Authenticated`. `Pending` is an entry in the
//! state table; `Authenticated` is a token record. Logout, state expiry and a
//! mismatched callback all lead back to `Unauthenticated`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::error::Error;
use crate::tools::display_name;
use crate::Result;

use super::credentials::{OAuthState, OAuthToken};
use super::pkce::{generate_state, PkcePair};
use super::provider::{GoogleOAuthProvider, OAuthProvider};
use super::store::TokenStore;

/// Result of a successful callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub user_id: String,
    pub provider: String,
}

impl LoginOutcome {
    pub fn message(&self) -> String {
        format!(
            "{} authorization complete. You can close this window.",
            display_name(&self.provider)
        )
    }
}

pub struct OAuthFlowController {
    store: Arc<dyn TokenStore>,
    providers: HashMap<String, Arc<dyn OAuthProvider>>,
    public_base_url: String,
    state_ttl: Duration,
}

impl OAuthFlowController {
    pub fn new(store: Arc<dyn TokenStore>, public_base_url: &str, state_ttl_secs: i64) -> Self {
        Self {
            store,
            providers: HashMap::new(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            state_ttl: Duration::seconds(state_ttl_secs),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Controller with every provider that has a configured client
    pub fn from_config(config: &Config, store: Arc<dyn TokenStore>) -> Self {
        let mut flow = Self::new(store, &config.public_base_url, config.oauth.state_ttl_secs);
        if let Some(google) = &config.oauth.google {
            flow = flow.with_provider(Arc::new(GoogleOAuthProvider::new(google)));
        }
        flow
    }

    pub fn supports(&self, provider: &str) -> bool {
        self.providers.contains_key(provider)
    }

    /// Configured provider names, sorted
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    fn provider(&self, name: &str) -> Result<&Arc<dyn OAuthProvider>> {
        self.providers
            .get(name)
            .ok_or_else(|| Error::UnsupportedProvider(name.to_string()))
    }

    fn require_user(user_id: &str) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(Error::BadRequest("user_id is required.".to_string()));
        }
        Ok(())
    }

    pub fn redirect_uri(&self, provider: &str) -> String {
        format!("{}/auth/{}/callback", self.public_base_url, provider)
    }

    /// Start a login: persist a fresh state with its PKCE verifier and return
    /// the provider's consent URL.
    pub fn begin_login(&self, user_id: &str, provider: &str) -> Result<String> {
        let oauth = self.provider(provider)?;
        Self::require_user(user_id)?;

        let pruned = self.store.prune_states(Utc::now() - self.state_ttl)?;
        if pruned > 0 {
            debug!("Pruned {} expired OAuth state(s)", pruned);
        }

        let pkce = PkcePair::new();
        let state = OAuthState {
            state: generate_state(),
            user_id: user_id.to_string(),
            provider: provider.to_string(),
            code_verifier: pkce.verifier,
            created_at: Utc::now(),
        };
        self.store.put_state(&state)?;

        info!("Login started for user {} with {}", user_id, provider);
        oauth.authorization_url(&state.state, &pkce.challenge, &self.redirect_uri(provider))
    }

    /// Handle the provider callback. The state is consumed whatever the outcome.
    pub async fn complete_login(&self, provider: &str, state: &str, code: &str) -> Result<LoginOutcome> {
        let oauth = self.provider(provider)?;

        let now = Utc::now();
        let pruned = self.store.prune_states(now - self.state_ttl)?;
        if pruned > 0 {
            debug!("Pruned {} expired OAuth state(s)", pruned);
        }

        let pending = match self.store.take_state(state)? {
            Some(pending) if pending.provider == provider && !pending.is_expired(self.state_ttl, now) => pending,
            Some(_) => {
                warn!("OAuth callback state was issued for another provider or expired");
                return Err(Error::InvalidOAuthState);
            }
            None => {
                warn!("OAuth callback with unknown state");
                return Err(Error::InvalidOAuthState);
            }
        };

        let grant = oauth
            .exchange_code(code, &pending.code_verifier, &self.redirect_uri(provider))
            .await?;

        let mut token = OAuthToken::from_grant(&pending.user_id, provider, grant);
        if !token.can_refresh() {
            // Providers omit the refresh token when consent was already granted
            token.refresh_token = self
                .store
                .get_token(&pending.user_id, provider)?
                .and_then(|previous| previous.refresh_token);
        }
        self.store.put_token(&token)?;

        info!("Login completed for user {} with {}", pending.user_id, provider);
        Ok(LoginOutcome {
            user_id: pending.user_id,
            provider: provider.to_string(),
        })
    }

    /// Consume a state after the provider reported an error (e.g. access denied).
    pub fn fail_login(&self, state: &str) -> Result<()> {
        if self.store.take_state(state)?.is_some() {
            info!("Login abandoned at the provider");
        }
        Ok(())
    }

    /// Delete the user's credentials. Returns whether any existed.
    pub fn logout(&self, user_id: &str, provider: &str) -> Result<bool> {
        self.provider(provider)?;
        Self::require_user(user_id)?;
        let removed = self.store.delete_token(user_id, provider)?;
        info!("Logout for user {} with {} (had credentials: {})", user_id, provider, removed);
        Ok(removed)
    }

    pub fn status(&self, user_id: &str, provider: &str) -> Result<bool> {
        self.provider(provider)?;
        Self::require_user(user_id)?;
        Ok(self
            .store
            .get_token(user_id, provider)?
            .is_some_and(|token| token.is_usable()))
    }

    /// A valid access token for the user, refreshing it if needed.
    ///
    /// `None` means the user has to sign in (again). A refresh the provider
    /// rejects removes the record; an unreachable provider is an `Err` and
    /// leaves it in place.
    pub async fn access_token(&self, user_id: &str, provider: &str) -> Result<Option<String>> {
        let oauth = self.provider(provider)?;
        Self::require_user(user_id)?;

        let Some(token) = self.store.get_token(user_id, provider)? else {
            return Ok(None);
        };
        if !token.is_expired() {
            return Ok(Some(token.access_token));
        }
        let Some(refresh_token) = token.refresh_token.clone().filter(|t| !t.is_empty()) else {
            debug!("Access token expired without refresh token for user {}", user_id);
            return Ok(None);
        };

        info!("Access token expired for user {}, refreshing", user_id);
        match oauth.refresh(&refresh_token).await {
            Ok(grant) => {
                let mut refreshed = OAuthToken::from_grant(user_id, provider, grant);
                if !refreshed.can_refresh() {
                    refreshed.refresh_token = Some(refresh_token);
                }
                if refreshed.scope.is_none() {
                    refreshed.scope = token.scope;
                }
                self.store.put_token(&refreshed)?;
                Ok(Some(refreshed.access_token))
            }
            Err(Error::GrantRejected(reason)) => {
                warn!("Refresh token rejected for user {}: {}", user_id, reason);
                self.store.delete_token(user_id, provider)?;
                Ok(None)
            }
            Err(e) => {
                // The record stays; a later call can still refresh it.
                warn!("Token refresh unavailable for user {}: {}", user_id, e);
                Err(e)
            }
        }
    }

    /// Link that starts a login through our HTTP surface
    pub fn login_link(&self, user_id: &str, provider: &str) -> Result<String> {
        self.auth_link(user_id, provider, "login")
    }

    pub fn logout_link(&self, user_id: &str, provider: &str) -> Result<String> {
        self.auth_link(user_id, provider, "logout")
    }

    fn auth_link(&self, user_id: &str, provider: &str, action: &str) -> Result<String> {
        let mut url = Url::parse(&format!("{}/auth/{}/{}", self.public_base_url, provider, action))
            .map_err(|e| Error::Config(format!("Invalid public_base_url: {}", e)))?;
        url.query_pairs_mut().append_pair("user_id", user_id);
        Ok(url.to_string())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::auth::provider::fake::FakeOAuthProvider;
    use crate::auth::store::InMemoryTokenStore;

    pub const BASE_URL: &str = "https://courier.example.com";

    /// Controller over an in-memory store with a fake "google" provider
    pub fn fake_flow() -> (Arc<OAuthFlowController>, Arc<FakeOAuthProvider>, Arc<InMemoryTokenStore>) {
        let store = Arc::new(InMemoryTokenStore::new());
        let provider = Arc::new(FakeOAuthProvider::new("google"));
        let flow = OAuthFlowController::new(store.clone(), BASE_URL, 600).with_provider(provider.clone());
        (Arc::new(flow), provider, store)
    }

    pub fn state_from_url(url: &str) -> String {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    /// Run a full login for `user_id` and return the issued access token
    pub async fn sign_in(flow: &OAuthFlowController, user_id: &str) -> String {
        let url = flow.begin_login(user_id, "google").unwrap();
        flow.complete_login("google", &state_from_url(&url), "code-1").await.unwrap();
        flow.access_token(user_id, "google").await.unwrap().unwrap()
    }
}

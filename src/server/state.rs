use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::agent::{EventRouter, ProviderRegistry, ToolLoop};
use crate::auth::{OAuthFlowController, SqliteTokenStore};
use crate::config::Config;
use crate::mail::GmailClient;
use crate::tools::{default_registry, mail::MailAccess};
use crate::Result;

/// Shared by every handler and every channel listener
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<EventRouter>,
    pub flow: Arc<OAuthFlowController>,
}

impl AppState {
    pub fn new(router: Arc<EventRouter>) -> Self {
        let flow = router.flow().clone();
        Self { router, flow }
    }

    /// Wire the whole service from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(SqliteTokenStore::open(&config.oauth.db_path)?);
        let flow = Arc::new(OAuthFlowController::from_config(config, store));
        info!("Auth providers: {:?}", flow.providers());

        let mail = if flow.supports(&config.mail.provider) {
            Some(Arc::new(MailAccess::new(
                flow.clone(),
                Arc::new(GmailClient::new()),
                &config.mail.provider,
                config.mail.default_max_results,
            )))
        } else {
            warn!(
                "Mail provider '{}' has no OAuth client configured; mail tools disabled",
                config.mail.provider
            );
            None
        };

        let registry = default_registry(flow.clone(), mail)?;
        let client = ProviderRegistry::create(config)?;
        let tool_loop = ToolLoop::new(client, Arc::new(registry), config.max_iterations).with_timeouts(
            Duration::from_secs(config.model_timeout_secs),
            Duration::from_secs(config.tool_timeout_secs),
        );

        let router = EventRouter::new(tool_loop, flow.clone(), config.history_max_turns)
            .with_system_prompt(config.system_prompt.clone());

        Ok(Self {
            router: Arc::new(router),
            flow,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GoogleOAuthConfig;

    #[test]
    fn test_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            public_base_url: "https://courier.example.com".to_string(),
            anthropic_api_key: "key".to_string(),
            ..Default::default()
        };
        config.oauth.db_path = dir.path().join("auth.db");
        config.oauth.google = Some(GoogleOAuthConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec!["https://mail.google.com/".to_string()],
        });

        let state = AppState::from_config(&config).unwrap();
        assert!(state.flow.supports("google"));
        assert!(state.router.tool_loop().registry().has("list_emails"));
        assert!(dir.path().join("auth.db").exists());
    }

    #[test]
    fn test_mail_tools_need_provider() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            public_base_url: "https://courier.example.com".to_string(),
            anthropic_api_key: "key".to_string(),
            ..Default::default()
        };
        config.oauth.db_path = dir.path().join("auth.db");

        let state = AppState::from_config(&config).unwrap();
        let registry = state.router.tool_loop().registry();
        assert!(!registry.has("list_emails"));
        assert!(registry.has("check_status"));
    }
}

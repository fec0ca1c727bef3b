//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::Result;
use crate::error::Error;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP surface binds to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Externally reachable base URL, used for OAuth redirects and auth links
    #[serde(default)]
    pub public_base_url: String,

    /// LLM provider to use ("anthropic" or "gemini")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model to use; empty means the provider's default
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub anthropic_api_key: String,

    #[serde(default)]
    pub gemini_api_key: String,

    /// Completion budget per model call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Maximum model round-trips per inbound message
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Turns kept per user before the oldest are evicted
    #[serde(default = "default_history_max_turns")]
    pub history_max_turns: usize,

    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Optional system prompt sent with every model call
    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub oauth: OAuthConfig,

    #[serde(default)]
    pub mail: MailConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// OAuth flow and token store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Lifetime of a pending login before its state token is rejected
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: i64,

    /// SQLite database holding tokens and pending states
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub google: Option<GoogleOAuthConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleOAuthConfig {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default = "default_google_scopes")]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Auth provider whose credentials the mail tools use
    #[serde(default = "default_mail_provider")]
    pub provider: String,

    #[serde(default = "default_mail_max_results")]
    pub default_max_results: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub allow_from: Vec<String>,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_max_iterations() -> usize {
    8
}

fn default_history_max_turns() -> usize {
    20
}

fn default_model_timeout_secs() -> u64 {
    60
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_state_ttl_secs() -> i64 {
    600
}

fn default_db_path() -> PathBuf {
    config_dir().join("auth.db")
}

fn default_google_scopes() -> Vec<String> {
    vec!["https://mail.google.com/".to_string()]
}

fn default_mail_provider() -> String {
    "google".to_string()
}

fn default_mail_max_results() -> u32 {
    5
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            state_ttl_secs: default_state_ttl_secs(),
            db_path: default_db_path(),
            google: None,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            provider: default_mail_provider(),
            default_max_results: default_mail_max_results(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_base_url: String::new(),
            provider: default_provider(),
            model: String::new(),
            anthropic_api_key: String::new(),
            gemini_api_key: String::new(),
            max_tokens: default_max_tokens(),
            max_iterations: default_max_iterations(),
            history_max_turns: default_history_max_turns(),
            model_timeout_secs: default_model_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            system_prompt: None,
            oauth: OAuthConfig::default(),
            mail: MailConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

impl Config {
    /// Names of the auth providers with a configured OAuth client.
    pub fn auth_providers(&self) -> Vec<String> {
        let mut providers = Vec::new();
        if self.oauth.google.is_some() {
            providers.push("google".to_string());
        }
        providers
    }

    /// Overlay secrets from the environment on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = v;
        }
        if let Some(v) = non_empty("GEMINI_API_KEY") {
            self.gemini_api_key = v;
        }
        if let Some(v) = non_empty("COURIER_PUBLIC_BASE_URL") {
            self.public_base_url = v;
        }
        if let Some(v) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.telegram.token = v;
        }

        let client_id = non_empty("GOOGLE_OAUTH_CLIENT_ID");
        let client_secret = non_empty("GOOGLE_OAUTH_CLIENT_SECRET");
        if client_id.is_some() || client_secret.is_some() {
            let google = self.oauth.google.get_or_insert_with(|| GoogleOAuthConfig {
                scopes: default_google_scopes(),
                ..Default::default()
            });
            if let Some(v) = client_id {
                google.client_id = v;
            }
            if let Some(v) = client_secret {
                google.client_secret = v;
            }
        }
    }

    /// Check that every credential needed to serve traffic is present.
    pub fn validate(&self) -> Result<()> {
        match self.provider.as_str() {
            "anthropic" if self.anthropic_api_key.is_empty() => {
                return Err(Error::Config("anthropic_api_key is required".to_string()));
            }
            "gemini" if self.gemini_api_key.is_empty() => {
                return Err(Error::Config("gemini_api_key is required".to_string()));
            }
            "anthropic" | "gemini" => {}
            other => return Err(Error::Config(format!("Unknown provider: {other}"))),
        }

        if self.public_base_url.trim().is_empty() {
            return Err(Error::Config("public_base_url is required".to_string()));
        }
        url::Url::parse(&self.public_base_url)
            .map_err(|e| Error::Config(format!("Invalid public_base_url: {e}")))?;

        if let Some(google) = &self.oauth.google {
            if google.client_id.is_empty() || google.client_secret.is_empty() {
                return Err(Error::Config("Google OAuth client is not configured".to_string()));
            }
            if google.scopes.is_empty() {
                return Err(Error::Config("Google OAuth scopes are empty".to_string()));
            }
        }

        if self.max_iterations == 0 {
            return Err(Error::Config("max_iterations must be at least 1".to_string()));
        }
        if self.history_max_turns == 0 {
            return Err(Error::Config("history_max_turns must be at least 1".to_string()));
        }

        if self.telegram.enabled && self.telegram.token.is_empty() {
            return Err(Error::Config("telegram.token is required when telegram is enabled".to_string()));
        }

        Ok(())
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".courier")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from the default location, with environment overrides
pub fn load() -> Result<Config> {
    let mut config = load_from(&config_path())?;
    config.apply_env_overrides();
    Ok(config)
}

/// Load configuration from a file
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Config not found at {:?}. Run 'courier init' first.",
            path
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Write a default configuration file unless one already exists.
///
/// Returns the path of the config file.
pub fn init() -> Result<PathBuf> {
    let path = config_path();
    if path.exists() {
        return Ok(path);
    }

    let config = Config {
        oauth: OAuthConfig {
            google: Some(GoogleOAuthConfig {
                scopes: default_google_scopes(),
                ..Default::default()
            }),
            ..Default::default()
        },
        ..Default::default()
    };
    save_to(&config, &path)?;
    Ok(path)
}

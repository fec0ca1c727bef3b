//! LLM client abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait for swappable LLM providers
//! - [`ProviderRegistry`] for creating the configured provider once at startup
//! - Concrete implementations: Anthropic Messages API, Gemini API
//!
//! # Adding a New Provider
//!
//! 1. Create a new file (e.g., `openai.rs`)
//! 2. Implement `LlmClient` trait
//! 3. Add to `ProviderRegistry::create()`
//! 4. Add config fields in `config.rs`

mod types;

pub mod anthropic;
pub mod gemini;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;

use super::message::ConversationTurn;

/// LLM client trait - swappable provider abstraction.
///
/// Given the conversation so far, produce the next assistant turn. The turn
/// may contain `tool_use` blocks when tools are offered.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(
        &self,
        turns: &[ConversationTurn],
        system: Option<&str>,
        tools: &[ToolDefinition],
    ) -> Result<ConversationTurn>;

    /// Model identifier used for requests.
    fn model(&self) -> &str;
}

/// Provider registry - creates LLM clients from configuration.
///
/// # Example
///
/// ```ignore
/// let client = ProviderRegistry::create(&config)?;
/// let turn = client.generate(&turns, None, &tools).await?;
/// ```
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Create an LLM client from configuration.
    ///
    /// Supported providers:
    /// - `"anthropic"`: Claude via the Messages API
    /// - `"gemini"`: Gemini API with API key authentication
    pub fn create(config: &Config) -> Result<Arc<dyn LlmClient>> {
        let model = if config.model.is_empty() {
            None
        } else {
            Some(config.model.as_str())
        };

        match config.provider.as_str() {
            "anthropic" => {
                if config.anthropic_api_key.is_empty() {
                    return Err(Error::Config("anthropic_api_key is required".to_string()));
                }
                let client = AnthropicClient::new(
                    &config.anthropic_api_key,
                    model.unwrap_or(anthropic::DEFAULT_MODEL),
                    config.max_tokens,
                );
                Ok(Arc::new(client))
            }
            "gemini" => {
                if config.gemini_api_key.is_empty() {
                    return Err(Error::Config("gemini_api_key is required".to_string()));
                }
                let client = GeminiClient::new(
                    &config.gemini_api_key,
                    model.unwrap_or(gemini::DEFAULT_MODEL),
                    config.max_tokens,
                );
                Ok(Arc::new(client))
            }
            other => Err(Error::Config(format!("Unknown provider: {other}"))),
        }
    }

    /// List available provider names.
    pub fn available() -> &'static [&'static str] {
        &["anthropic", "gemini"]
    }
}

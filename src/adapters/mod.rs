//! Adapters module - chat platform integrations.
//!
//! Each adapter turns platform messages into [`IncomingMessage`] events for the
//! [`EventRouter`] and relays the [`Reply`] back, chunked to the platform's
//! message limit. The HTTP endpoint in [`crate::server`] is the generic
//! gateway; the adapters here connect directly.
//!
//! # Supported Channels
//!
//! - **CLI** - Interactive command line interface
//! - **Telegram** - Telegram Bot API via teloxide
//!
//! [`IncomingMessage`]: crate::agent::IncomingMessage
//! [`EventRouter`]: crate::agent::EventRouter
//! [`Reply`]: crate::agent::Reply

pub mod cli;
pub mod telegram;

use crate::config::Config;

/// Channel trait for chat adapters.
pub trait Channel: Send + Sync {
    /// Channel name, also used as the `provider` of its events.
    fn name(&self) -> &str;

    /// Listen for messages until the channel shuts down.
    fn start(&self) -> impl std::future::Future<Output = crate::Result<()>> + Send;
}

/// Channel registry - metadata about available channels.
pub struct ChannelRegistry;

impl ChannelRegistry {
    /// List all available channel names.
    pub fn available() -> &'static [&'static str] {
        &["cli", "telegram"]
    }

    /// Check if a channel is enabled in the config.
    pub fn is_enabled(name: &str, config: &Config) -> bool {
        match name {
            "cli" => true,
            "telegram" => config.telegram.enabled,
            _ => false,
        }
    }

    pub fn description(name: &str) -> &'static str {
        match name {
            "cli" => "Interactive command line interface",
            "telegram" => "Telegram Bot API",
            _ => "Unknown channel",
        }
    }
}

/// Split a reply into chunks of at most `max_len` characters.
///
/// Prefers to break at the last newline, then the last space, inside each
/// window; a window with neither is cut hard.
pub fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut rest = text.trim();

    while !rest.is_empty() {
        let Some((limit, _)) = rest.char_indices().nth(max_len) else {
            chunks.push(rest.to_string());
            break;
        };

        let window = &rest[..limit];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(limit);

        chunks.push(window[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }

    chunks
}

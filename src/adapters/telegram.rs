//! Telegram adapter using teloxide

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{ChatAction, InlineKeyboardButton, InlineKeyboardMarkup, User};
use tracing::{debug, error, info, warn};
use url::Url;

use super::{chunk_text, Channel};
use crate::agent::{EventRouter, IncomingMessage, Reply};
use crate::config::TelegramConfig;
use crate::tools::display_name;
use crate::Result;

/// Telegram's limit for one message
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

/// Telegram channel adapter
#[derive(Clone)]
pub struct TelegramChannel {
    bot: Bot,
    allow_from: Vec<String>,
    router: Arc<EventRouter>,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig, router: Arc<EventRouter>) -> Self {
        Self {
            bot: Bot::new(&config.token),
            allow_from: config.allow_from.clone(),
            router,
        }
    }

    async fn handle_message(&self, message: Message) -> Result<()> {
        let chat_id = message.chat.id;
        let user = message.from();

        if !is_allowed(&self.allow_from, user) {
            debug!("Ignoring message from unauthorized user: {:?}", user.map(|u| u.id));
            return Ok(());
        }
        let (Some(user), Some(text)) = (user, message.text()) else {
            return Ok(());
        };

        let _ = self.bot.send_chat_action(chat_id, ChatAction::Typing).await;

        let mut event = IncomingMessage::new("telegram", &chat_id.to_string(), &user.id.to_string(), text);
        event.message_id = Some(message.id.0.to_string());
        event.timestamp = Some(message.date.to_rfc3339());

        let reply = match self.router.handle(event).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Failed to handle telegram message: {}", e);
                Reply::text("Sorry, something went wrong. Please try again.")
            }
        };
        self.send_reply(chat_id, &reply).await
    }

    /// Send the reply in chunks; the auth button rides on the last one
    async fn send_reply(&self, chat_id: ChatId, reply: &Reply) -> Result<()> {
        let chunks = chunk_text(&reply.reply, TELEGRAM_MAX_MESSAGE_LEN);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.into_iter().enumerate() {
            let keyboard = if i == last { auth_keyboard(reply) } else { None };
            match keyboard {
                Some(keyboard) => self.bot.send_message(chat_id, chunk).reply_markup(keyboard).await?,
                None => self.bot.send_message(chat_id, chunk).await?,
            };
        }
        Ok(())
    }
}

/// An empty allow list admits everyone
fn is_allowed(allow_from: &[String], user: Option<&User>) -> bool {
    if allow_from.is_empty() {
        return true;
    }
    let Some(user) = user else { return false };
    let username = user.username.as_deref().unwrap_or("");
    let id = user.id.to_string();

    allow_from.iter().any(|allowed| allowed == username || allowed == &id)
}

/// Button for the sign-in or sign-out link carried by a reply
fn auth_keyboard(reply: &Reply) -> Option<InlineKeyboardMarkup> {
    let provider = display_name(reply.provider.as_deref().unwrap_or_default());
    let (label, link) = match (&reply.login_url, &reply.logout_url) {
        (Some(link), _) => (format!("Sign in to {}", provider), link),
        (None, Some(link)) => (format!("Sign out of {}", provider), link),
        (None, None) => return None,
    };

    match Url::parse(link) {
        Ok(url) => Some(InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url(label, url)]])),
        Err(e) => {
            warn!("Not attaching invalid auth link {}: {}", link, e);
            None
        }
    }
}

impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn start(&self) -> impl std::future::Future<Output = Result<()>> + Send {
        let channel = Arc::new(self.clone());

        async move {
            info!("Starting Telegram bot...");
            let handler = Update::filter_message().endpoint(|msg: Message, channel: Arc<TelegramChannel>| async move {
                if let Err(e) = channel.handle_message(msg).await {
                    error!("Error handling telegram message: {}", e);
                }
                respond(())
            });

            Dispatcher::builder(channel.bot.clone(), handler)
                .dependencies(dptree::deps![channel])
                .enable_ctrlc_handler()
                .build()
                .dispatch()
                .await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::{InlineKeyboardButtonKind, UserId};

    fn user(id: u64, username: Option<&str>) -> User {
        User {
            id: UserId(id),
            is_bot: false,
            first_name: "Ada".to_string(),
            last_name: None,
            username: username.map(str::to_string),
            language_code: None,
            is_premium: false,
            added_to_attachment_menu: false,
        }
    }

    #[test]
    fn test_allow_list() {
        let ada = user(42, Some("ada"));
        assert!(is_allowed(&[], Some(&ada)));
        assert!(is_allowed(&["ada".to_string()], Some(&ada)));
        assert!(is_allowed(&["42".to_string()], Some(&ada)));
        assert!(!is_allowed(&["bob".to_string()], Some(&ada)));
        assert!(!is_allowed(&["ada".to_string()], None));
    }

    #[test]
    fn test_login_button() {
        let reply = Reply {
            login_url: Some("https://courier.example.com/auth/google/login?user_id=42".to_string()),
            provider: Some("google".to_string()),
            ..Reply::text("Please sign in.")
        };
        let keyboard = auth_keyboard(&reply).unwrap();
        let button = &keyboard.inline_keyboard[0][0];
        assert_eq!(button.text, "Sign in to Google");
        assert!(matches!(&button.kind, InlineKeyboardButtonKind::Url(url) if url.path() == "/auth/google/login"));
    }

    #[test]
    fn test_no_button_without_link() {
        assert!(auth_keyboard(&Reply::text("hi")).is_none());

        let reply = Reply {
            logout_url: Some("not a url".to_string()),
            ..Reply::text("bye")
        };
        assert!(auth_keyboard(&reply).is_none());
    }
}

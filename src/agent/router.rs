//! Event router - the entry point for every inbound chat message

use std::sync::Arc;

use tracing::{error, info};

use crate::auth::OAuthFlowController;
use crate::error::Error;
use crate::tools::{AuthAction, AuthSignal, ToolContext};
use crate::Result;

use super::history::SessionStore;
use super::loop_impl::{Completion, ToolLoop};
use super::message::{ConversationTurn, IncomingMessage, Reply};

const EMPTY_MESSAGE_REPLY: &str = "I didn't catch that. Please send a message with some text.";
const EMPTY_ANSWER_REPLY: &str = "Sorry, I don't have an answer for that.";

/// Routes a message through the tool loop and packages the reply
pub struct EventRouter {
    sessions: SessionStore,
    tool_loop: ToolLoop,
    flow: Arc<OAuthFlowController>,
    system_prompt: Option<String>,
}

impl EventRouter {
    pub fn new(tool_loop: ToolLoop, flow: Arc<OAuthFlowController>, history_max_turns: usize) -> Self {
        Self {
            sessions: SessionStore::new(history_max_turns),
            tool_loop,
            flow,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn flow(&self) -> &Arc<OAuthFlowController> {
        &self.flow
    }

    pub fn tool_loop(&self) -> &ToolLoop {
        &self.tool_loop
    }

    /// Handle one inbound message.
    ///
    /// Model and tool failures become an apologetic reply and leave the
    /// user's history untouched. Only invalid input and internal faults
    /// are returned as `Err`.
    pub async fn handle(&self, event: IncomingMessage) -> Result<Reply> {
        if event.user_id.trim().is_empty() {
            return Err(Error::BadRequest("user_id is required.".to_string()));
        }
        if event.content.trim().is_empty() {
            return Ok(Reply::text(EMPTY_MESSAGE_REPLY));
        }

        info!(
            "Message from {} user {} in channel {}",
            event.provider, event.user_id, event.channel_id
        );

        let session = self.sessions.session(&event.user_id).await;
        let mut history = session.lock().await;

        let ctx = ToolContext::new(event.user_id.clone());
        let result = self
            .tool_loop
            .run(
                &history.replay(),
                ConversationTurn::user(event.content),
                self.system_prompt.as_deref(),
                &ctx,
            )
            .await;

        let completion = match result {
            Ok(completion) => completion,
            Err(e) => {
                error!("Failed to answer user {}: {}", event.user_id, e);
                return Ok(Reply::text(failure_text(&e)));
            }
        };

        let reply = self.package(&event.user_id, &completion)?;
        history.extend(completion.turns);
        Ok(reply)
    }

    fn package(&self, user_id: &str, completion: &Completion) -> Result<Reply> {
        let mut reply = Reply::text(completion.text.trim());

        if let Some(AuthSignal { action, provider, message }) = &completion.auth {
            let link = match action {
                AuthAction::Login => self.flow.login_link(user_id, provider)?,
                AuthAction::Logout => self.flow.logout_link(user_id, provider)?,
            };
            match action {
                AuthAction::Login => reply.login_url = Some(link),
                AuthAction::Logout => reply.logout_url = Some(link),
            }
            reply.provider = Some(provider.clone());

            if reply.reply.is_empty() {
                if let Some(message) = message {
                    reply.reply = message.clone();
                }
            }
        }

        if reply.reply.is_empty() {
            reply.reply = EMPTY_ANSWER_REPLY.to_string();
        }
        Ok(reply)
    }
}

/// What the user sees when the loop fails
fn failure_text(err: &Error) -> &'static str {
    match err {
        Error::IterationLimitExceeded => "Sorry, I couldn't complete that request. Please try asking in a simpler way.",
        Error::Timeout(_) => "Sorry, that took too long. Please try again in a moment.",
        _ => "Sorry, I'm having trouble reaching the assistant right now. Please try again later.",
    }
}

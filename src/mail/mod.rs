//! Mail access on behalf of a signed-in user
//!
//! Every call takes the user's OAuth access token; the client itself holds no
//! per-user state.

pub mod gmail;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use gmail::GmailClient;

/// A mail message, headers plus an optional plain-text body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    pub date: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Failures reported by a mail backend
#[derive(Error, Debug)]
pub enum MailError {
    /// Non-success HTTP status from the mail API
    #[error("Mail API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Mail transport error: {0}")]
    Transport(String),
}

impl MailError {
    pub fn status(&self) -> Option<u16> {
        match self {
            MailError::Status { status, .. } => Some(*status),
            MailError::Transport(_) => None,
        }
    }
}

impl From<reqwest::Error> for MailError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => MailError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => MailError::Transport(err.to_string()),
        }
    }
}

pub type MailResult<T> = std::result::Result<T, MailError>;

/// Mail backend
#[async_trait]
pub trait MailClient: Send + Sync {
    /// Most recent messages, newest first, headers only
    async fn list_messages(&self, access_token: &str, max_results: u32) -> MailResult<Vec<MailMessage>>;

    /// One message with its body
    async fn get_message(&self, access_token: &str, message_id: &str) -> MailResult<MailMessage>;

    /// Move a message out of the inbox (Gmail: to trash)
    async fn delete_message(&self, access_token: &str, message_id: &str) -> MailResult<()>;

    async fn mark_read(&self, access_token: &str, message_id: &str) -> MailResult<()>;
}

/// In-memory mailbox for testing
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    pub struct FakeMailClient {
        pub messages: Mutex<Vec<MailMessage>>,
        pub unread: Mutex<Vec<String>>,
        /// Access tokens seen, in call order
        pub tokens: Mutex<Vec<String>>,
        /// When set, every call fails with this HTTP status
        pub fail_status: Mutex<Option<u16>>,
    }

    impl FakeMailClient {
        pub fn new(messages: Vec<MailMessage>) -> Self {
            let unread = messages.iter().map(|m| m.id.clone()).collect();
            Self {
                messages: Mutex::new(messages),
                unread: Mutex::new(unread),
                tokens: Mutex::new(Vec::new()),
                fail_status: Mutex::new(None),
            }
        }

        /// Two messages, ids "m1" and "m2"
        pub fn with_inbox() -> Self {
            Self::new(vec![message("m1", "Quarterly report"), message("m2", "Lunch?")])
        }

        pub fn failing(status: u16) -> Self {
            let client = Self::with_inbox();
            *client.fail_status.lock().unwrap() = Some(status);
            client
        }

        fn check(&self, access_token: &str) -> MailResult<()> {
            self.tokens.lock().unwrap().push(access_token.to_string());
            match *self.fail_status.lock().unwrap() {
                Some(status) => Err(MailError::Status {
                    status,
                    message: "scripted failure".to_string(),
                }),
                None => Ok(()),
            }
        }

        fn not_found() -> MailError {
            MailError::Status {
                status: 404,
                message: "Requested entity was not found.".to_string(),
            }
        }
    }

    pub fn message(id: &str, subject: &str) -> MailMessage {
        MailMessage {
            id: id.to_string(),
            from: "alice@example.com".to_string(),
            to: "me@example.com".to_string(),
            date: "Mon, 5 Oct 2026 09:00:00 +0000".to_string(),
            subject: subject.to_string(),
            body: Some(format!("Body of {}", subject)),
        }
    }

    #[async_trait]
    impl MailClient for FakeMailClient {
        async fn list_messages(&self, access_token: &str, max_results: u32) -> MailResult<Vec<MailMessage>> {
            self.check(access_token)?;
            Ok(self
                .messages
                .lock()
                .unwrap()
                .iter()
                .take(max_results as usize)
                .map(|m| MailMessage { body: None, ..m.clone() })
                .collect())
        }

        async fn get_message(&self, access_token: &str, message_id: &str) -> MailResult<MailMessage> {
            self.check(access_token)?;
            self.messages
                .lock()
                .unwrap()
                .iter()
                .find(|m| m.id == message_id)
                .cloned()
                .ok_or_else(Self::not_found)
        }

        async fn delete_message(&self, access_token: &str, message_id: &str) -> MailResult<()> {
            self.check(access_token)?;
            let mut messages = self.messages.lock().unwrap();
            let before = messages.len();
            messages.retain(|m| m.id != message_id);
            if messages.len() == before {
                return Err(Self::not_found());
            }
            Ok(())
        }

        async fn mark_read(&self, access_token: &str, message_id: &str) -> MailResult<()> {
            self.check(access_token)?;
            if !self.messages.lock().unwrap().iter().any(|m| m.id == message_id) {
                return Err(Self::not_found());
            }
            self.unread.lock().unwrap().retain(|id| id != message_id);
            Ok(())
        }
    }
}

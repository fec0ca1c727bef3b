//! Gmail REST v1 client

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{MailClient, MailError, MailMessage, MailResult};

const GMAIL_API_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

const METADATA_HEADERS: &[&str] = &["From", "To", "Subject", "Date"];

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GmailMessage {
    id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    payload: Option<MessagePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    #[serde(default)]
    data: Option<String>,
}

/// Gmail API client
#[derive(Clone)]
pub struct GmailClient {
    http_client: Client,
}

impl Default for GmailClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GmailClient {
    pub fn new() -> Self {
        Self {
            http_client: Client::new(),
        }
    }

    async fn send(request: RequestBuilder) -> MailResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(MailError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch(&self, access_token: &str, message_id: &str, format: &str) -> MailResult<GmailMessage> {
        let mut query: Vec<(&str, &str)> = vec![("format", format)];
        if format == "metadata" {
            query.extend(METADATA_HEADERS.iter().map(|h| ("metadataHeaders", *h)));
        }

        let request = self
            .http_client
            .get(format!("{}/messages/{}", GMAIL_API_URL, message_id))
            .bearer_auth(access_token)
            .query(&query);
        Ok(Self::send(request).await?.json().await?)
    }
}

/// Header value by case-insensitive name, empty when absent
fn header(part: &MessagePart, name: &str) -> String {
    part.headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
        .unwrap_or_default()
}

/// Gmail bodies are base64url, with or without padding
fn decode_body(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// First part of the given MIME type with a decodable body, depth first
fn find_body(part: &MessagePart, mime_type: &str) -> Option<String> {
    if part.mime_type.eq_ignore_ascii_case(mime_type) {
        if let Some(text) = part.body.as_ref().and_then(|b| b.data.as_deref()).and_then(decode_body) {
            return Some(text);
        }
    }
    part.parts.iter().find_map(|p| find_body(p, mime_type))
}

fn extract_body(part: &MessagePart) -> Option<String> {
    find_body(part, "text/plain").or_else(|| find_body(part, "text/html"))
}

fn to_mail_message(message: GmailMessage, with_body: bool) -> MailMessage {
    let payload = message.payload.unwrap_or_default();
    let body = if with_body {
        extract_body(&payload).or_else(|| Some(message.snippet.clone()).filter(|s| !s.is_empty()))
    } else {
        None
    };

    MailMessage {
        id: message.id,
        from: header(&payload, "From"),
        to: header(&payload, "To"),
        date: header(&payload, "Date"),
        subject: header(&payload, "Subject"),
        body,
    }
}

#[async_trait]
impl MailClient for GmailClient {
    async fn list_messages(&self, access_token: &str, max_results: u32) -> MailResult<Vec<MailMessage>> {
        let max_results = max_results.to_string();
        let request = self
            .http_client
            .get(format!("{}/messages", GMAIL_API_URL))
            .bearer_auth(access_token)
            .query(&[("maxResults", max_results.as_str()), ("labelIds", "INBOX")]);
        let list: ListResponse = Self::send(request).await?.json().await?;
        debug!("Gmail listed {} message(s)", list.messages.len());

        let mut messages = Vec::with_capacity(list.messages.len());
        for message_ref in list.messages {
            let message = self.fetch(access_token, &message_ref.id, "metadata").await?;
            messages.push(to_mail_message(message, false));
        }
        Ok(messages)
    }

    async fn get_message(&self, access_token: &str, message_id: &str) -> MailResult<MailMessage> {
        let message = self.fetch(access_token, message_id, "full").await?;
        Ok(to_mail_message(message, true))
    }

    async fn delete_message(&self, access_token: &str, message_id: &str) -> MailResult<()> {
        let request = self
            .http_client
            .post(format!("{}/messages/{}/trash", GMAIL_API_URL, message_id))
            .bearer_auth(access_token);
        Self::send(request).await?;
        Ok(())
    }

    async fn mark_read(&self, access_token: &str, message_id: &str) -> MailResult<()> {
        let request = self
            .http_client
            .post(format!("{}/messages/{}/modify", GMAIL_API_URL, message_id))
            .bearer_auth(access_token)
            .json(&json!({"removeLabelIds": ["UNREAD"]}));
        Self::send(request).await?;
        Ok(())
    }
}

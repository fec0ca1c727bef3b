//! Mail tools - read and tidy the user's mailbox

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::auth::OAuthFlowController;
use crate::mail::{MailClient, MailError};
use crate::Result;

use super::{error_payload, login_required, status_payload, Tool, ToolContext};

/// Upper bound for `list_emails`
const MAX_LIST_RESULTS: u64 = 25;

/// What every mail tool needs: the mailbox and the user's credentials for it
pub struct MailAccess {
    flow: Arc<OAuthFlowController>,
    client: Arc<dyn MailClient>,
    provider: String,
    default_max_results: u32,
}

impl MailAccess {
    pub fn new(
        flow: Arc<OAuthFlowController>,
        client: Arc<dyn MailClient>,
        provider: &str,
        default_max_results: u32,
    ) -> Self {
        Self {
            flow,
            client,
            provider: provider.to_string(),
            default_max_results,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    async fn access_token(&self, ctx: &ToolContext) -> Result<Option<String>> {
        self.flow.access_token(&ctx.user_id, &self.provider).await
    }

    /// Map a backend failure to a payload the model can explain
    fn error_response(&self, err: MailError) -> Value {
        match err.status() {
            Some(404) => error_payload("invalid_message_id", "Message id not found. Please list emails first."),
            Some(400) => error_payload("invalid_request", "Invalid request parameters. Please list emails first."),
            Some(401) | Some(403) => login_required(&self.provider),
            Some(429) | Some(500) | Some(502) | Some(503) | Some(504) | None => {
                warn!("Mail service error: {}", err);
                error_payload("service_error", "Mail service error, please retry later.")
            }
            Some(_) => {
                warn!("Unexpected mail error: {}", err);
                error_payload("unknown_error", "Unexpected mail error.")
            }
        }
    }
}

fn message_id(params: &Value) -> std::result::Result<String, Value> {
    params
        .get("message_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| error_payload("invalid_request", "A message_id is required. Please list emails first."))
}

fn message_id_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "message_id": {"type": "string", "description": "Id returned by list_emails"}
        },
        "required": ["message_id"]
    })
}

pub struct ListEmailsTool {
    mail: Arc<MailAccess>,
}

impl ListEmailsTool {
    pub fn new(mail: Arc<MailAccess>) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for ListEmailsTool {
    fn name(&self) -> &str { "list_emails" }
    fn description(&self) -> &str { "List recent emails" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "max_results": {
                    "type": "integer",
                    "default": self.mail.default_max_results,
                    "minimum": 1,
                    "maximum": MAX_LIST_RESULTS
                }
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value> {
        let max_results = params
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(self.mail.default_max_results as u64)
            .clamp(1, MAX_LIST_RESULTS) as u32;

        let Some(token) = self.mail.access_token(ctx).await? else {
            return Ok(login_required(&self.mail.provider));
        };
        match self.mail.client.list_messages(&token, max_results).await {
            Ok(messages) => {
                let summaries: Vec<Value> = messages
                    .into_iter()
                    .map(|m| {
                        json!({
                            "id": m.id,
                            "from": m.from,
                            "to": m.to,
                            "date": m.date,
                            "subject": m.subject,
                        })
                    })
                    .collect();
                Ok(json!({ "messages": summaries }))
            }
            Err(e) => Ok(self.mail.error_response(e)),
        }
    }
}

pub struct GetEmailTool {
    mail: Arc<MailAccess>,
}

impl GetEmailTool {
    pub fn new(mail: Arc<MailAccess>) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for GetEmailTool {
    fn name(&self) -> &str { "get_email" }
    fn description(&self) -> &str { "Get an email by id" }
    fn parameters(&self) -> Value { message_id_schema() }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value> {
        let id = match message_id(&params) {
            Ok(id) => id,
            Err(payload) => return Ok(payload),
        };
        let Some(token) = self.mail.access_token(ctx).await? else {
            return Ok(login_required(&self.mail.provider));
        };
        match self.mail.client.get_message(&token, &id).await {
            Ok(message) => Ok(serde_json::to_value(message)?),
            Err(e) => Ok(self.mail.error_response(e)),
        }
    }
}

pub struct DeleteEmailTool {
    mail: Arc<MailAccess>,
}

impl DeleteEmailTool {
    pub fn new(mail: Arc<MailAccess>) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for DeleteEmailTool {
    fn name(&self) -> &str { "delete_email" }
    fn description(&self) -> &str { "Move an email to the trash. Use only when the user asks to delete it." }
    fn parameters(&self) -> Value { message_id_schema() }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value> {
        let id = match message_id(&params) {
            Ok(id) => id,
            Err(payload) => return Ok(payload),
        };
        let Some(token) = self.mail.access_token(ctx).await? else {
            return Ok(login_required(&self.mail.provider));
        };
        match self.mail.client.delete_message(&token, &id).await {
            Ok(()) => Ok(status_payload("deleted", "The email was moved to the trash.")),
            Err(e) => Ok(self.mail.error_response(e)),
        }
    }
}

pub struct MarkEmailReadTool {
    mail: Arc<MailAccess>,
}

impl MarkEmailReadTool {
    pub fn new(mail: Arc<MailAccess>) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for MarkEmailReadTool {
    fn name(&self) -> &str { "mark_email_read" }
    fn description(&self) -> &str { "Mark an email as read" }
    fn parameters(&self) -> Value { message_id_schema() }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value> {
        let id = match message_id(&params) {
            Ok(id) => id,
            Err(payload) => return Ok(payload),
        };
        let Some(token) = self.mail.access_token(ctx).await? else {
            return Ok(login_required(&self.mail.provider));
        };
        match self.mail.client.mark_read(&token, &id).await {
            Ok(()) => Ok(status_payload("marked_read", "The email was marked as read.")),
            Err(e) => Ok(self.mail.error_response(e)),
        }
    }
}

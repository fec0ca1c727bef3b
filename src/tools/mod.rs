//! Tools module - capabilities the model may invoke
//!
//! Tools return structured JSON payloads. Failures the model should react to
//! (a missing login, an unknown message id) are payloads with
//! `"type": "error"`, not `Err`; an `Err` from a tool is still captured by
//! the loop and turned into an error `tool_result`.

mod registry;
mod payload;
pub mod auth;
pub mod mail;

pub use payload::{auth_action, error_payload, login_required, status_payload, AuthAction, AuthSignal};
pub use registry::{ToolDefinition, ToolRegistry};
pub(crate) use payload::display_name;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use crate::auth::OAuthFlowController;
use crate::Result;

use self::auth::{CheckStatusTool, RequestLoginTool, RequestLogoutTool};
use self::mail::{DeleteEmailTool, GetEmailTool, ListEmailsTool, MailAccess, MarkEmailReadTool};

/// Per-call context handed to every tool
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// The chat user the request is made on behalf of
    pub user_id: String,
}

impl ToolContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Tool trait - interface for all agent tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in function calls
    fn name(&self) -> &str;

    /// Description of what the tool does
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters(&self) -> Value;

    /// Execute the tool with given parameters
    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value>;

    /// Convert to tool definition for LLM
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters(),
        }
    }
}

/// Registry with the built-in auth tools and, when given, the mail tools
pub fn default_registry(flow: Arc<OAuthFlowController>, mail: Option<Arc<MailAccess>>) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(CheckStatusTool::new(flow.clone()))?;
    registry.register(RequestLoginTool::new(flow.clone()))?;
    registry.register(RequestLogoutTool::new(flow))?;

    if let Some(mail) = mail {
        registry.register(ListEmailsTool::new(mail.clone()))?;
        registry.register(GetEmailTool::new(mail.clone()))?;
        registry.register(DeleteEmailTool::new(mail.clone()))?;
        registry.register(MarkEmailReadTool::new(mail))?;
    }

    tracing::debug!("Registered tools: {:?}", registry.tool_names());
    Ok(registry)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::fake_flow;
    use crate::mail::fake::FakeMailClient;

    #[test]
    fn test_default_registry() {
        let (flow, _, _) = fake_flow();
        let registry = default_registry(flow.clone(), None).unwrap();
        assert_eq!(registry.tool_names(), vec!["check_status", "request_login", "request_logout"]);

        let mail = Arc::new(MailAccess::new(flow.clone(), Arc::new(FakeMailClient::with_inbox()), "google", 5));
        let registry = default_registry(flow, Some(mail)).unwrap();
        assert_eq!(registry.len(), 7);
        assert!(registry.has("list_emails"));
        assert!(registry.has("mark_email_read"));
    }
}

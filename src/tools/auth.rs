//! Auth tools - let the model check and change the user's sign-in state

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::auth::OAuthFlowController;
use crate::Result;

use super::payload::display_name;
use super::{auth_action, error_payload, status_payload, AuthAction, Tool, ToolContext};

fn provider_schema(flow: &OAuthFlowController) -> Value {
    json!({
        "type": "object",
        "properties": {
            "provider": {
                "type": "string",
                "enum": flow.providers(),
                "description": "Auth provider, e.g. google"
            }
        },
        "required": ["provider"],
        "additionalProperties": false
    })
}

/// Provider argument checked against the configured providers
fn validate_provider(flow: &OAuthFlowController, params: &Value) -> std::result::Result<String, Value> {
    let provider = params
        .get("provider")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    if provider.is_empty() {
        return Err(error_payload("missing_provider", "Auth provider is not configured."));
    }
    if !flow.supports(provider) {
        return Err(error_payload("unsupported_provider", "Unsupported provider."));
    }
    Ok(provider.to_string())
}

fn signed_in(provider: &str) -> Value {
    status_payload(
        "already_logged_in",
        format!("You are already signed in to your {} account.", display_name(provider)),
    )
}

fn signed_out(provider: &str) -> Value {
    status_payload(
        "not_logged_in",
        format!("You are not signed in to your {} account.", display_name(provider)),
    )
}

/// Report whether the user is signed in
pub struct CheckStatusTool {
    flow: Arc<OAuthFlowController>,
}

impl CheckStatusTool {
    pub fn new(flow: Arc<OAuthFlowController>) -> Self {
        Self { flow }
    }
}

#[async_trait]
impl Tool for CheckStatusTool {
    fn name(&self) -> &str { "check_status" }
    fn description(&self) -> &str { "Use when the user asks whether they are signed in or signed out." }
    fn parameters(&self) -> Value { provider_schema(&self.flow) }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value> {
        let provider = match validate_provider(&self.flow, &params) {
            Ok(provider) => provider,
            Err(payload) => return Ok(payload),
        };

        if self.flow.status(&ctx.user_id, &provider)? {
            Ok(signed_in(&provider))
        } else {
            Ok(signed_out(&provider))
        }
    }
}

/// Offer a sign-in link
pub struct RequestLoginTool {
    flow: Arc<OAuthFlowController>,
}

impl RequestLoginTool {
    pub fn new(flow: Arc<OAuthFlowController>) -> Self {
        Self { flow }
    }
}

#[async_trait]
impl Tool for RequestLoginTool {
    fn name(&self) -> &str { "request_login" }
    fn description(&self) -> &str { "Use only when the user explicitly asks to sign in or connect an account." }
    fn parameters(&self) -> Value { provider_schema(&self.flow) }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value> {
        let provider = match validate_provider(&self.flow, &params) {
            Ok(provider) => provider,
            Err(payload) => return Ok(payload),
        };

        if self.flow.status(&ctx.user_id, &provider)? {
            return Ok(signed_in(&provider));
        }
        Ok(auth_action(AuthAction::Login, &provider))
    }
}

/// Offer a sign-out link
pub struct RequestLogoutTool {
    flow: Arc<OAuthFlowController>,
}

impl RequestLogoutTool {
    pub fn new(flow: Arc<OAuthFlowController>) -> Self {
        Self { flow }
    }
}

#[async_trait]
impl Tool for RequestLogoutTool {
    fn name(&self) -> &str { "request_logout" }
    fn description(&self) -> &str { "Use when the user wants to sign out or revoke access." }
    fn parameters(&self) -> Value { provider_schema(&self.flow) }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<Value> {
        let provider = match validate_provider(&self.flow, &params) {
            Ok(provider) => provider,
            Err(payload) => return Ok(payload),
        };

        if !self.flow.status(&ctx.user_id, &provider)? {
            return Ok(signed_out(&provider));
        }
        Ok(auth_action(AuthAction::Logout, &provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{fake_flow, sign_in};
    use crate::tools::AuthSignal;

    fn ctx() -> ToolContext {
        ToolContext::new("u1")
    }

    #[tokio::test]
    async fn test_provider_validation() {
        let (flow, _, _) = fake_flow();
        let tool = CheckStatusTool::new(flow);

        let missing = tool.execute(&ctx(), json!({})).await.unwrap();
        assert_eq!(missing["code"], "missing_provider");

        let unsupported = tool.execute(&ctx(), json!({"provider": "yahoo"})).await.unwrap();
        assert_eq!(unsupported["code"], "unsupported_provider");
        assert_eq!(unsupported["type"], "error");
    }

    #[tokio::test]
    async fn test_check_status() {
        let (flow, _, _) = fake_flow();
        let tool = CheckStatusTool::new(flow.clone());

        let out = tool.execute(&ctx(), json!({"provider": "google"})).await.unwrap();
        assert_eq!(out["code"], "not_logged_in");

        sign_in(&flow, "u1").await;
        let out = tool.execute(&ctx(), json!({"provider": "google"})).await.unwrap();
        assert_eq!(out["code"], "already_logged_in");
        assert!(out["message"].as_str().unwrap().contains("Google"));
    }

    #[tokio::test]
    async fn test_request_login() {
        let (flow, _, _) = fake_flow();
        let tool = RequestLoginTool::new(flow.clone());

        let out = tool.execute(&ctx(), json!({"provider": "google"})).await.unwrap();
        let signal = AuthSignal::from_output(&out).unwrap();
        assert_eq!(signal.action, AuthAction::Login);

        sign_in(&flow, "u1").await;
        let out = tool.execute(&ctx(), json!({"provider": "google"})).await.unwrap();
        assert_eq!(out["code"], "already_logged_in");
        assert!(AuthSignal::from_output(&out).is_none());
    }

    #[tokio::test]
    async fn test_request_logout() {
        let (flow, _, _) = fake_flow();
        let tool = RequestLogoutTool::new(flow.clone());

        let out = tool.execute(&ctx(), json!({"provider": "google"})).await.unwrap();
        assert_eq!(out["code"], "not_logged_in");

        sign_in(&flow, "u1").await;
        let out = tool.execute(&ctx(), json!({"provider": "google"})).await.unwrap();
        assert_eq!(AuthSignal::from_output(&out).unwrap().action, AuthAction::Logout);
    }

    #[test]
    fn test_schema_lists_configured_providers() {
        let (flow, _, _) = fake_flow();
        let schema = RequestLoginTool::new(flow).parameters();
        assert_eq!(schema["properties"]["provider"]["enum"], json!(["google"]));
    }
}

//! Gemini LLM client implementation

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::agent::message::{ContentBlock, ConversationTurn, Role};
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

use super::types::GeminiResponse;
use super::LlmClient;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Gemini API client
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    max_tokens: u32,
    client: Client,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, max_tokens: u32) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
            client: Client::new(),
        }
    }

    fn build_url(&self) -> String {
        format!("{}/{}:generateContent", GEMINI_API_URL, self.model)
    }

    fn build_request(&self, turns: &[ConversationTurn], system: Option<&str>, tools: &[ToolDefinition]) -> Value {
        let mut request = json!({
            "contents": convert_turns(turns),
            "generationConfig": {
                "maxOutputTokens": self.max_tokens
            }
        });

        if let Some(system) = system.map(str::trim).filter(|s| !s.is_empty()) {
            request["systemInstruction"] = json!({
                "parts": [{"text": system}]
            });
        }

        if let Some(tool_config) = convert_tools(tools) {
            request["tools"] = tool_config;
        }

        request
    }
}

/// Map turns onto Gemini `contents`.
///
/// Gemini function responses are keyed by function name, not call id, so the
/// name is recovered from the matching earlier `tool_use` block.
fn convert_turns(turns: &[ConversationTurn]) -> Vec<Value> {
    let mut names_by_id: HashMap<&str, &str> = HashMap::new();
    let mut contents = Vec::with_capacity(turns.len());

    for turn in turns {
        let role = match turn.role {
            Role::User | Role::Tool => "user",
            Role::Assistant => "model",
        };

        let parts: Vec<Value> = turn
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => json!({"text": text}),
                ContentBlock::ToolUse { id, name, input } => {
                    names_by_id.insert(id.as_str(), name.as_str());
                    json!({
                        "functionCall": {
                            "name": name,
                            "args": input
                        }
                    })
                }
                ContentBlock::ToolResult { tool_use_id, content, .. } => {
                    let name = names_by_id.get(tool_use_id.as_str()).copied().unwrap_or("unknown");
                    json!({
                        "functionResponse": {
                            "name": name,
                            "response": {"result": content}
                        }
                    })
                }
            })
            .collect();

        if !parts.is_empty() {
            contents.push(json!({ "role": role, "parts": parts }));
        }
    }

    contents
}

fn convert_tools(tools: &[ToolDefinition]) -> Option<Value> {
    if tools.is_empty() {
        return None;
    }

    let function_declarations: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.input_schema
            })
        })
        .collect();

    Some(json!([{
        "functionDeclarations": function_declarations
    }]))
}

fn parse_response(response: GeminiResponse) -> Result<ConversationTurn> {
    if let Some(usage) = &response.usage_metadata {
        debug!("Gemini tokens used: {:?}", usage.total_token_count);
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::Upstream("No candidates in Gemini response".to_string()))?;

    debug!("Gemini finish_reason: {:?}", candidate.finish_reason);

    let mut content = Vec::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(text) = part.text {
            content.push(ContentBlock::Text { text });
        }
        if let Some(call) = part.function_call {
            // Gemini does not issue call ids
            let id = format!("call_{}", uuid::Uuid::new_v4().simple());
            content.push(ContentBlock::ToolUse {
                id,
                name: call.name,
                input: call.args,
            });
        }
    }

    Ok(ConversationTurn::new(Role::Assistant, content))
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(
        &self,
        turns: &[ConversationTurn],
        system: Option<&str>,
        tools: &[ToolDefinition],
    ) -> Result<ConversationTurn> {
        let request = self.build_request(turns, system, tools);

        let response = self
            .client
            .post(self.build_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("Gemini API error ({}): {}", status, error_text)));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Malformed Gemini response: {}", e)))?;
        parse_response(gemini_response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_response_uses_call_name() {
        let turns = vec![
            ConversationTurn::user("list my emails"),
            ConversationTurn::new(
                Role::Assistant,
                vec![ContentBlock::tool_use("call_1", "list_emails", json!({}))],
            ),
            ConversationTurn::tool_results(vec![ContentBlock::tool_result(
                "call_1",
                json!({"messages": []}),
                false,
            )]),
        ];

        let contents = convert_turns(&turns);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "list_emails");
        assert_eq!(contents[2]["parts"][0]["functionResponse"]["name"], "list_emails");
    }

    #[test]
    fn test_parse_response_issues_call_ids() {
        let raw = json!({
            "candidates": [{
                "content": {"parts": [
                    {"functionCall": {"name": "get_email", "args": {"message_id": "m1"}}},
                    {"functionCall": {"name": "get_email", "args": {"message_id": "m2"}}}
                ]},
                "finishReason": "STOP"
            }]
        });
        let turn = parse_response(serde_json::from_value(raw).unwrap()).unwrap();
        let calls = turn.tool_calls();

        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].id, calls[1].id);
        assert_eq!(calls[1].input["message_id"], "m2");
    }

    #[test]
    fn test_parse_response_without_candidates_is_upstream_error() {
        let raw = json!({"candidates": []});
        let err = parse_response(serde_json::from_value(raw).unwrap()).unwrap_err();
        assert!(err.is_upstream());
    }

    #[test]
    fn test_build_url() {
        let client = GeminiClient::new("key", "gemini-2.0-flash", 1024);
        assert_eq!(
            client.build_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert!(client.build_request(&[], None, &[]).get("tools").is_none());
    }
}

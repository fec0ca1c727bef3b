//! Anthropic Messages API client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::agent::message::{ContentBlock, ConversationTurn, Role};
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

use super::LlmClient;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";

/// Claude client
#[derive(Clone)]
pub struct AnthropicClient {
    api_key: String,
    model: String,
    max_tokens: u32,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    #[serde(other)]
    Other,
}

impl AnthropicClient {
    pub fn new(api_key: &str, model: &str, max_tokens: u32) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
            client: Client::new(),
        }
    }

    fn build_request(&self, turns: &[ConversationTurn], system: Option<&str>, tools: &[ToolDefinition]) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": convert_turns(turns),
        });

        if let Some(system) = system.map(str::trim).filter(|s| !s.is_empty()) {
            body["system"] = json!(system);
        }

        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect();
        }

        body
    }
}

/// Map turns onto Messages API messages.
///
/// Tool turns travel as `user` messages. Adjacent messages with the same role
/// are merged since the API requires alternation.
fn convert_turns(turns: &[ConversationTurn]) -> Vec<Value> {
    let mut messages: Vec<(&'static str, Vec<Value>)> = Vec::with_capacity(turns.len());

    for turn in turns {
        let role = match turn.role {
            Role::User | Role::Tool => "user",
            Role::Assistant => "assistant",
        };
        let blocks: Vec<Value> = turn.content.iter().map(convert_block).collect();
        if blocks.is_empty() {
            continue;
        }

        match messages.last_mut() {
            Some((last_role, content)) if *last_role == role => content.extend(blocks),
            _ => messages.push((role, blocks)),
        }
    }

    messages
        .into_iter()
        .map(|(role, content)| json!({ "role": role, "content": content }))
        .collect()
}

fn convert_block(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
        ContentBlock::ToolUse { id, name, input } => json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        }),
        ContentBlock::ToolResult { tool_use_id, content, is_error } => {
            let mut block = json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": result_text(content),
            });
            if *is_error {
                block["is_error"] = json!(true);
            }
            block
        }
    }
}

/// Tool results are sent as text; structured payloads as compact JSON
fn result_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_response(response: MessagesResponse) -> ConversationTurn {
    let content = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(ContentBlock::Text { text }),
            ResponseBlock::ToolUse { id, name, input } => Some(ContentBlock::ToolUse { id, name, input }),
            ResponseBlock::Other => None,
        })
        .collect();
    ConversationTurn::new(Role::Assistant, content)
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn generate(
        &self,
        turns: &[ConversationTurn],
        system: Option<&str>,
        tools: &[ToolDefinition],
    ) -> Result<ConversationTurn> {
        let body = self.build_request(turns, system, tools);

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Anthropic request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("Anthropic API error ({}): {}", status, error_text)));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Malformed Anthropic response: {}", e)))?;
        debug!("Anthropic stop_reason: {:?}", parsed.stop_reason);

        Ok(parse_response(parsed))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_turns_become_user_messages() {
        let turns = vec![
            ConversationTurn::user("list my emails"),
            ConversationTurn::new(
                Role::Assistant,
                vec![ContentBlock::tool_use("t1", "list_emails", json!({}))],
            ),
            ConversationTurn::tool_results(vec![ContentBlock::tool_result(
                "t1",
                json!({"messages": []}),
                false,
            )]),
        ];

        let messages = convert_turns(&turns);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][0]["type"], "tool_use");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "t1");
        assert_eq!(messages[2]["content"][0]["content"], r#"{"messages":[]}"#);
    }

    #[test]
    fn test_adjacent_same_role_messages_merge() {
        let turns = vec![ConversationTurn::user("a"), ConversationTurn::user("b")];
        let messages = convert_turns(&turns);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_error_results_are_flagged() {
        let block = convert_block(&ContentBlock::tool_result("t1", json!("bad"), true));
        assert_eq!(block["is_error"], true);
        assert_eq!(block["content"], "bad");
    }

    #[test]
    fn test_build_request_includes_system_and_tools() {
        let client = AnthropicClient::new("key", DEFAULT_MODEL, 512);
        let tools = vec![ToolDefinition {
            name: "list_emails".to_string(),
            description: "List recent emails".to_string(),
            input_schema: json!({"type": "object"}),
        }];

        let body = client.build_request(&[ConversationTurn::user("hi")], Some("  Be brief. "), &tools);
        assert_eq!(body["system"], "Be brief.");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");

        let body = client.build_request(&[ConversationTurn::user("hi")], None, &[]);
        assert!(body.get("system").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_parse_response_keeps_text_and_tool_use() {
        let raw = json!({
            "content": [
                {"type": "text", "text": "Checking."},
                {"type": "tool_use", "id": "toolu_1", "name": "list_emails", "input": {"max_results": 2}},
                {"type": "thinking", "thinking": "..."}
            ],
            "stop_reason": "tool_use"
        });
        let response: MessagesResponse = serde_json::from_value(raw).unwrap();
        let turn = parse_response(response);

        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.content.len(), 2);
        assert_eq!(turn.tool_calls()[0].id, "toolu_1");
    }
}

//! Tool execution loop - drives one inbound message to a final reply

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::tools::{error_payload, AuthSignal, ToolContext, ToolRegistry};
use crate::Result;

use super::llm::LlmClient;
use super::message::{ContentBlock, ConversationTurn, ToolCall};

const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// States of a single request. `Done` and `Failed` are terminal.
#[derive(Debug)]
pub enum LoopState {
    AwaitingModel,
    ExecutingTools(ConversationTurn),
    Done(String),
    Failed(Error),
}

/// Result of a loop that reached `Done`
#[derive(Debug, Clone)]
pub struct Completion {
    /// Text of the final assistant turn
    pub text: String,
    /// Every turn produced by this request, starting with the user turn
    pub turns: Vec<ConversationTurn>,
    /// Last authorization requirement reported by a tool, if any
    pub auth: Option<AuthSignal>,
    /// Model round-trips used
    pub rounds: usize,
}

/// The loop alternates model calls and tool execution until the model answers
/// without requesting tools.
pub struct ToolLoop {
    client: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    max_iterations: usize,
    model_timeout: Duration,
    tool_timeout: Duration,
}

impl ToolLoop {
    pub fn new(client: Arc<dyn LlmClient>, registry: Arc<ToolRegistry>, max_iterations: usize) -> Self {
        Self {
            client,
            registry,
            max_iterations: max_iterations.max(1),
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, model_timeout: Duration, tool_timeout: Duration) -> Self {
        self.model_timeout = model_timeout;
        self.tool_timeout = tool_timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Run the loop for one user turn on top of `history`.
    ///
    /// `history` is only read; the produced turns are returned in the
    /// [`Completion`] so the caller can commit them all at once.
    pub async fn run(
        &self,
        history: &[ConversationTurn],
        user_turn: ConversationTurn,
        system: Option<&str>,
        ctx: &ToolContext,
    ) -> Result<Completion> {
        let tools = self.registry.definitions();
        let mut pending = vec![user_turn];
        let mut auth = None;
        let mut rounds = 0;
        let mut state = LoopState::AwaitingModel;

        info!("Starting tool loop for user {}", ctx.user_id);

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    rounds += 1;
                    debug!("Model round {}/{}", rounds, self.max_iterations);

                    let turns: Vec<ConversationTurn> = history.iter().chain(pending.iter()).cloned().collect();
                    match timeout(self.model_timeout, self.client.generate(&turns, system, &tools)).await {
                        Err(_) => LoopState::Failed(Error::Timeout(format!(
                            "model did not answer within {:?}",
                            self.model_timeout
                        ))),
                        Ok(Err(e)) => LoopState::Failed(e),
                        Ok(Ok(reply)) if reply.has_tool_calls() => {
                            if rounds >= self.max_iterations {
                                LoopState::Failed(Error::IterationLimitExceeded)
                            } else {
                                LoopState::ExecutingTools(reply)
                            }
                        }
                        Ok(Ok(reply)) => {
                            let text = reply.text();
                            pending.push(reply);
                            LoopState::Done(text)
                        }
                    }
                }

                LoopState::ExecutingTools(reply) => {
                    let mut results = Vec::new();
                    let mut failure = None;

                    for call in reply.tool_calls() {
                        match self.execute_tool(ctx, &call).await {
                            Ok((output, is_error)) => {
                                if let Some(signal) = AuthSignal::from_output(&output) {
                                    auth = Some(signal);
                                }
                                results.push(ContentBlock::tool_result(call.id, output, is_error));
                            }
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    }

                    match failure {
                        Some(e) => LoopState::Failed(e),
                        None => {
                            pending.push(reply);
                            pending.push(ConversationTurn::tool_results(results));
                            LoopState::AwaitingModel
                        }
                    }
                }

                LoopState::Done(text) => {
                    info!("Tool loop completed after {} round(s): {} chars", rounds, text.len());
                    return Ok(Completion {
                        text,
                        turns: pending,
                        auth,
                        rounds,
                    });
                }

                LoopState::Failed(e) => {
                    warn!("Tool loop failed after {} round(s): {}", rounds, e);
                    return Err(e);
                }
            };
        }
    }

    /// Execute one call. Unknown tools and tool errors become error payloads;
    /// only a timeout is returned as `Err`.
    async fn execute_tool(&self, ctx: &ToolContext, call: &ToolCall) -> Result<(Value, bool)> {
        let Some(tool) = self.registry.resolve(&call.name) else {
            warn!("Model requested unknown tool: {}", call.name);
            let label = if call.name.is_empty() { "unknown" } else { call.name.as_str() };
            return Ok((error_payload("unknown_tool", format!("Unknown tool: {}", label)), true));
        };

        debug!("Executing tool: {}", call.name);

        match timeout(self.tool_timeout, tool.execute(ctx, call.input.clone())).await {
            Err(_) => Err(Error::Timeout(format!(
                "tool {} did not finish within {:?}",
                call.name, self.tool_timeout
            ))),
            Ok(Ok(output)) => {
                let is_error = output.get("type").and_then(Value::as_str) == Some("error");
                debug!("Tool {} finished (error payload: {})", call.name, is_error);
                Ok((output, is_error))
            }
            Ok(Err(e)) => {
                warn!("Tool {} failed: {}", call.name, e);
                Ok((
                    json!({
                        "type": "error",
                        "code": "tool_failed",
                        "message": e.to_string(),
                        "tool": call.name,
                    }),
                    true,
                ))
            }
        }
    }
}

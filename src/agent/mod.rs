//! Agent module - core orchestration logic.
//!
//! This module contains:
//! - Message types (IncomingMessage, ConversationTurn, Reply)
//! - LLM client trait and implementations
//! - Bounded per-user conversation history
//! - Tool execution loop and the event router in front of it
//!
//! # Adding a New LLM Provider
//!
//! See [`llm::ProviderRegistry`] for instructions.

mod history;
mod loop_impl;
mod message;
mod router;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use history::{ConversationHistory, SessionStore};
pub use llm::{AnthropicClient, GeminiClient, LlmClient, ProviderRegistry};
pub use loop_impl::{Completion, LoopState, ToolLoop};
pub use message::{ContentBlock, ConversationTurn, IncomingMessage, Reply, Role, ToolCall};
pub use router::EventRouter;

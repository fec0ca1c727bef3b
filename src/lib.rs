//! Courier - chat-to-AI orchestrator
//!
//! Inbound chat messages run through a bounded tool-calling loop against an
//! LLM. Tools act on the user's mailbox with per-user OAuth credentials, and
//! replies carry sign-in or sign-out links when the user needs to act.

pub mod adapters;
pub mod agent;
pub mod auth;
pub mod config;
pub mod error;
pub mod mail;
pub mod server;
pub mod tools;

pub use error::{Error, Result};

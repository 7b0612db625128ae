//! Chat-completions client for OpenAI-compatible APIs.
//!
//! This crate provides:
//! - [`ChatMessage`], [`ChatRequest`], [`ToolSpec`]: the wire types
//! - [`ChatModel`]: the seam enrichment and the agent call models through
//! - [`OpenAiClient`]: the HTTP implementation

mod message;
mod openai;

use async_trait::async_trait;
use leadsmith_shared::Result;

pub use message::{ChatMessage, ChatRequest, FunctionCall, FunctionSpec, Role, ToolCall, ToolSpec};
pub use openai::OpenAiClient;

/// A chat model that answers one request with one assistant message.
///
/// Failures are reported as [`leadsmith_shared::LeadsmithError::Llm`].
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage>;
}

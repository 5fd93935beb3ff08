//! `LlmClient` (§4.5.1, §6): a lazy sequence of `(delta_text | delta_json |
//! completed | error)` events with no intermediate buffering (Design Note 3),
//! implemented over two wire shapes — OpenAI-compatible SSE and Ollama's
//! native NDJSON streaming.

pub mod error;
pub mod ollama;
pub mod openai;
pub mod routing;

pub use error::LlmError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum ChatEvent {
    DeltaText(String),
    DeltaJson(Value),
    Completed,
    Error(LlmError),
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_stream(&self, model: &str, messages: &[ChatMessage]) -> BoxStream<'static, ChatEvent>;
}

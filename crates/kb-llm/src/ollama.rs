//! Ollama native chat adapter: `POST /api/chat` with newline-delimited JSON
//! when streaming (§6).

use crate::{ChatEvent, ChatMessage, LlmClient, LlmError};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

pub struct OllamaChatClient {
    client: reqwest::Client,
    endpoint: String,
}

impl OllamaChatClient {
    pub fn new(endpoint: String) -> Self {
        Self { client: reqwest::Client::new(), endpoint }
    }
}

#[async_trait]
impl LlmClient for OllamaChatClient {
    async fn chat_stream(&self, model: &str, messages: &[ChatMessage]) -> BoxStream<'static, ChatEvent> {
        let url = format!("{}/api/chat", self.endpoint.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": model,
            "stream": true,
            "messages": messages.iter().map(|m| serde_json::json!({"role": m.role, "content": m.content})).collect::<Vec<_>>(),
        });

        let response = self.client.post(&url).json(&body).send().await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => return stream::once(async move { ChatEvent::Error(LlmError::Transient(format!("status {}", r.status()))) }).boxed(),
            Err(e) => return stream::once(async move { ChatEvent::Error(LlmError::Transient(e.to_string())) }).boxed(),
        };

        response
            .bytes_stream()
            .flat_map(|chunk| {
                let events = match chunk {
                    Ok(bytes) => parse_ndjson_chunk(&bytes),
                    Err(e) => vec![ChatEvent::Error(LlmError::Transient(e.to_string()))],
                };
                stream::iter(events)
            })
            .boxed()
    }
}

fn parse_ndjson_chunk(bytes: &[u8]) -> Vec<ChatEvent> {
    let text = String::from_utf8_lossy(bytes);
    let mut events = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(json) => {
                if json["done"].as_bool() == Some(true) {
                    events.push(ChatEvent::Completed);
                } else if let Some(content) = json["message"]["content"].as_str() {
                    events.push(ChatEvent::DeltaText(content.to_string()));
                } else {
                    events.push(ChatEvent::DeltaJson(json));
                }
            }
            Err(e) => events.push(ChatEvent::Error(LlmError::Transient(e.to_string()))),
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delta_then_done() {
        let chunk = b"{\"message\":{\"content\":\"hi\"},\"done\":false}\n{\"done\":true}\n";
        let events = parse_ndjson_chunk(chunk);
        assert!(matches!(&events[0], ChatEvent::DeltaText(s) if s == "hi"));
        assert!(matches!(events[1], ChatEvent::Completed));
    }
}

//! Optional best-effort LLM summarization (§4.5.1, §6.1): walks the
//! `ModelRoutingTable`'s candidates for a module's `flow_code` and, on the
//! first one that answers, stamps a short summary into `payload.meta.ai`.
//! Never fails the pipeline — every error here is swallowed and logged.

use futures::StreamExt;
use kb_core::config::LlmConfig;
use kb_llm::routing::{ModelProfile, ModelRoutingTable};
use kb_llm::{ChatEvent, ChatMessage, LlmClient};
use serde_json::Value;
use tracing::warn;

pub async fn enrich(routing: &ModelRoutingTable, llm_config: &LlmConfig, flow_code: &str, payload: &mut Value) {
    let candidates = routing.candidates(flow_code);
    if candidates.is_empty() {
        return;
    }

    let prompt = summarization_prompt(flow_code, payload);
    for profile in candidates {
        match summarize_with(&profile, llm_config, &prompt).await {
            Ok(summary) => {
                if let Some(obj) = payload.as_object_mut() {
                    let meta = obj.entry("meta").or_insert_with(|| Value::Object(Default::default()));
                    if let Some(meta_obj) = meta.as_object_mut() {
                        meta_obj.insert(
                            "ai".to_string(),
                            serde_json::json!({ "summary": summary, "provider": profile.provider, "model": profile.model }),
                        );
                    }
                }
                return;
            }
            Err(e) => {
                warn!(flow_code, provider = %profile.provider, model = %profile.model, error = %e, "ai enrichment candidate failed, trying next");
            }
        }
    }
}

fn summarization_prompt(flow_code: &str, payload: &Value) -> String {
    format!(
        "Summarize the following VOC analysis module ({flow_code}) in 2-3 sentences for a merchant. Data:\n{}",
        serde_json::to_string(payload).unwrap_or_default()
    )
}

async fn summarize_with(profile: &ModelProfile, llm_config: &LlmConfig, prompt: &str) -> Result<String, kb_llm::LlmError> {
    let client = build_client(profile, llm_config)?;
    let messages = vec![ChatMessage { role: "user".to_string(), content: prompt.to_string() }];
    let mut stream = client.chat_stream(&profile.model, &messages).await;

    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event {
            ChatEvent::DeltaText(t) => text.push_str(&t),
            ChatEvent::DeltaJson(v) => text.push_str(&v.to_string()),
            ChatEvent::Completed => break,
            ChatEvent::Error(e) => return Err(e),
        }
    }
    if text.trim().is_empty() {
        return Err(kb_llm::LlmError::Permanent("empty response".to_string()));
    }
    Ok(text)
}

fn build_client(profile: &ModelProfile, llm_config: &LlmConfig) -> Result<Box<dyn LlmClient>, kb_llm::LlmError> {
    match profile.provider.as_str() {
        "openai" => {
            let base_url = llm_config.openai_base_url.clone().unwrap_or_else(|| "https://api.openai.com/v1".to_string());
            let api_key = llm_config
                .openai_api_key
                .clone()
                .ok_or_else(|| kb_llm::LlmError::Permanent("missing OPENAI_API_KEY".to_string()))?;
            Ok(Box::new(kb_llm::openai::OpenAiChatClient::new(base_url, api_key)))
        }
        "ollama" => {
            let endpoint = llm_config
                .local_llm_endpoint
                .clone()
                .ok_or_else(|| kb_llm::LlmError::Permanent("missing LOCAL_LLM_ENDPOINT".to_string()))?;
            Ok(Box::new(kb_llm::ollama::OllamaChatClient::new(endpoint)))
        }
        other => Err(kb_llm::LlmError::Permanent(format!("unknown llm provider: {other}"))),
    }
}

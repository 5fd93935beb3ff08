//! Model-routing table (§4.5.1): `flow_code -> Vec<ModelProfile>`, the ordered
//! candidate list the summarizer walks on error. Not the full model-profile
//! admin surface (out of scope) — just the lookup.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ModelProfile {
    pub provider: String,
    pub model: String,
}

#[derive(Default)]
pub struct ModelRoutingTable {
    routes: HashMap<String, Vec<ModelProfile>>,
    default: Option<ModelProfile>,
}

impl ModelRoutingTable {
    pub fn new(default_llm: &str) -> Self {
        let default = parse_profile(default_llm);
        Self { routes: HashMap::new(), default }
    }

    pub fn register(&mut self, flow_code: &str, candidates: Vec<ModelProfile>) {
        self.routes.insert(flow_code.to_string(), candidates);
    }

    /// Ordered candidates for `flow_code`, falling back to `DEFAULT_LLM` when
    /// no routing entry matches (§6.1).
    pub fn candidates(&self, flow_code: &str) -> Vec<ModelProfile> {
        if let Some(candidates) = self.routes.get(flow_code) {
            return candidates.clone();
        }
        self.default.clone().into_iter().collect()
    }
}

fn parse_profile(spec: &str) -> Option<ModelProfile> {
    let (provider, model) = spec.split_once(':')?;
    Some(ModelProfile { provider: provider.to_string(), model: model.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_when_unregistered() {
        let table = ModelRoutingTable::new("openai:gpt-4o-mini");
        let candidates = table.candidates("review.overview");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].model, "gpt-4o-mini");
    }

    #[test]
    fn registered_flow_takes_precedence() {
        let mut table = ModelRoutingTable::new("openai:gpt-4o-mini");
        table.register("review.overview", vec![ModelProfile { provider: "ollama".to_string(), model: "llama3".to_string() }]);
        let candidates = table.candidates("review.overview");
        assert_eq!(candidates[0].provider, "ollama");
    }
}

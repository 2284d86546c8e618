use serde_json::{Map, Value, json};

use crate::catalog;
use crate::core::error::ProviderError;
use crate::core::types::{ChatCompletion, ChatRequest, ProviderId};
use crate::providers::openai_translate::{
    decode_chat_completion, insert_tools, map_messages, map_response_format,
};
use crate::providers::translator_contract::{ProviderTranslator, TranslatedRequest};
use crate::stream::{OpenAiStreamNormalizer, StreamNormalizer};

const WEB_PLUGIN_ID: &str = "web";

/// Aggregator translator. The upstream already speaks the normalized schema,
/// so the mapping is close to identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenRouterTranslator;

impl ProviderTranslator for OpenRouterTranslator {
    fn provider(&self) -> ProviderId {
        ProviderId::Openrouter
    }

    fn translate(&self, req: &ChatRequest) -> TranslatedRequest {
        encode_openrouter_request(req)
    }

    fn decode_response(
        &self,
        payload: &Value,
        model: &str,
    ) -> Result<ChatCompletion, ProviderError> {
        decode_chat_completion(ProviderId::Openrouter, payload, model)
    }

    fn stream_normalizer(&self) -> Box<dyn StreamNormalizer> {
        Box::new(OpenAiStreamNormalizer::new())
    }
}

pub(crate) fn encode_openrouter_request(req: &ChatRequest) -> TranslatedRequest {
    let model = catalog::resolve_upstream_model(ProviderId::Openrouter, req.model_id());

    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.clone()));
    body.insert("messages".to_string(), Value::Array(map_messages(&req.messages)));
    body.insert("stream".to_string(), Value::Bool(req.stream));

    if req.stream {
        body.insert("usage".to_string(), json!({ "include": true }));
    }

    let params = &req.params;
    if let Some(temperature) = params.temperature {
        body.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = params.top_p {
        body.insert("top_p".to_string(), json!(top_p));
    }
    if let Some(top_k) = params.top_k {
        body.insert("top_k".to_string(), json!(top_k));
    }
    if let Some(max_tokens) = params.max_tokens {
        body.insert("max_tokens".to_string(), json!(max_tokens));
    }
    if !params.stop.is_empty() {
        body.insert("stop".to_string(), json!(params.stop));
    }
    if let Some(seed) = params.seed {
        body.insert("seed".to_string(), json!(seed));
    }

    insert_tools(&mut body, req);

    if let Some(response_format) = map_response_format(&req.response_format) {
        body.insert("response_format".to_string(), response_format);
    }

    if let Some(reasoning) = map_reasoning(req) {
        body.insert("reasoning".to_string(), reasoning);
    }

    if let Some(preferences) = req.provider_preferences.as_ref().filter(|value| value.is_object())
    {
        body.insert("provider".to_string(), preferences.clone());
    }

    if req.features.web_search {
        body.insert("plugins".to_string(), json!([{ "id": WEB_PLUGIN_ID }]));
    }

    TranslatedRequest::new(model, Value::Object(body))
}

fn map_reasoning(req: &ChatRequest) -> Option<Value> {
    let features = &req.features;
    if let Some(effort) = features
        .reasoning_effort
        .as_deref()
        .map(str::trim)
        .filter(|effort| !effort.is_empty())
    {
        return Some(json!({ "effort": effort.to_ascii_lowercase() }));
    }
    if let Some(budget) = features.reasoning_budget {
        return Some(json!({ "max_tokens": budget }));
    }
    features.thinking.then(|| json!({ "enabled": true }))
}

#[cfg(test)]
mod tests;

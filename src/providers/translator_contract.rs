use std::collections::BTreeMap;

use serde_json::Value;

use crate::core::error::ProviderError;
use crate::core::types::{ChatCompletion, ChatRequest, ProviderId};
use crate::providers::anthropic_translate::AnthropicTranslator;
use crate::providers::gemini_translate::GeminiTranslator;
use crate::providers::openai_translate::OpenAiTranslator;
use crate::providers::openrouter_translate::OpenRouterTranslator;
use crate::stream::StreamNormalizer;

/// Provider-native request produced from a normalized [`ChatRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedRequest {
    /// Resolved upstream model id; also the metadata the response decoders need.
    pub model: String,
    pub body: Value,
    /// Protocol headers implied by the request itself (not credentials).
    pub headers: BTreeMap<String, String>,
}

impl TranslatedRequest {
    pub fn new(model: impl Into<String>, body: Value) -> Self {
        Self {
            model: model.into(),
            body,
            headers: BTreeMap::new(),
        }
    }
}

/// Per-provider translation contract.
///
/// `translate` is total: malformed optional input is dropped and a missing
/// model degrades to the provider default. Decoding covers the one-shot
/// response body; streaming bodies go through the normalizer.
pub trait ProviderTranslator: Send + Sync {
    fn provider(&self) -> ProviderId;

    fn translate(&self, req: &ChatRequest) -> TranslatedRequest;

    fn decode_response(&self, payload: &Value, model: &str)
    -> Result<ChatCompletion, ProviderError>;

    fn stream_normalizer(&self) -> Box<dyn StreamNormalizer>;
}

/// Translator for a provider. Translators are stateless, so one shared value
/// serves every request.
pub fn translator_for(provider: ProviderId) -> &'static dyn ProviderTranslator {
    match provider {
        ProviderId::Openrouter => &OpenRouterTranslator,
        ProviderId::Openai => &OpenAiTranslator,
        ProviderId::Anthropic => &AnthropicTranslator,
        ProviderId::Gemini => &GeminiTranslator,
    }
}

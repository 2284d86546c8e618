pub mod anthropic;
pub(crate) mod anthropic_translate;
pub mod gemini;
pub(crate) mod gemini_translate;
pub mod openai;
pub(crate) mod openai_translate;
pub mod openrouter;
pub(crate) mod openrouter_translate;
pub mod translator_contract;

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::error::ProviderError;
use crate::core::types::{ChatCompletion, ChatRequest};
use crate::stream::NormalizedEventStream;
use crate::transport::http::HttpTransport;

pub use anthropic::AnthropicAdapter;
pub use anthropic_translate::AnthropicTranslator;
pub use gemini::GeminiAdapter;
pub use gemini_translate::GeminiTranslator;
pub use openai::OpenAiAdapter;
pub use openai_translate::OpenAiTranslator;
pub use openrouter::OpenRouterAdapter;
pub use openrouter_translate::OpenRouterTranslator;
pub use translator_contract::{ProviderTranslator, TranslatedRequest, translator_for};

/// Where and how one translated request is sent.
pub(crate) struct Endpoint {
    pub(crate) url: String,
    pub(crate) headers: BTreeMap<String, String>,
}

/// Copy of `req` with the stream flag forced, borrowing when it already matches.
pub(crate) fn with_stream_flag(req: &ChatRequest, stream: bool) -> Cow<'_, ChatRequest> {
    if req.stream == stream {
        Cow::Borrowed(req)
    } else {
        let mut owned = req.clone();
        owned.stream = stream;
        Cow::Owned(owned)
    }
}

pub(crate) async fn send_completion(
    transport: &HttpTransport,
    translator: &dyn ProviderTranslator,
    translated: &TranslatedRequest,
    endpoint: Endpoint,
) -> Result<ChatCompletion, ProviderError> {
    let provider = translator.provider();
    tracing::debug!(provider = %provider, model = %translated.model, "sending completion request");

    let payload: Value = transport
        .post_json(
            provider,
            Some(&translated.model),
            &endpoint.url,
            &endpoint.headers,
            &translated.body,
        )
        .await?;

    translator.decode_response(&payload, &translated.model)
}

pub(crate) async fn open_stream(
    transport: &HttpTransport,
    translator: &dyn ProviderTranslator,
    translated: &TranslatedRequest,
    endpoint: Endpoint,
    cancel: CancellationToken,
) -> Result<NormalizedEventStream, ProviderError> {
    let provider = translator.provider();
    tracing::debug!(provider = %provider, model = %translated.model, "opening upstream stream");

    let body = transport
        .post_stream(
            provider,
            Some(&translated.model),
            &endpoint.url,
            &endpoint.headers,
            &translated.body,
        )
        .await?;

    Ok(NormalizedEventStream::new(
        body,
        translator.stream_normalizer(),
        cancel,
    ))
}

pub(crate) fn normalize_base_url(base_url: impl Into<String>, default: &str) -> String {
    let value = base_url.into();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return default.to_string();
    }

    trimmed.trim_end_matches('/').to_string()
}

pub(crate) fn sanitize_api_key(api_key: Option<String>) -> Option<String> {
    api_key.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

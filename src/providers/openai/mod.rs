use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::error::{ConfigError, ProviderError};
use crate::core::traits::ProviderAdapter;
use crate::core::types::{ChatCompletion, ChatRequest, ProviderId};
use crate::providers::openai_translate::OpenAiTranslator;
use crate::providers::translator_contract::ProviderTranslator;
use crate::providers::{
    Endpoint, normalize_base_url, open_stream, sanitize_api_key, send_completion,
    with_stream_flag,
};
use crate::stream::NormalizedEventStream;
use crate::transport::http::{DEFAULT_TIMEOUT_MS, HttpTransport};

pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

pub struct OpenAiAdapter {
    transport: HttpTransport,
    translator: OpenAiTranslator,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiAdapter {
    pub fn new(api_key: Option<String>) -> Result<Self, ConfigError> {
        Self::with_base_url(api_key, OPENAI_DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        api_key: Option<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(DEFAULT_TIMEOUT_MS)?;
        Ok(Self::with_transport(api_key, base_url, transport))
    }

    pub fn with_transport(
        api_key: Option<String>,
        base_url: impl Into<String>,
        transport: HttpTransport,
    ) -> Self {
        Self {
            transport,
            translator: OpenAiTranslator,
            base_url: normalize_base_url(base_url, OPENAI_DEFAULT_BASE_URL),
            api_key: sanitize_api_key(api_key),
        }
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn endpoint(&self) -> Result<Endpoint, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential {
                provider: ProviderId::Openai,
                env_var: OPENAI_API_KEY_ENV.to_string(),
            })?;

        let mut headers = BTreeMap::new();
        headers.insert("authorization".to_string(), format!("Bearer {api_key}"));

        Ok(Endpoint {
            url: self.chat_completions_url(),
            headers,
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Openai
    }

    async fn complete(&self, req: &ChatRequest) -> Result<ChatCompletion, ProviderError> {
        let endpoint = self.endpoint()?;
        let translated = self.translator.translate(&with_stream_flag(req, false));
        send_completion(&self.transport, &self.translator, &translated, endpoint).await
    }

    async fn stream(
        &self,
        req: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<NormalizedEventStream, ProviderError> {
        let endpoint = self.endpoint()?;
        let translated = self.translator.translate(&with_stream_flag(req, true));
        open_stream(
            &self.transport,
            &self.translator,
            &translated,
            endpoint,
            cancel,
        )
        .await
    }
}

#[cfg(test)]
mod tests;

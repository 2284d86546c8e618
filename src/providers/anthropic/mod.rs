use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::error::{ConfigError, ProviderError};
use crate::core::traits::ProviderAdapter;
use crate::core::types::{ChatCompletion, ChatRequest, ProviderId};
use crate::providers::anthropic_translate::AnthropicTranslator;
use crate::providers::translator_contract::{ProviderTranslator, TranslatedRequest};
use crate::providers::{
    Endpoint, normalize_base_url, open_stream, sanitize_api_key, send_completion,
    with_stream_flag,
};
use crate::stream::NormalizedEventStream;
use crate::transport::http::{DEFAULT_TIMEOUT_MS, HttpTransport};

pub const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    transport: HttpTransport,
    translator: AnthropicTranslator,
    base_url: String,
    api_key: Option<String>,
}

impl AnthropicAdapter {
    pub fn new(api_key: Option<String>) -> Result<Self, ConfigError> {
        Self::with_base_url(api_key, ANTHROPIC_DEFAULT_BASE_URL)
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
            translator: AnthropicTranslator,
            base_url: normalize_base_url(base_url, ANTHROPIC_DEFAULT_BASE_URL),
            api_key: sanitize_api_key(api_key),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential {
                provider: ProviderId::Anthropic,
                env_var: ANTHROPIC_API_KEY_ENV.to_string(),
            })
    }

    /// Credential and version headers plus whatever the translated request
    /// requires (the computed `anthropic-beta` list).
    fn endpoint(&self, api_key: &str, translated: &TranslatedRequest) -> Endpoint {
        let mut headers = BTreeMap::new();
        headers.insert("x-api-key".to_string(), api_key.to_string());
        headers.insert(
            "anthropic-version".to_string(),
            ANTHROPIC_VERSION.to_string(),
        );
        headers.extend(
            translated
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );

        Endpoint {
            url: self.messages_url(),
            headers,
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn complete(&self, req: &ChatRequest) -> Result<ChatCompletion, ProviderError> {
        let api_key = self.api_key()?;
        let translated = self.translator.translate(&with_stream_flag(req, false));
        let endpoint = self.endpoint(api_key, &translated);
        send_completion(&self.transport, &self.translator, &translated, endpoint).await
    }

    async fn stream(
        &self,
        req: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<NormalizedEventStream, ProviderError> {
        let api_key = self.api_key()?;
        let translated = self.translator.translate(&with_stream_flag(req, true));
        let endpoint = self.endpoint(api_key, &translated);
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

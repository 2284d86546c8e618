use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::error::{ConfigError, ProviderError};
use crate::core::traits::ProviderAdapter;
use crate::core::types::{ChatCompletion, ChatRequest, ProviderId};
use crate::providers::openrouter_translate::OpenRouterTranslator;
use crate::providers::translator_contract::ProviderTranslator;
use crate::providers::{
    Endpoint, normalize_base_url, open_stream, sanitize_api_key, send_completion,
    with_stream_flag,
};
use crate::stream::NormalizedEventStream;
use crate::transport::http::{DEFAULT_TIMEOUT_MS, HttpTransport};

pub const OPENROUTER_DEFAULT_BASE_URL: &str = "https://openrouter.ai";
pub const OPENROUTER_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

const HEADER_HTTP_REFERER: &str = "http-referer";
const HEADER_X_TITLE: &str = "x-title";

/// App attribution sent with every aggregator request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpenRouterAttribution {
    pub http_referer: Option<String>,
    pub x_title: Option<String>,
}

pub struct OpenRouterAdapter {
    transport: HttpTransport,
    translator: OpenRouterTranslator,
    base_url: String,
    api_key: Option<String>,
    attribution: OpenRouterAttribution,
}

impl OpenRouterAdapter {
    pub fn new(api_key: Option<String>) -> Result<Self, ConfigError> {
        Self::with_base_url(api_key, OPENROUTER_DEFAULT_BASE_URL)
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
            translator: OpenRouterTranslator,
            base_url: normalize_base_url(base_url, OPENROUTER_DEFAULT_BASE_URL),
            api_key: sanitize_api_key(api_key),
            attribution: OpenRouterAttribution::default(),
        }
    }

    pub fn with_attribution(mut self, attribution: OpenRouterAttribution) -> Self {
        self.attribution = attribution;
        self
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/api/v1/chat/completions", self.base_url)
    }

    fn endpoint(&self) -> Result<Endpoint, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential {
                provider: ProviderId::Openrouter,
                env_var: OPENROUTER_API_KEY_ENV.to_string(),
            })?;

        let mut headers = BTreeMap::new();
        headers.insert("authorization".to_string(), format!("Bearer {api_key}"));
        if let Some(referer) = &self.attribution.http_referer {
            headers.insert(HEADER_HTTP_REFERER.to_string(), referer.clone());
        }
        if let Some(title) = &self.attribution.x_title {
            headers.insert(HEADER_X_TITLE.to_string(), title.clone());
        }

        Ok(Endpoint {
            url: self.chat_completions_url(),
            headers,
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenRouterAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Openrouter
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

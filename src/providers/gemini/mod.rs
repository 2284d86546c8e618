use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::error::{ConfigError, ProviderError};
use crate::core::traits::ProviderAdapter;
use crate::core::types::{ChatCompletion, ChatRequest, ProviderId};
use crate::providers::gemini_translate::GeminiTranslator;
use crate::providers::translator_contract::{ProviderTranslator, TranslatedRequest};
use crate::providers::{
    Endpoint, normalize_base_url, open_stream, sanitize_api_key, send_completion,
    with_stream_flag,
};
use crate::stream::NormalizedEventStream;
use crate::transport::http::{DEFAULT_TIMEOUT_MS, HttpTransport};

pub const GEMINI_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Adapter for the Gemini `generateContent` API.
///
/// The key travels as a query parameter, so request URLs must never be logged;
/// transport errors are stripped of their URL before they surface.
pub struct GeminiAdapter {
    transport: HttpTransport,
    translator: GeminiTranslator,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiAdapter {
    pub fn new(api_key: Option<String>) -> Result<Self, ConfigError> {
        Self::with_base_url(api_key, GEMINI_DEFAULT_BASE_URL)
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
            translator: GeminiTranslator,
            base_url: normalize_base_url(base_url, GEMINI_DEFAULT_BASE_URL),
            api_key: sanitize_api_key(api_key),
        }
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential {
                provider: ProviderId::Gemini,
                env_var: GEMINI_API_KEY_ENV.to_string(),
            })
    }

    fn endpoint(&self, model: &str, stream: bool) -> Result<Endpoint, ProviderError> {
        let api_key = self.api_key()?;
        let model = model.strip_prefix("models/").unwrap_or(model);
        let url = if stream {
            format!(
                "{}/v1beta/models/{model}:streamGenerateContent?alt=sse&key={api_key}",
                self.base_url
            )
        } else {
            format!(
                "{}/v1beta/models/{model}:generateContent?key={api_key}",
                self.base_url
            )
        };

        Ok(Endpoint {
            url,
            headers: BTreeMap::new(),
        })
    }

    /// The model rides in the URL path; the API rejects it in the body.
    fn translate(&self, req: &ChatRequest, stream: bool) -> TranslatedRequest {
        let mut translated = self.translator.translate(&with_stream_flag(req, stream));
        if let Some(body) = translated.body.as_object_mut() {
            body.remove("model");
        }
        translated
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn complete(&self, req: &ChatRequest) -> Result<ChatCompletion, ProviderError> {
        self.api_key()?;
        let translated = self.translate(req, false);
        let endpoint = self.endpoint(&translated.model, false)?;
        send_completion(&self.transport, &self.translator, &translated, endpoint).await
    }

    async fn stream(
        &self,
        req: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<NormalizedEventStream, ProviderError> {
        self.api_key()?;
        let translated = self.translate(req, true);
        let endpoint = self.endpoint(&translated.model, true)?;
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

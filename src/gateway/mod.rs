use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::catalog;
use crate::config::GatewayConfig;
use crate::core::error::{GatewayError, ProviderError};
use crate::core::traits::ProviderAdapter;
use crate::core::types::{ChatCompletion, ChatRequest, ProviderId, generate_completion_id};
use crate::normalize::normalize_chat_request;
use crate::providers::openrouter::OpenRouterAttribution;
use crate::providers::{AnthropicAdapter, GeminiAdapter, OpenAiAdapter, OpenRouterAdapter};
use crate::routing::{self, RouteFlags};
use crate::stream::{NormalizedEventStream, SseEncoder};
use crate::transport::http::HttpTransport;
use crate::validation;

/// Outbound SSE frames, one complete `data: ...\n\n` string per item.
pub type SseFrames = BoxStream<'static, String>;

/// A request that passed normalization, routing and feature validation.
pub struct PreparedRequest {
    pub provider: ProviderId,
    pub request: ChatRequest,
    adapter: Arc<dyn ProviderAdapter>,
}

impl std::fmt::Debug for PreparedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedRequest")
            .field("provider", &self.provider)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

impl PreparedRequest {
    /// Upstream model id the translator will send.
    pub fn upstream_model(&self) -> String {
        catalog::resolve_upstream_model(self.provider, self.request.model_id())
    }
}

pub enum GatewayResponse {
    Completion(ChatCompletion),
    Stream(SseFrames),
}

pub struct Gateway {
    adapters: Vec<(ProviderId, Arc<dyn ProviderAdapter>)>,
}

#[derive(Default)]
pub struct GatewayBuilder {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    /// Gateway with one adapter per provider, all sharing a single HTTP client.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let transport = HttpTransport::new(config.timeout_ms)?;

        let openrouter = OpenRouterAdapter::with_transport(
            config.openrouter.api_key.clone(),
            config.openrouter.base_url.clone(),
            transport.clone(),
        )
        .with_attribution(OpenRouterAttribution {
            http_referer: config.http_referer.clone(),
            x_title: config.app_title.clone(),
        });
        let openai = OpenAiAdapter::with_transport(
            config.openai.api_key.clone(),
            config.openai.base_url.clone(),
            transport.clone(),
        );
        let anthropic = AnthropicAdapter::with_transport(
            config.anthropic.api_key.clone(),
            config.anthropic.base_url.clone(),
            transport.clone(),
        );
        let gemini = GeminiAdapter::with_transport(
            config.gemini.api_key.clone(),
            config.gemini.base_url.clone(),
            transport,
        );

        Ok(Self::builder()
            .with_adapter(Arc::new(openrouter))
            .with_adapter(Arc::new(openai))
            .with_adapter(Arc::new(anthropic))
            .with_adapter(Arc::new(gemini))
            .build())
    }

    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_config(&GatewayConfig::from_env()?)
    }

    /// Normalizes, routes and validates one inbound JSON body.
    ///
    /// Nothing is sent upstream; every rejection here happens before dispatch.
    pub fn prepare(&self, body: &Value) -> Result<PreparedRequest, GatewayError> {
        let mut request = normalize_chat_request(body)?;

        let provider = routing::route(
            request.model_id(),
            request.explicit_provider.as_deref(),
            RouteFlags {
                use_direct_api: request.use_direct_api,
            },
        );

        validation::apply_feature_defaults(provider, &mut request.features);
        let outcome = validation::validate(provider, &request.features);
        if !outcome.ok {
            tracing::debug!(
                provider = %provider,
                errors = ?outcome.errors,
                "feature validation failed"
            );
            return Err(GatewayError::FeatureValidation(outcome));
        }

        let adapter = self.resolve_adapter(provider)?;
        Ok(PreparedRequest {
            provider,
            request,
            adapter,
        })
    }

    pub async fn complete(&self, body: &Value) -> Result<ChatCompletion, GatewayError> {
        let prepared = self.prepare(body)?;
        self.complete_prepared(&prepared).await
    }

    pub async fn stream(
        &self,
        body: &Value,
        cancel: CancellationToken,
    ) -> Result<NormalizedEventStream, GatewayError> {
        let prepared = self.prepare(body)?;
        self.stream_prepared(&prepared, cancel).await
    }

    pub async fn complete_prepared(
        &self,
        prepared: &PreparedRequest,
    ) -> Result<ChatCompletion, GatewayError> {
        tracing::info!(
            provider = %prepared.provider,
            model = %prepared.upstream_model(),
            stream = false,
            "dispatching chat request"
        );

        prepared
            .adapter
            .complete(&prepared.request)
            .await
            .map_err(into_gateway_error)
    }

    pub async fn stream_prepared(
        &self,
        prepared: &PreparedRequest,
        cancel: CancellationToken,
    ) -> Result<NormalizedEventStream, GatewayError> {
        tracing::info!(
            provider = %prepared.provider,
            model = %prepared.upstream_model(),
            stream = true,
            "dispatching chat request"
        );

        prepared
            .adapter
            .stream(&prepared.request, cancel)
            .await
            .map_err(into_gateway_error)
    }

    /// Full inbound flow: a JSON completion, or SSE frames ending in `[DONE]`
    /// when the body asks to stream.
    pub async fn handle(
        &self,
        body: &Value,
        cancel: CancellationToken,
    ) -> Result<GatewayResponse, GatewayError> {
        let prepared = self.prepare(body)?;

        if !prepared.request.stream {
            return self
                .complete_prepared(&prepared)
                .await
                .map(GatewayResponse::Completion);
        }

        let events = self.stream_prepared(&prepared, cancel).await?;
        let mut encoder = SseEncoder::new(generate_completion_id(), prepared.upstream_model());
        let frames = events.map(move |event| encoder.encode(&event)).boxed();
        Ok(GatewayResponse::Stream(frames))
    }

    fn resolve_adapter(
        &self,
        provider: ProviderId,
    ) -> Result<Arc<dyn ProviderAdapter>, GatewayError> {
        self.adapters
            .iter()
            .find(|(registered, _)| *registered == provider)
            .map(|(_, adapter)| Arc::clone(adapter))
            .ok_or(GatewayError::ProviderNotRegistered { provider })
    }
}

impl GatewayBuilder {
    /// Registers an adapter, replacing any earlier one for the same provider.
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        let provider = adapter.id();
        self.adapters.retain(|existing| existing.id() != provider);
        self.adapters.push(adapter);
        self
    }

    pub fn build(self) -> Gateway {
        Gateway {
            adapters: self
                .adapters
                .into_iter()
                .map(|adapter| (adapter.id(), adapter))
                .collect(),
        }
    }
}

/// Missing keys name every variable that could supply them.
fn into_gateway_error(error: ProviderError) -> GatewayError {
    match error {
        ProviderError::MissingCredential { provider, .. } => GatewayError::credential_missing(
            provider,
            GatewayConfig::credential_env_candidates(provider),
        ),
        other => other.into(),
    }
}

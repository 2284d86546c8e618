use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Response;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::core::error::{ConfigError, ProviderError};
use crate::core::types::ProviderId;
use crate::stream::UpstreamBody;

const JSON_CONTENT_TYPE: &str = "application/json";

pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Single-shot HTTP client shared by every adapter.
///
/// Requests are sent exactly once. A non-2xx status comes back as
/// [`ProviderError::Status`] carrying the raw upstream body.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout_ms: u64,
}

impl HttpTransport {
    pub fn new(timeout_ms: u64) -> Result<Self, ConfigError> {
        Self::validate_timeout(timeout_ms)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|error| ConfigError::InvalidSetting {
                name: "http_client".to_string(),
                reason: error.to_string(),
            })?;

        Ok(Self { client, timeout_ms })
    }

    pub fn with_client(client: reqwest::Client, timeout_ms: u64) -> Result<Self, ConfigError> {
        Self::validate_timeout(timeout_ms)?;
        Ok(Self { client, timeout_ms })
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// POSTs `body` and decodes the JSON response, bounded by the configured timeout.
    pub async fn post_json(
        &self,
        provider: ProviderId,
        model: Option<&str>,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<Value, ProviderError> {
        let response = self
            .send(provider, model, url, headers, body, true)
            .await?;

        response
            .json::<Value>()
            .await
            .map_err(|error| ProviderError::Serialization {
                provider,
                model: model.map(str::to_string),
                message: error.without_url().to_string(),
            })
    }

    /// POSTs `body` and hands back the response body as a byte stream.
    ///
    /// No overall timeout applies; the stream lives as long as the upstream
    /// keeps sending. Dropping the returned stream closes the connection.
    pub async fn post_stream(
        &self,
        provider: ProviderId,
        model: Option<&str>,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<UpstreamBody, ProviderError> {
        let response = self
            .send(provider, model, url, headers, body, false)
            .await?;

        let model = model.map(str::to_string);
        Ok(response
            .bytes_stream()
            .map(move |chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|error| ProviderError::Transport {
                        provider,
                        model: model.clone(),
                        message: error.without_url().to_string(),
                    })
            })
            .boxed())
    }

    async fn send(
        &self,
        provider: ProviderId,
        model: Option<&str>,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Value,
        bounded: bool,
    ) -> Result<Response, ProviderError> {
        let header_map = build_header_map(provider, model, headers)?;
        let payload = serde_json::to_vec(body).map_err(|error| ProviderError::Serialization {
            provider,
            model: model.map(str::to_string),
            message: error.to_string(),
        })?;

        let mut request_builder = self.client.post(url).headers(header_map).body(payload);
        if bounded {
            request_builder = request_builder.timeout(Duration::from_millis(self.timeout_ms));
        }

        // Gemini carries its key in the query string, so URLs stay out of errors.
        let response = request_builder.send().await.map_err(|error| {
            let error = error.without_url();
            tracing::error!(
                provider = %provider,
                model = ?model,
                error = %error,
                "upstream request failed"
            );
            ProviderError::Transport {
                provider,
                model: model.map(str::to_string),
                message: error.to_string(),
            }
        })?;

        let status_code = response.status().as_u16();
        if !response.status().is_success() {
            return Err(build_status_error(provider, model, status_code, response).await);
        }

        Ok(response)
    }

    fn validate_timeout(timeout_ms: u64) -> Result<(), ConfigError> {
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout { timeout_ms });
        }
        Ok(())
    }
}

async fn build_status_error(
    provider: ProviderId,
    model: Option<&str>,
    status_code: u16,
    response: Response,
) -> ProviderError {
    let body = match response.text().await {
        Ok(body) if !body.trim().is_empty() => body,
        Ok(_) => format!("http status {status_code}"),
        Err(error) => {
            format!(
                "http status {status_code}; failed to read response body: {}",
                error.without_url()
            )
        }
    };

    tracing::warn!(provider = %provider, model = ?model, status_code, "upstream rejected request");

    ProviderError::Status {
        provider,
        model: model.map(str::to_string),
        status_code,
        body,
    }
}

fn build_header_map(
    provider: ProviderId,
    model: Option<&str>,
    headers: &BTreeMap<String, String>,
) -> Result<HeaderMap, ProviderError> {
    let mut header_map = HeaderMap::new();
    header_map.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));

    for (name, value) in headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|error| ProviderError::Protocol {
                provider,
                model: model.map(str::to_string),
                message: format!("invalid header name: {name}: {error}"),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|error| ProviderError::Protocol {
            provider,
            model: model.map(str::to_string),
            message: format!("invalid header value for {name}: {error}"),
        })?;
        header_map.insert(header_name, header_value);
    }

    Ok(header_map)
}

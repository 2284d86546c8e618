use serde_json::{Value, json};
use thiserror::Error;

use crate::core::types::ProviderId;
use crate::stream::NormalizedStreamEvent;
use crate::validation::FeatureValidation;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid timeout: {timeout_ms} ms")]
    InvalidTimeout { timeout_ms: u64 },
    #[error("invalid base url for {provider}: {url}")]
    InvalidBaseUrl { provider: ProviderId, url: String },
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("missing credential [provider={provider}, env={env_var}]")]
    MissingCredential {
        provider: ProviderId,
        env_var: String,
    },
    #[error(
        "provider transport error{context}: {message}",
        context = format_context(Some(.provider), .model.as_deref(), None)
    )]
    Transport {
        provider: ProviderId,
        model: Option<String>,
        message: String,
    },
    #[error(
        "provider status error{context}: {body}",
        context = format_context(Some(.provider), .model.as_deref(), Some(*.status_code))
    )]
    Status {
        provider: ProviderId,
        model: Option<String>,
        status_code: u16,
        body: String,
    },
    #[error(
        "provider protocol error{context}: {message}",
        context = format_context(Some(.provider), .model.as_deref(), None)
    )]
    Protocol {
        provider: ProviderId,
        model: Option<String>,
        message: String,
    },
    #[error(
        "provider serialization error{context}: {message}",
        context = format_context(Some(.provider), .model.as_deref(), None)
    )]
    Serialization {
        provider: ProviderId,
        model: Option<String>,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(
        "credential missing [provider={provider}{env_candidates}]",
        env_candidates = format_env_candidates(.env_candidates)
    )]
    CredentialMissing {
        provider: ProviderId,
        env_candidates: Vec<String>,
    },
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("unsupported features: {}", .0.errors.join("; "))]
    FeatureValidation(FeatureValidation),
    #[error("provider not registered: {provider}")]
    ProviderNotRegistered { provider: ProviderId },
    #[error(
        "upstream rejected request{context}: {body}",
        context = format_context(Some(.provider), .model.as_deref(), Some(*.status_code))
    )]
    UpstreamRejection {
        provider: ProviderId,
        model: Option<String>,
        status_code: u16,
        body: String,
    },
    #[error(
        "transport error{context}: {message}",
        context = format_context(.provider.as_ref(), .model.as_deref(), None)
    )]
    Transport {
        provider: Option<ProviderId>,
        model: Option<String>,
        message: String,
    },
    #[error(
        "provider protocol error{context}: {message}",
        context = format_context(.provider.as_ref(), .model.as_deref(), None)
    )]
    Protocol {
        provider: Option<ProviderId>,
        model: Option<String>,
        message: String,
    },
    #[error(
        "serialization error{context}: {message}",
        context = format_context(.provider.as_ref(), .model.as_deref(), None)
    )]
    Serialization {
        provider: Option<ProviderId>,
        model: Option<String>,
        message: String,
    },
}

impl GatewayError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn credential_missing(provider: ProviderId, mut env_candidates: Vec<String>) -> Self {
        env_candidates.retain(|candidate| !candidate.is_empty());
        env_candidates.sort_unstable();
        env_candidates.dedup();

        Self::CredentialMissing {
            provider,
            env_candidates,
        }
    }

    /// HTTP-equivalent status a route layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest { .. } | Self::FeatureValidation(_) => 400,
            Self::UpstreamRejection { status_code, .. } => *status_code,
            Self::Transport { .. } | Self::Protocol { .. } => 502,
            Self::Config(_)
            | Self::CredentialMissing { .. }
            | Self::ProviderNotRegistered { .. }
            | Self::Serialization { .. } => 500,
        }
    }

    /// Stable machine-readable error type, reused as the `type` of stream error events.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::CredentialMissing { .. } => "configuration_error",
            Self::InvalidRequest { .. } => "invalid_request_error",
            Self::FeatureValidation(_) => "validation_error",
            Self::ProviderNotRegistered { .. } => "routing_error",
            Self::UpstreamRejection { .. } => "upstream_error",
            Self::Transport { .. } => "transport_error",
            Self::Protocol { .. } => "protocol_error",
            Self::Serialization { .. } => "serialization_error",
        }
    }

    /// JSON body for a non-streaming error response.
    ///
    /// Upstream rejections pass the provider body through untouched when it is JSON.
    pub fn error_body(&self) -> Value {
        match self {
            Self::FeatureValidation(validation) => json!({
                "errors": validation.errors,
                "supported": validation.supported,
                "requested": validation.requested,
            }),
            Self::UpstreamRejection { body, .. } => {
                serde_json::from_str::<Value>(body).unwrap_or_else(|_| {
                    json!({ "error": { "message": body, "type": self.error_type() } })
                })
            }
            other => json!({
                "error": {
                    "message": other.to_string(),
                    "type": other.error_type(),
                }
            }),
        }
    }

    /// Single event a streaming caller surfaces when dispatch fails before streaming.
    pub fn error_event(&self) -> NormalizedStreamEvent {
        let message = match self {
            Self::UpstreamRejection { body, .. } => body.clone(),
            other => other.to_string(),
        };

        NormalizedStreamEvent::Error {
            message,
            error_type: self.error_type().to_string(),
        }
    }
}

impl From<ProviderError> for GatewayError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::MissingCredential { provider, env_var } => {
                Self::credential_missing(provider, vec![env_var])
            }
            ProviderError::Transport {
                provider,
                model,
                message,
            } => Self::Transport {
                provider: Some(provider),
                model,
                message,
            },
            ProviderError::Status {
                provider,
                model,
                status_code,
                body,
            } => Self::UpstreamRejection {
                provider,
                model,
                status_code,
                body,
            },
            ProviderError::Protocol {
                provider,
                model,
                message,
            } => Self::Protocol {
                provider: Some(provider),
                model,
                message,
            },
            ProviderError::Serialization {
                provider,
                model,
                message,
            } => Self::Serialization {
                provider: Some(provider),
                model,
                message,
            },
        }
    }
}

fn format_env_candidates(env_candidates: &[String]) -> String {
    if env_candidates.is_empty() {
        String::new()
    } else {
        format!(", env_candidates={}", env_candidates.join(", "))
    }
}

fn format_context(
    provider: Option<&ProviderId>,
    model: Option<&str>,
    status_code: Option<u16>,
) -> String {
    let mut context = Vec::new();

    if let Some(provider) = provider {
        context.push(format!("provider={provider}"));
    }
    if let Some(model) = model {
        context.push(format!("model={model}"));
    }
    if let Some(status_code) = status_code {
        context.push(format!("status_code={status_code}"));
    }

    if context.is_empty() {
        String::new()
    } else {
        format!(" [{}]", context.join(", "))
    }
}

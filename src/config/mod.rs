//! Environment-driven gateway configuration.
//!
//! Missing API keys are not configuration errors: adapters report them at
//! dispatch time, naming the variable the operator should set.

use crate::core::error::ConfigError;
use crate::core::types::ProviderId;
use crate::providers::anthropic::{ANTHROPIC_API_KEY_ENV, ANTHROPIC_DEFAULT_BASE_URL};
use crate::providers::gemini::{GEMINI_API_KEY_ENV, GEMINI_DEFAULT_BASE_URL};
use crate::providers::openai::{OPENAI_API_KEY_ENV, OPENAI_DEFAULT_BASE_URL};
use crate::providers::openrouter::{OPENROUTER_API_KEY_ENV, OPENROUTER_DEFAULT_BASE_URL};
use crate::transport::http::DEFAULT_TIMEOUT_MS;

pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const TIMEOUT_MS_ENV: &str = "GATEWAY_TIMEOUT_MS";
pub const HTTP_REFERER_ENV: &str = "GATEWAY_HTTP_REFERER";
pub const APP_TITLE_ENV: &str = "GATEWAY_APP_TITLE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub openrouter: ProviderSettings,
    pub openai: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub gemini: ProviderSettings,
    /// Timeout for non-streaming upstream requests.
    pub timeout_ms: u64,
    pub http_referer: Option<String>,
    pub app_title: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            openrouter: ProviderSettings::unkeyed(OPENROUTER_DEFAULT_BASE_URL),
            openai: ProviderSettings::unkeyed(OPENAI_DEFAULT_BASE_URL),
            anthropic: ProviderSettings::unkeyed(ANTHROPIC_DEFAULT_BASE_URL),
            gemini: ProviderSettings::unkeyed(GEMINI_DEFAULT_BASE_URL),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            http_referer: None,
            app_title: None,
        }
    }
}

impl ProviderSettings {
    fn unkeyed(base_url: &str) -> Self {
        Self {
            api_key: None,
            base_url: base_url.to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let provider = |id: ProviderId, key_env: &str, url_env: &str, default_url: &str| {
            let base_url = match read(url_env) {
                Some(url) => validate_base_url(id, url)?,
                None => default_url.to_string(),
            };
            Ok::<_, ConfigError>(ProviderSettings {
                api_key: read(key_env),
                base_url,
            })
        };

        let mut gemini = provider(
            ProviderId::Gemini,
            GEMINI_API_KEY_ENV,
            "GEMINI_BASE_URL",
            GEMINI_DEFAULT_BASE_URL,
        )?;
        if gemini.api_key.is_none() {
            gemini.api_key = read(GOOGLE_API_KEY_ENV);
        }

        let timeout_ms = match read(TIMEOUT_MS_ENV) {
            Some(raw) => parse_timeout(&raw)?,
            None => DEFAULT_TIMEOUT_MS,
        };

        Ok(Self {
            openrouter: provider(
                ProviderId::Openrouter,
                OPENROUTER_API_KEY_ENV,
                "OPENROUTER_BASE_URL",
                OPENROUTER_DEFAULT_BASE_URL,
            )?,
            openai: provider(
                ProviderId::Openai,
                OPENAI_API_KEY_ENV,
                "OPENAI_BASE_URL",
                OPENAI_DEFAULT_BASE_URL,
            )?,
            anthropic: provider(
                ProviderId::Anthropic,
                ANTHROPIC_API_KEY_ENV,
                "ANTHROPIC_BASE_URL",
                ANTHROPIC_DEFAULT_BASE_URL,
            )?,
            gemini,
            timeout_ms,
            http_referer: read(HTTP_REFERER_ENV),
            app_title: read(APP_TITLE_ENV),
        })
    }

    pub fn provider(&self, id: ProviderId) -> &ProviderSettings {
        match id {
            ProviderId::Openrouter => &self.openrouter,
            ProviderId::Openai => &self.openai,
            ProviderId::Anthropic => &self.anthropic,
            ProviderId::Gemini => &self.gemini,
        }
    }

    /// Variables an operator may set to supply the key for `id`.
    pub fn credential_env_candidates(id: ProviderId) -> Vec<String> {
        let candidates: &[&str] = match id {
            ProviderId::Openrouter => &[OPENROUTER_API_KEY_ENV],
            ProviderId::Openai => &[OPENAI_API_KEY_ENV],
            ProviderId::Anthropic => &[ANTHROPIC_API_KEY_ENV],
            ProviderId::Gemini => &[GEMINI_API_KEY_ENV, GOOGLE_API_KEY_ENV],
        };
        candidates.iter().map(|name| name.to_string()).collect()
    }
}

fn validate_base_url(provider: ProviderId, url: String) -> Result<String, ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(ConfigError::InvalidBaseUrl { provider, url })
    }
}

fn parse_timeout(raw: &str) -> Result<u64, ConfigError> {
    let timeout_ms = raw
        .parse::<u64>()
        .map_err(|error| ConfigError::InvalidSetting {
            name: TIMEOUT_MS_ENV.to_string(),
            reason: error.to_string(),
        })?;

    if timeout_ms == 0 {
        return Err(ConfigError::InvalidTimeout { timeout_ms });
    }
    Ok(timeout_ms)
}

use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::core::types::{FeatureFlags, ProviderCapabilities, ProviderId};

/// Provider-hosted features that must be checked against the capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatedFeature {
    WebSearch,
    CodeExecution,
    UrlContext,
}

impl GatedFeature {
    const ALL: [GatedFeature; 3] = [
        GatedFeature::WebSearch,
        GatedFeature::CodeExecution,
        GatedFeature::UrlContext,
    ];

    fn requested(self, flags: &FeatureFlags) -> bool {
        match self {
            Self::WebSearch => flags.web_search,
            Self::CodeExecution => flags.code_execution,
            Self::UrlContext => flags.url_context_enabled(),
        }
    }

    fn supported_by(self, capabilities: &ProviderCapabilities) -> bool {
        match self {
            Self::WebSearch => capabilities.web_search,
            Self::CodeExecution => capabilities.code_execution,
            Self::UrlContext => capabilities.url_context,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::WebSearch => "Web search",
            Self::CodeExecution => "Code execution",
            Self::UrlContext => "URL context",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureValidation {
    pub ok: bool,
    pub errors: Vec<String>,
    pub supported: Vec<GatedFeature>,
    pub requested: Vec<GatedFeature>,
}

/// Cross-checks requested gated features against the provider's capability entry.
pub fn validate(provider: ProviderId, flags: &FeatureFlags) -> FeatureValidation {
    let capabilities = catalog::capabilities(provider);
    let mut errors = Vec::new();
    let mut supported = Vec::new();
    let mut requested = Vec::new();

    for feature in GatedFeature::ALL {
        if !feature.requested(flags) {
            continue;
        }
        requested.push(feature);

        if feature.supported_by(&capabilities) {
            supported.push(feature);
        } else {
            errors.push(rejection_reason(feature, provider));
        }
    }

    FeatureValidation {
        ok: errors.is_empty(),
        errors,
        supported,
        requested,
    }
}

/// Turns on URL context alongside web search when the caller left it unset and
/// the provider supports both.
pub fn apply_feature_defaults(provider: ProviderId, flags: &mut FeatureFlags) {
    let capabilities = catalog::capabilities(provider);
    if flags.web_search
        && flags.url_context.is_none()
        && capabilities.web_search
        && capabilities.url_context
    {
        flags.url_context = Some(true);
    }
}

fn rejection_reason(feature: GatedFeature, provider: ProviderId) -> String {
    let base = format!("{} is not supported by {provider}", feature.label());
    if feature == GatedFeature::WebSearch {
        return base;
    }

    let alternatives = catalog::providers_supporting(|caps| feature.supported_by(caps))
        .into_iter()
        .map(ProviderId::as_str)
        .collect::<Vec<_>>();

    if alternatives.is_empty() {
        base
    } else {
        format!("{base}. Supported providers: {}", alternatives.join(", "))
    }
}

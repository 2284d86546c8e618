//! Static, read-only provider tables.
//!
//! Both tables are plain `static` data: they are built at compile time, never
//! mutated, and shared by every in-flight request without synchronization.

use crate::core::types::{ProviderCapabilities, ProviderId};

/// Upstream id used by the aggregator when the caller names no model at all.
pub const GLOBAL_DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

struct CatalogEntry {
    provider: ProviderId,
    capabilities: ProviderCapabilities,
    default_model: &'static str,
    prefixes: &'static [&'static str],
    models: &'static [(&'static str, &'static str)],
}

static CATALOG: [CatalogEntry; 4] = [
    CatalogEntry {
        provider: ProviderId::Openrouter,
        capabilities: ProviderCapabilities {
            web_search: true,
            code_execution: false,
            url_context: false,
        },
        default_model: GLOBAL_DEFAULT_MODEL,
        prefixes: &[],
        models: &[],
    },
    CatalogEntry {
        provider: ProviderId::Openai,
        capabilities: ProviderCapabilities {
            web_search: true,
            code_execution: false,
            url_context: false,
        },
        default_model: "gpt-4o-mini",
        prefixes: &["openai/"],
        models: &[
            ("gpt-4o", "gpt-4o"),
            ("gpt-4o-mini", "gpt-4o-mini"),
            ("gpt-4.1", "gpt-4.1"),
            ("gpt-4.1-mini", "gpt-4.1-mini"),
            ("gpt-5", "gpt-5"),
            ("gpt-5-mini", "gpt-5-mini"),
            ("o1", "o1"),
            ("o3", "o3"),
            ("o3-mini", "o3-mini"),
            ("o4-mini", "o4-mini"),
        ],
    },
    CatalogEntry {
        provider: ProviderId::Anthropic,
        capabilities: ProviderCapabilities {
            web_search: true,
            code_execution: true,
            url_context: true,
        },
        default_model: "claude-sonnet-4-20250514",
        prefixes: &["anthropic/"],
        models: &[
            ("claude-opus-4", "claude-opus-4-20250514"),
            ("claude-opus-4.1", "claude-opus-4-1-20250805"),
            ("claude-sonnet-4", "claude-sonnet-4-20250514"),
            ("claude-sonnet-4.5", "claude-sonnet-4-5-20250929"),
            ("claude-3.7-sonnet", "claude-3-7-sonnet-20250219"),
            ("claude-3-7-sonnet", "claude-3-7-sonnet-20250219"),
            ("claude-3.5-haiku", "claude-3-5-haiku-20241022"),
            ("claude-3-5-haiku", "claude-3-5-haiku-20241022"),
            ("claude-3-opus", "claude-3-opus-20240229"),
        ],
    },
    CatalogEntry {
        provider: ProviderId::Gemini,
        capabilities: ProviderCapabilities {
            web_search: true,
            code_execution: true,
            url_context: true,
        },
        default_model: "gemini-2.5-flash",
        prefixes: &["google/"],
        models: &[
            ("gemini-2.5-pro", "gemini-2.5-pro"),
            ("gemini-2.5-flash", "gemini-2.5-flash"),
            ("gemini-2.5-flash-lite", "gemini-2.5-flash-lite"),
            ("gemini-2.0-flash", "gemini-2.0-flash"),
            ("gemini-2.5-flash-image", "gemini-2.5-flash-image-preview"),
        ],
    },
];

fn entry(provider: ProviderId) -> &'static CatalogEntry {
    CATALOG
        .iter()
        .find(|entry| entry.provider == provider)
        .unwrap_or(&CATALOG[0])
}

pub fn capabilities(provider: ProviderId) -> ProviderCapabilities {
    entry(provider).capabilities
}

pub fn default_model(provider: ProviderId) -> &'static str {
    entry(provider).default_model
}

/// Providers whose capability entry satisfies `predicate`, in catalog order.
pub fn providers_supporting(predicate: impl Fn(&ProviderCapabilities) -> bool) -> Vec<ProviderId> {
    CATALOG
        .iter()
        .filter(|entry| predicate(&entry.capabilities))
        .map(|entry| entry.provider)
        .collect()
}

/// Resolves a logical (possibly provider-prefixed) model name to the id the
/// upstream API expects.
///
/// Missing ids degrade to the provider default and unknown ids pass through,
/// so resolution never fails.
pub fn resolve_upstream_model(provider: ProviderId, model: Option<&str>) -> String {
    let entry = entry(provider);
    let Some(model) = model.map(str::trim).filter(|model| !model.is_empty()) else {
        return entry.default_model.to_string();
    };

    let stripped = entry
        .prefixes
        .iter()
        .find_map(|prefix| strip_prefix_ignore_case(model, prefix))
        .unwrap_or(model);

    if stripped.is_empty() {
        return entry.default_model.to_string();
    }

    entry
        .models
        .iter()
        .find(|(logical, _)| logical.eq_ignore_ascii_case(stripped))
        .map(|(_, upstream)| (*upstream).to_string())
        .unwrap_or_else(|| stripped.to_string())
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        value.get(prefix.len()..)
    } else {
        None
    }
}

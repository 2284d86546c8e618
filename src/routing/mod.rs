use crate::core::types::ProviderId;

/// Routing inputs beyond the model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteFlags {
    /// Send OpenAI-family models to the OpenAI API instead of the aggregator.
    pub use_direct_api: bool,
}

/// Picks the upstream provider for a request.
///
/// Total and deterministic. A recognised model prefix always wins over the
/// explicit provider hint; the hint is only consulted for models no prefix
/// claims, and everything else goes to the aggregator.
pub fn route(
    model: Option<&str>,
    explicit_provider: Option<&str>,
    flags: RouteFlags,
) -> ProviderId {
    let Some(model) = model.map(str::trim).filter(|model| !model.is_empty()) else {
        return ProviderId::Openrouter;
    };

    if let Some(provider) = provider_for_prefix(model) {
        if provider == ProviderId::Openai && !flags.use_direct_api {
            return ProviderId::Openrouter;
        }
        return provider;
    }

    explicit_provider
        .and_then(ProviderId::parse)
        .unwrap_or(ProviderId::Openrouter)
}

const GEMINI_PREFIXES: &[&str] = &["gemini", "google/"];
const ANTHROPIC_PREFIXES: &[&str] = &["claude", "anthropic/"];
const OPENAI_PREFIXES: &[&str] = &["gpt", "o1", "o3", "o4", "openai/"];

fn provider_for_prefix(model: &str) -> Option<ProviderId> {
    let lowered = model.to_ascii_lowercase();
    let matches = |prefixes: &[&str]| prefixes.iter().any(|prefix| lowered.starts_with(prefix));

    if matches(GEMINI_PREFIXES) {
        Some(ProviderId::Gemini)
    } else if matches(ANTHROPIC_PREFIXES) {
        Some(ProviderId::Anthropic)
    } else if matches(OPENAI_PREFIXES) {
        Some(ProviderId::Openai)
    } else {
        None
    }
}

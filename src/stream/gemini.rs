//! Gemini `streamGenerateContent` normalizer.
//!
//! The body is a run of `GenerateContentResponse` objects with no reliable
//! framing, so objects are located with [`JsonObjectScanner`] and then decoded
//! into the typed response below.

use indexmap::IndexSet;
use serde::Deserialize;

use super::scanner::JsonObjectScanner;
use super::{ExecutionOutcome, NormalizedStreamEvent, StreamNormalizer};
use crate::core::types::Source;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiResponse {
    #[serde(default)]
    pub(crate) candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub(crate) usage_metadata: Option<GeminiUsage>,
    #[serde(default)]
    pub(crate) error: Option<GeminiErrorBody>,
    #[serde(default)]
    pub(crate) response_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiCandidate {
    #[serde(default)]
    pub(crate) content: Option<GeminiContent>,
    #[serde(default)]
    pub(crate) finish_reason: Option<String>,
    #[serde(default)]
    pub(crate) grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GeminiContent {
    #[serde(default)]
    pub(crate) parts: Vec<GeminiPart>,
}

/// One response part. Gemini marks reasoning either with `thought: true` on a
/// text part or with the thought text itself.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiPart {
    #[serde(default)]
    pub(crate) text: Option<String>,
    #[serde(default)]
    pub(crate) thought: Option<Thought>,
    #[serde(default)]
    pub(crate) function_call: Option<GeminiFunctionCall>,
    #[serde(default)]
    pub(crate) executable_code: Option<ExecutableCode>,
    #[serde(default)]
    pub(crate) code_execution_result: Option<CodeExecutionResult>,
    #[serde(default)]
    pub(crate) inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Thought {
    Flag(bool),
    Text(String),
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiFunctionCall {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) args: serde_json::Value,
    #[serde(default)]
    pub(crate) id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExecutableCode {
    #[serde(default)]
    pub(crate) language: Option<String>,
    #[serde(default)]
    pub(crate) code: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CodeExecutionResult {
    #[serde(default)]
    pub(crate) outcome: Option<String>,
    #[serde(default)]
    pub(crate) output: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineData {
    pub(crate) mime_type: String,
    pub(crate) data: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GroundingMetadata {
    #[serde(default)]
    pub(crate) grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GroundingChunk {
    #[serde(default)]
    pub(crate) web: Option<WebChunk>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WebChunk {
    #[serde(default)]
    pub(crate) uri: Option<String>,
    #[serde(default)]
    pub(crate) title: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiUsage {
    #[serde(default)]
    pub(crate) prompt_token_count: u64,
    #[serde(default)]
    pub(crate) candidates_token_count: u64,
    #[serde(default)]
    pub(crate) thoughts_token_count: u64,
}

impl GeminiUsage {
    pub(crate) fn completion_tokens(&self) -> u64 {
        self.candidates_token_count + self.thoughts_token_count
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GeminiErrorBody {
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<String>,
}

impl GeminiErrorBody {
    pub(crate) fn to_event(&self) -> NormalizedStreamEvent {
        NormalizedStreamEvent::Error {
            message: self
                .message
                .clone()
                .unwrap_or_else(|| "upstream stream error".to_string()),
            error_type: self
                .status
                .as_deref()
                .map(str::to_ascii_lowercase)
                .unwrap_or_else(|| "upstream_error".to_string()),
        }
    }
}

/// Classified view of a part, in the order the checks are applied.
pub(crate) enum PartKind<'a> {
    Reasoning(&'a str),
    Text(&'a str),
    FunctionCall(&'a GeminiFunctionCall),
    ExecutableCode(&'a ExecutableCode),
    ExecutionResult(&'a CodeExecutionResult),
    Image(&'a InlineData),
    Other,
}

impl GeminiPart {
    pub(crate) fn kind(&self) -> PartKind<'_> {
        match (&self.thought, &self.text) {
            (Some(Thought::Text(thought)), _) => return PartKind::Reasoning(thought),
            (Some(Thought::Flag(true)), Some(text)) => return PartKind::Reasoning(text),
            (_, Some(text)) => return PartKind::Text(text),
            _ => {}
        }

        if let Some(call) = &self.function_call {
            PartKind::FunctionCall(call)
        } else if let Some(code) = &self.executable_code {
            PartKind::ExecutableCode(code)
        } else if let Some(result) = &self.code_execution_result {
            PartKind::ExecutionResult(result)
        } else if let Some(data) = self
            .inline_data
            .as_ref()
            .filter(|data| data.mime_type.starts_with("image/"))
        {
            PartKind::Image(data)
        } else {
            PartKind::Other
        }
    }
}

impl ExecutableCode {
    pub(crate) fn language(&self) -> String {
        self.language
            .as_deref()
            .unwrap_or("python")
            .to_ascii_lowercase()
    }
}

impl CodeExecutionResult {
    pub(crate) fn outcome(&self) -> ExecutionOutcome {
        match self.outcome.as_deref() {
            Some("OUTCOME_OK") => ExecutionOutcome::Ok,
            _ => ExecutionOutcome::Error,
        }
    }
}

impl GeminiCandidate {
    pub(crate) fn sources(&self) -> Vec<Source> {
        self.grounding_metadata
            .iter()
            .flat_map(|metadata| &metadata.grounding_chunks)
            .filter_map(|chunk| chunk.web.as_ref())
            .filter_map(|web| {
                let url = web.uri.clone()?;
                Some(Source {
                    title: web.title.clone().unwrap_or_else(|| url.clone()),
                    url,
                })
            })
            .collect()
    }
}

/// Fresh id for a function call; Gemini rarely supplies one.
pub(crate) fn synthesize_call_id() -> String {
    format!("call_{:016x}", rand::random::<u64>())
}

/// Maps a Gemini `finishReason` to the normalized finish reason.
pub fn map_finish_reason(reason: &str, emitted_function_call: bool) -> String {
    match reason {
        "STOP" if emitted_function_call => "tool_calls".to_string(),
        "STOP" => "stop".to_string(),
        "MAX_TOKENS" => "length".to_string(),
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            "content_filter".to_string()
        }
        other => other.to_ascii_lowercase(),
    }
}

#[derive(Debug, Default)]
pub struct GeminiStreamNormalizer {
    scanner: JsonObjectScanner,
    seen_sources: IndexSet<String>,
    emitted_function_call: bool,
    usage: Option<GeminiUsage>,
    ended: bool,
}

impl GeminiStreamNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle_object(&mut self, raw: &[u8], events: &mut Vec<NormalizedStreamEvent>) {
        let response = match serde_json::from_slice::<GeminiResponse>(raw) {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(error = %error, "dropping unparsable gemini object");
                return;
            }
        };

        if let Some(error) = &response.error {
            events.push(error.to_event());
        }

        if let Some(usage) = response.usage_metadata {
            self.usage = Some(usage);
        }

        let Some(candidate) = response.candidates.first() else {
            return;
        };

        let parts = candidate
            .content
            .as_ref()
            .map(|content| content.parts.as_slice())
            .unwrap_or_default();
        for part in parts {
            self.handle_part(part, events);
        }

        let sources = candidate
            .sources()
            .into_iter()
            .filter(|source| self.seen_sources.insert(source.url.clone()))
            .collect::<Vec<_>>();
        if !sources.is_empty() {
            events.push(NormalizedStreamEvent::Sources(sources));
        }

        if let Some(reason) = &candidate.finish_reason {
            events.push(NormalizedStreamEvent::FinishReason(map_finish_reason(
                reason,
                self.emitted_function_call,
            )));
        }
    }

    fn handle_part(&mut self, part: &GeminiPart, events: &mut Vec<NormalizedStreamEvent>) {
        match part.kind() {
            PartKind::Reasoning(text) if !text.is_empty() => {
                events.push(NormalizedStreamEvent::ReasoningDelta(text.to_string()));
            }
            PartKind::Text(text) if !text.is_empty() => {
                events.push(NormalizedStreamEvent::ContentDelta(text.to_string()));
            }
            PartKind::FunctionCall(call) => {
                let id = call.id.clone().unwrap_or_else(synthesize_call_id);
                let arguments = if call.args.is_object() {
                    call.args.to_string()
                } else {
                    "{}".to_string()
                };
                self.emitted_function_call = true;
                events.push(NormalizedStreamEvent::ToolCallDelta {
                    id: id.clone(),
                    name: call.name.clone(),
                    arguments: arguments.clone(),
                });
                events.push(NormalizedStreamEvent::ToolCallComplete {
                    id,
                    name: call.name.clone(),
                    arguments,
                });
            }
            PartKind::ExecutableCode(code) => events.push(NormalizedStreamEvent::CodeExecution {
                language: code.language(),
                code: code.code.clone(),
            }),
            PartKind::ExecutionResult(result) => {
                events.push(NormalizedStreamEvent::CodeExecutionResult {
                    outcome: result.outcome(),
                    output: result.output.clone().unwrap_or_default(),
                })
            }
            PartKind::Image(data) => events.push(NormalizedStreamEvent::ImageGenerated {
                mime_type: data.mime_type.clone(),
                data: data.data.clone(),
            }),
            PartKind::Reasoning(_) | PartKind::Text(_) | PartKind::Other => {}
        }
    }
}

impl StreamNormalizer for GeminiStreamNormalizer {
    fn consume(&mut self, chunk: &[u8]) -> Vec<NormalizedStreamEvent> {
        let mut events = Vec::new();
        if self.ended {
            return events;
        }
        for object in self.scanner.push(chunk) {
            self.handle_object(&object, &mut events);
        }
        events
    }

    fn flush(&mut self) -> Vec<NormalizedStreamEvent> {
        if self.ended {
            return Vec::new();
        }
        self.ended = true;

        if self.scanner.has_partial_object() {
            let dropped = self.scanner.reset();
            tracing::debug!(bytes = dropped, "discarding trailing partial gemini object");
        }

        let mut events = Vec::new();
        if let Some(usage) = self.usage.take() {
            events.push(NormalizedStreamEvent::Usage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.completion_tokens(),
            });
        }
        events.push(NormalizedStreamEvent::StreamEnd);
        events
    }
}

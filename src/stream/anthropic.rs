//! Anthropic Messages SSE stream normalizer.
//!
//! Events are decoded into tagged variants and folded into per-block state keyed
//! by the content block index.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::lines::{LineBuffer, sse_data};
use super::{ExecutionOutcome, NormalizedStreamEvent, StreamNormalizer};
use crate::core::types::Source;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    MessageStart {
        message: MessageStartBody,
    },
    ContentBlockStart {
        index: u32,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<UsageBody>,
    },
    Error {
        error: ErrorBody,
    },
    #[serde(
        rename = "code_execution_tool_result",
        alias = "bash_code_execution_tool_result",
        alias = "bash_code_execution_result",
        alias = "text_editor_code_execution_tool_result",
        alias = "text_editor_code_execution_result"
    )]
    ExecutionResult(ExecutionResult),
    #[serde(rename = "web_fetch_tool_result")]
    WebFetchResult(WebFetchResult),
    #[serde(rename = "web_search_tool_result")]
    WebSearchResult(WebSearchResult),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageStartBody {
    #[serde(default)]
    usage: Option<UsageBody>,
}

#[derive(Debug, Default, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub(crate) struct UsageBody {
    #[serde(default)]
    pub(crate) input_tokens: Option<u64>,
    #[serde(default)]
    pub(crate) output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ServerToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(
        rename = "code_execution_tool_result",
        alias = "bash_code_execution_tool_result",
        alias = "text_editor_code_execution_tool_result"
    )]
    ExecutionResult(ExecutionResult),
    #[serde(rename = "web_fetch_tool_result")]
    WebFetchResult(WebFetchResult),
    #[serde(rename = "web_search_tool_result")]
    WebSearchResult(WebSearchResult),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Unknown,
}

/// Output of a provider-hosted execution tool. Fields may sit on the result
/// itself or one level down under `content`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ExecutionResult {
    #[serde(default)]
    content: Value,
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    return_code: Option<i64>,
    #[serde(default)]
    exit_code: Option<i64>,
    #[serde(default)]
    error_code: Option<String>,
}

impl ExecutionResult {
    /// OK iff the exit code is zero or stdout is present.
    pub(crate) fn outcome(&self) -> (ExecutionOutcome, String) {
        if self.content.is_object() {
            if let Ok(nested) = ExecutionResult::deserialize(&self.content) {
                if nested.has_output() {
                    return nested.outcome();
                }
            }
        }

        let stdout = self.stdout.clone().unwrap_or_default();
        let code = self.exit_code.or(self.return_code);
        let outcome = if code == Some(0) || !stdout.is_empty() {
            ExecutionOutcome::Ok
        } else {
            ExecutionOutcome::Error
        };

        let output = [
            Some(stdout),
            self.stderr.clone(),
            self.error_code.clone(),
        ]
        .into_iter()
        .flatten()
        .find(|text| !text.is_empty())
        .unwrap_or_default();

        (outcome, output)
    }

    fn has_output(&self) -> bool {
        self.stdout.is_some()
            || self.stderr.is_some()
            || self.return_code.is_some()
            || self.exit_code.is_some()
            || self.error_code.is_some()
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WebFetchResult {
    #[serde(default)]
    content: Option<WebFetchContent>,
}

#[derive(Debug, Default, Deserialize)]
struct WebFetchContent {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: Option<WebFetchDocument>,
}

#[derive(Debug, Default, Deserialize)]
struct WebFetchDocument {
    #[serde(default)]
    title: Option<String>,
}

impl WebFetchResult {
    pub(crate) fn sources(&self) -> Vec<Source> {
        self.content
            .as_ref()
            .and_then(|content| {
                let url = content.url.clone()?;
                let title = content
                    .content
                    .as_ref()
                    .and_then(|document| document.title.clone())
                    .unwrap_or_else(|| url.clone());
                Some(Source { title, url })
            })
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WebSearchResult {
    #[serde(default)]
    content: Value,
}

#[derive(Debug, Deserialize)]
struct WebSearchHit {
    url: String,
    #[serde(default)]
    title: Option<String>,
}

impl WebSearchResult {
    /// Search hits; an error payload in place of the hit list yields none.
    pub(crate) fn sources(&self) -> Vec<Source> {
        Vec::<WebSearchHit>::deserialize(&self.content)
            .unwrap_or_default()
            .into_iter()
            .map(|hit| Source {
                title: hit.title.unwrap_or_else(|| hit.url.clone()),
                url: hit.url,
            })
            .collect()
    }
}

/// Maps an Anthropic `stop_reason` to the normalized finish reason.
pub fn map_stop_reason(stop_reason: &str) -> String {
    match stop_reason {
        "end_turn" => "stop".to_string(),
        other => other.to_string(),
    }
}

/// Turns a server tool invocation into a code execution event, when it is one.
pub(crate) fn server_tool_execution(name: &str, input: &Value) -> Option<NormalizedStreamEvent> {
    let (language, field) = match name {
        "code_execution" => ("python", "code"),
        "bash_code_execution" => ("bash", "command"),
        _ => return None,
    };

    let code = input.get(field).and_then(Value::as_str)?;
    Some(NormalizedStreamEvent::CodeExecution {
        language: language.to_string(),
        code: code.to_string(),
    })
}

#[derive(Debug)]
enum OpenBlock {
    Text,
    Thinking,
    Tool {
        id: String,
        name: String,
        arguments: String,
    },
    ServerTool {
        name: String,
        input: String,
    },
}

#[derive(Debug, Default)]
pub struct AnthropicStreamNormalizer {
    lines: LineBuffer,
    blocks: HashMap<u32, OpenBlock>,
    prompt_tokens: u64,
    ended: bool,
}

impl AnthropicStreamNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<NormalizedStreamEvent>) {
        let Some(payload) = sse_data(line) else {
            return;
        };

        match serde_json::from_str::<AnthropicEvent>(payload) {
            Ok(event) => self.handle_event(event, events),
            Err(error) => {
                tracing::debug!(error = %error, "dropping malformed anthropic event");
            }
        }
    }

    fn handle_event(&mut self, event: AnthropicEvent, events: &mut Vec<NormalizedStreamEvent>) {
        match event {
            AnthropicEvent::MessageStart { message } => {
                if let Some(input_tokens) = message.usage.and_then(|usage| usage.input_tokens) {
                    self.prompt_tokens = input_tokens;
                }
            }
            AnthropicEvent::ContentBlockStart {
                index,
                content_block,
            } => self.open_block(index, content_block, events),
            AnthropicEvent::ContentBlockDelta { index, delta } => {
                self.apply_delta(index, delta, events)
            }
            AnthropicEvent::ContentBlockStop { index } => self.close_block(index, events),
            AnthropicEvent::MessageDelta { delta, usage } => {
                if let Some(stop_reason) = delta.stop_reason {
                    events.push(NormalizedStreamEvent::FinishReason(map_stop_reason(
                        &stop_reason,
                    )));
                }
                if let Some(usage) = usage {
                    events.push(NormalizedStreamEvent::Usage {
                        prompt_tokens: usage.input_tokens.unwrap_or(self.prompt_tokens),
                        completion_tokens: usage.output_tokens.unwrap_or_default(),
                    });
                }
            }
            AnthropicEvent::Error { error } => events.push(NormalizedStreamEvent::Error {
                message: error
                    .message
                    .unwrap_or_else(|| "upstream stream error".to_string()),
                error_type: error.kind.unwrap_or_else(|| "upstream_error".to_string()),
            }),
            AnthropicEvent::ExecutionResult(result) => push_execution_result(&result, events),
            AnthropicEvent::WebFetchResult(result) => push_sources(result.sources(), events),
            AnthropicEvent::WebSearchResult(result) => push_sources(result.sources(), events),
            AnthropicEvent::Unknown => {}
        }
    }

    fn open_block(
        &mut self,
        index: u32,
        block: ContentBlock,
        events: &mut Vec<NormalizedStreamEvent>,
    ) {
        let state = match block {
            ContentBlock::Text { text } => {
                if !text.is_empty() {
                    events.push(NormalizedStreamEvent::ContentDelta(text));
                }
                OpenBlock::Text
            }
            ContentBlock::Thinking { thinking } => {
                if !thinking.is_empty() {
                    events.push(NormalizedStreamEvent::ReasoningDelta(thinking));
                }
                OpenBlock::Thinking
            }
            ContentBlock::ToolUse { id, name, input } => {
                let arguments = initial_input(&input);
                events.push(NormalizedStreamEvent::ToolCallDelta {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                });
                OpenBlock::Tool {
                    id,
                    name,
                    arguments,
                }
            }
            ContentBlock::ServerToolUse { name, input, .. } => OpenBlock::ServerTool {
                name,
                input: initial_input(&input),
            },
            ContentBlock::ExecutionResult(result) => {
                push_execution_result(&result, events);
                return;
            }
            ContentBlock::WebFetchResult(result) => {
                push_sources(result.sources(), events);
                return;
            }
            ContentBlock::WebSearchResult(result) => {
                push_sources(result.sources(), events);
                return;
            }
            ContentBlock::Unknown => return,
        };

        self.blocks.insert(index, state);
    }

    fn apply_delta(
        &mut self,
        index: u32,
        delta: BlockDelta,
        events: &mut Vec<NormalizedStreamEvent>,
    ) {
        match (delta, self.blocks.get_mut(&index)) {
            (BlockDelta::TextDelta { text }, _) => {
                events.push(NormalizedStreamEvent::ContentDelta(text));
            }
            (BlockDelta::ThinkingDelta { thinking }, _) => {
                events.push(NormalizedStreamEvent::ReasoningDelta(thinking));
            }
            (
                BlockDelta::InputJsonDelta { partial_json },
                Some(OpenBlock::Tool {
                    id,
                    name,
                    arguments,
                }),
            ) => {
                arguments.push_str(&partial_json);
                events.push(NormalizedStreamEvent::ToolCallDelta {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: partial_json,
                });
            }
            (
                BlockDelta::InputJsonDelta { partial_json },
                Some(OpenBlock::ServerTool { input, .. }),
            ) => {
                input.push_str(&partial_json);
            }
            (BlockDelta::InputJsonDelta { .. }, _) => {
                tracing::debug!(index, "input delta for a block with no open tool");
            }
            (BlockDelta::Unknown, _) => {}
        }
    }

    fn close_block(&mut self, index: u32, events: &mut Vec<NormalizedStreamEvent>) {
        match self.blocks.remove(&index) {
            Some(OpenBlock::Tool {
                id,
                name,
                arguments,
            }) => {
                let arguments = if arguments.trim().is_empty() {
                    "{}".to_string()
                } else {
                    arguments
                };
                events.push(NormalizedStreamEvent::ToolCallComplete {
                    id,
                    name,
                    arguments,
                });
            }
            Some(OpenBlock::ServerTool { name, input }) => {
                match serde_json::from_str::<Value>(&input) {
                    Ok(input) => events.extend(server_tool_execution(&name, &input)),
                    Err(error) => {
                        tracing::debug!(
                            tool = %name,
                            error = %error,
                            "server tool input is not valid json"
                        );
                    }
                }
            }
            Some(OpenBlock::Text | OpenBlock::Thinking) | None => {}
        }
    }
}

/// Serialized `input` from a block start, or empty when it is the usual `{}` placeholder.
fn initial_input(input: &Value) -> String {
    match input {
        Value::Object(map) if !map.is_empty() => input.to_string(),
        _ => String::new(),
    }
}

fn push_execution_result(result: &ExecutionResult, events: &mut Vec<NormalizedStreamEvent>) {
    let (outcome, output) = result.outcome();
    events.push(NormalizedStreamEvent::CodeExecutionResult { outcome, output });
}

fn push_sources(sources: Vec<Source>, events: &mut Vec<NormalizedStreamEvent>) {
    if !sources.is_empty() {
        events.push(NormalizedStreamEvent::Sources(sources));
    }
}

impl StreamNormalizer for AnthropicStreamNormalizer {
    fn consume(&mut self, chunk: &[u8]) -> Vec<NormalizedStreamEvent> {
        let mut events = Vec::new();
        if self.ended {
            return events;
        }
        for line in self.lines.push(chunk) {
            self.handle_line(&line, &mut events);
        }
        events
    }

    fn flush(&mut self) -> Vec<NormalizedStreamEvent> {
        if self.ended {
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Some(line) = self.lines.take_remainder() {
            self.handle_line(&line, &mut events);
        }
        if !self.blocks.is_empty() {
            tracing::debug!(
                open_blocks = self.blocks.len(),
                "stream ended with open content blocks"
            );
            self.blocks.clear();
        }

        self.ended = true;
        events.push(NormalizedStreamEvent::StreamEnd);
        events
    }
}

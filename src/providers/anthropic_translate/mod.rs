use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::catalog;
use crate::core::error::ProviderError;
use crate::core::types::{
    AssistantMessage, ChatCompletion, ChatRequest, CompletionToolCall, CompletionUsage,
    ContentPart, MediaSource, Message, MessageRole, ProviderId, ResponseFormat, ToolChoice,
    generate_completion_id,
};
use crate::providers::translator_contract::{ProviderTranslator, TranslatedRequest};
use crate::stream::anthropic::{ContentBlock, UsageBody, map_stop_reason};
use crate::stream::{AnthropicStreamNormalizer, StreamNormalizer};

pub(crate) const ANTHROPIC_BETA_HEADER: &str = "anthropic-beta";
pub(crate) const DEFAULT_MAX_TOKENS: u32 = 8192;
pub(crate) const DEFAULT_THINKING_BUDGET: u32 = 10_000;
const MIN_THINKING_BUDGET: u32 = 1024;
const MAX_THINKING_BUDGET: u32 = u32::MAX - DEFAULT_MAX_TOKENS;

const BETA_CODE_EXECUTION: &str = "code-execution-2025-08-25";
const BETA_WEB_FETCH: &str = "web-fetch-2025-09-10";
const BETA_COMPUTER_USE: &str = "computer-use-2025-01-24";
const BETA_INTERLEAVED_THINKING: &str = "interleaved-thinking-2025-05-14";

const SERVER_TOOL_MAX_USES: u32 = 5;
const COMPUTER_DISPLAY_WIDTH: u32 = 1024;
const COMPUTER_DISPLAY_HEIGHT: u32 = 768;

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicTranslator;

impl ProviderTranslator for AnthropicTranslator {
    fn provider(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn translate(&self, req: &ChatRequest) -> TranslatedRequest {
        encode_anthropic_request(req)
    }

    fn decode_response(
        &self,
        payload: &Value,
        model: &str,
    ) -> Result<ChatCompletion, ProviderError> {
        decode_anthropic_response(payload, model)
    }

    fn stream_normalizer(&self) -> Box<dyn StreamNormalizer> {
        Box::new(AnthropicStreamNormalizer::new())
    }
}

pub(crate) fn encode_anthropic_request(req: &ChatRequest) -> TranslatedRequest {
    let model = catalog::resolve_upstream_model(ProviderId::Anthropic, req.model_id());
    let features = &req.features;

    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.clone()));

    if let Some(system) = map_system_prompt(&req.messages, &req.response_format) {
        body.insert("system".to_string(), Value::String(system));
    }

    let messages = merge_consecutive_messages(map_non_system_messages(&req.messages));
    body.insert(
        "messages".to_string(),
        Value::Array(messages.into_iter().map(WireMessage::into_json).collect()),
    );

    let mut max_tokens = req.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    if features.thinking {
        let budget = features
            .reasoning_budget
            .unwrap_or(DEFAULT_THINKING_BUDGET)
            .clamp(MIN_THINKING_BUDGET, MAX_THINKING_BUDGET);
        if max_tokens <= budget {
            max_tokens = budget.saturating_add(DEFAULT_MAX_TOKENS);
        }
        body.insert(
            "thinking".to_string(),
            json!({ "type": "enabled", "budget_tokens": budget }),
        );
    } else {
        if let Some(temperature) = req.params.temperature {
            body.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(top_p) = req.params.top_p {
            body.insert("top_p".to_string(), json!(top_p));
        }
        if let Some(top_k) = req.params.top_k {
            body.insert("top_k".to_string(), json!(top_k));
        }
    }
    body.insert("max_tokens".to_string(), json!(max_tokens));

    if !req.params.stop.is_empty() {
        body.insert("stop_sequences".to_string(), json!(req.params.stop));
    }

    let tools = map_tools(req);
    if !tools.is_empty() {
        body.insert("tools".to_string(), Value::Array(tools));
        if !req.tools.is_empty()
            && let Some(tool_choice) = &req.tool_choice
        {
            body.insert("tool_choice".to_string(), map_tool_choice(tool_choice));
        }
    }

    body.insert("stream".to_string(), Value::Bool(req.stream));

    let mut translated = TranslatedRequest::new(model, Value::Object(body));
    let betas = required_betas(req);
    if !betas.is_empty() {
        translated
            .headers
            .insert(ANTHROPIC_BETA_HEADER.to_string(), betas.join(","));
    }
    translated
}

/// Beta flags implied by the active built-in tools.
pub(crate) fn required_betas(req: &ChatRequest) -> Vec<&'static str> {
    let features = &req.features;
    let mut betas = Vec::new();

    if features.code_execution {
        betas.push(BETA_CODE_EXECUTION);
    }
    if features.url_context_enabled() {
        betas.push(BETA_WEB_FETCH);
    }
    if features.computer_use {
        betas.push(BETA_COMPUTER_USE);
    }

    let has_tools = !req.tools.is_empty()
        || features.web_search
        || features.code_execution
        || features.url_context_enabled()
        || features.computer_use;
    if features.thinking && has_tools {
        betas.push(BETA_INTERLEAVED_THINKING);
    }

    betas
}

fn map_system_prompt(messages: &[Message], response_format: &ResponseFormat) -> Option<String> {
    let mut sections = messages
        .iter()
        .filter(|message| message.role == MessageRole::System)
        .map(|message| message.content.joined_text())
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>();

    match response_format {
        ResponseFormat::Text => {}
        ResponseFormat::JsonObject => sections.push(
            "Respond only with a single valid JSON object. Do not wrap it in markdown."
                .to_string(),
        ),
        ResponseFormat::JsonSchema { name, schema, .. } => sections.push(format!(
            "Respond only with valid JSON for `{name}` that conforms to this JSON schema. \
             Do not wrap it in markdown.\n{schema}"
        )),
    }

    (!sections.is_empty()).then(|| sections.join("\n\n"))
}

#[derive(Debug, Clone, PartialEq)]
struct WireMessage {
    role: &'static str,
    content: Vec<Value>,
}

impl WireMessage {
    fn into_json(self) -> Value {
        json!({
            "role": self.role,
            "content": self.content,
        })
    }
}

fn map_non_system_messages(messages: &[Message]) -> Vec<WireMessage> {
    let mut mapped = Vec::new();

    for message in messages {
        let (role, content) = match message.role {
            MessageRole::System => continue,
            MessageRole::User => ("user", map_user_blocks(message)),
            MessageRole::Assistant => ("assistant", map_assistant_blocks(message)),
            MessageRole::Tool => ("user", vec![map_tool_result(message)]),
        };

        if content.is_empty() {
            continue;
        }
        mapped.push(WireMessage { role, content });
    }

    mapped
}

fn map_user_blocks(message: &Message) -> Vec<Value> {
    message
        .content
        .parts()
        .into_iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } if text.is_empty() => None,
            ContentPart::Text { text } => Some(json!({ "type": "text", "text": text })),
            ContentPart::ImageRef { source, mime_type } => Some(json!({
                "type": "image",
                "source": map_media_source(&source, &mime_type),
            })),
            ContentPart::DocumentRef {
                source,
                mime_type,
                filename,
            } => {
                let mut block = Map::new();
                block.insert("type".to_string(), Value::String("document".to_string()));
                block.insert("source".to_string(), map_media_source(&source, &mime_type));
                if let Some(filename) = filename {
                    block.insert("title".to_string(), Value::String(filename));
                }
                Some(Value::Object(block))
            }
        })
        .collect()
}

fn map_media_source(source: &MediaSource, mime_type: &str) -> Value {
    match source {
        MediaSource::InlineBase64 { data } => json!({
            "type": "base64",
            "media_type": mime_type,
            "data": data,
        }),
        MediaSource::Url { url } => json!({ "type": "url", "url": url }),
    }
}

fn map_assistant_blocks(message: &Message) -> Vec<Value> {
    let mut blocks = Vec::new();

    let text = message.content.joined_text();
    if !text.is_empty() {
        blocks.push(json!({ "type": "text", "text": text }));
    }

    for call in &message.tool_calls {
        blocks.push(json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": call.arguments_value(),
        }));
    }

    blocks
}

fn map_tool_result(message: &Message) -> Value {
    json!({
        "type": "tool_result",
        "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
        "content": message.content.joined_text(),
    })
}

/// Anthropic rejects back-to-back turns with the same role, so they are folded
/// together with tool results leading each user turn.
fn merge_consecutive_messages(messages: Vec<WireMessage>) -> Vec<WireMessage> {
    let mut merged: Vec<WireMessage> = Vec::new();

    for message in messages {
        if let Some(last) = merged.last_mut()
            && last.role == message.role
        {
            last.content.extend(message.content);
            if last.role == "user" {
                reorder_user_content_tool_results_first(&mut last.content);
            }
            continue;
        }

        merged.push(message);
    }

    merged
}

fn reorder_user_content_tool_results_first(content: &mut Vec<Value>) {
    let (tool_results, others): (Vec<Value>, Vec<Value>) = content
        .drain(..)
        .partition(|block| block.get("type").and_then(Value::as_str) == Some("tool_result"));

    content.extend(tool_results);
    content.extend(others);
}

fn map_tools(req: &ChatRequest) -> Vec<Value> {
    let features = &req.features;

    let mut tools = req
        .tools
        .iter()
        .map(|tool| {
            let mut definition = Map::new();
            definition.insert("name".to_string(), Value::String(tool.name.clone()));
            if let Some(description) = &tool.description {
                definition.insert(
                    "description".to_string(),
                    Value::String(description.clone()),
                );
            }
            definition.insert("input_schema".to_string(), tool.parameters.clone());
            Value::Object(definition)
        })
        .collect::<Vec<_>>();

    if features.web_search {
        tools.push(json!({
            "type": "web_search_20250305",
            "name": "web_search",
            "max_uses": SERVER_TOOL_MAX_USES,
        }));
    }
    if features.url_context_enabled() {
        tools.push(json!({
            "type": "web_fetch_20250910",
            "name": "web_fetch",
            "max_uses": SERVER_TOOL_MAX_USES,
        }));
    }
    if features.code_execution {
        tools.push(json!({
            "type": "code_execution_20250825",
            "name": "code_execution",
        }));
    }
    if features.computer_use {
        tools.push(json!({
            "type": "computer_20250124",
            "name": "computer",
            "display_width_px": COMPUTER_DISPLAY_WIDTH,
            "display_height_px": COMPUTER_DISPLAY_HEIGHT,
        }));
    }

    tools
}

fn map_tool_choice(tool_choice: &ToolChoice) -> Value {
    match tool_choice {
        ToolChoice::Auto => json!({ "type": "auto" }),
        ToolChoice::None => json!({ "type": "none" }),
        ToolChoice::Required => json!({ "type": "any" }),
        ToolChoice::Function { name } => json!({ "type": "tool", "name": name }),
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<UsageBody>,
    #[serde(default)]
    error: Option<AnthropicErrorBody>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub(crate) fn decode_anthropic_response(
    payload: &Value,
    model: &str,
) -> Result<ChatCompletion, ProviderError> {
    let response = AnthropicResponse::deserialize(payload).map_err(|error| {
        protocol_error(model, format!("anthropic response is not a message: {error}"))
    })?;

    if let Some(error) = response.error {
        let message = error.message.unwrap_or_else(|| "unknown error".to_string());
        let message = match error.kind {
            Some(kind) => format!("anthropic error: {message} [type={kind}]"),
            None => format!("anthropic error: {message}"),
        };
        return Err(protocol_error(model, message));
    }

    let mut text = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();
    let mut sources = Vec::new();

    for block in response.content {
        match block {
            ContentBlock::Text { text: chunk } => text.push_str(&chunk),
            ContentBlock::Thinking { thinking } => reasoning.push_str(&thinking),
            ContentBlock::ToolUse { id, name, input } => {
                let arguments = match input {
                    Value::Object(map) if !map.is_empty() => Value::Object(map).to_string(),
                    _ => "{}".to_string(),
                };
                tool_calls.push(CompletionToolCall::function(id, name, arguments));
            }
            ContentBlock::WebFetchResult(result) => sources.extend(result.sources()),
            ContentBlock::WebSearchResult(result) => sources.extend(result.sources()),
            ContentBlock::ServerToolUse { .. }
            | ContentBlock::ExecutionResult(_)
            | ContentBlock::Unknown => {}
        }
    }

    let usage = response
        .usage
        .map(|usage| {
            CompletionUsage::new(
                usage.input_tokens.unwrap_or(0),
                usage.output_tokens.unwrap_or(0),
            )
        })
        .unwrap_or_default();

    let message = AssistantMessage {
        role: MessageRole::Assistant,
        content: Some(text),
        reasoning: (!reasoning.is_empty()).then_some(reasoning),
        tool_calls,
    };

    let mut completion = ChatCompletion::new(
        response.id.unwrap_or_else(generate_completion_id),
        response.model.unwrap_or_else(|| model.to_string()),
        ProviderId::Anthropic,
        message,
        response.stop_reason.as_deref().map(map_stop_reason),
        usage,
    );
    completion.sources = sources;
    Ok(completion)
}

fn protocol_error(model: &str, message: impl Into<String>) -> ProviderError {
    ProviderError::Protocol {
        provider: ProviderId::Anthropic,
        model: Some(model.to_string()),
        message: message.into(),
    }
}

//! OpenAI Chat Completions wire format.
//!
//! The message, tool and response-format encoders here are shared with the
//! aggregator translator, which speaks the same schema.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::catalog;
use crate::core::error::ProviderError;
use crate::core::types::{
    AssistantMessage, ChatCompletion, ChatRequest, CompletionToolCall, CompletionUsage,
    ContentPart, MediaSource, Message, MessageContent, MessageRole, ProviderId, ResponseFormat,
    Source, ToolChoice, generate_completion_id,
};
use crate::providers::translator_contract::{ProviderTranslator, TranslatedRequest};
use crate::stream::{OpenAiStreamNormalizer, StreamNormalizer};

const REASONING_MODEL_PREFIXES: &[&str] = &["o1", "o3", "o4", "gpt-5"];

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiTranslator;

impl ProviderTranslator for OpenAiTranslator {
    fn provider(&self) -> ProviderId {
        ProviderId::Openai
    }

    fn translate(&self, req: &ChatRequest) -> TranslatedRequest {
        encode_openai_request(req)
    }

    fn decode_response(
        &self,
        payload: &Value,
        model: &str,
    ) -> Result<ChatCompletion, ProviderError> {
        decode_chat_completion(ProviderId::Openai, payload, model)
    }

    fn stream_normalizer(&self) -> Box<dyn StreamNormalizer> {
        Box::new(OpenAiStreamNormalizer::new())
    }
}

pub(crate) fn encode_openai_request(req: &ChatRequest) -> TranslatedRequest {
    let model = catalog::resolve_upstream_model(ProviderId::Openai, req.model_id());
    let reasoning_model = is_reasoning_model(&model);

    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.clone()));
    body.insert("messages".to_string(), Value::Array(map_messages(&req.messages)));
    body.insert("stream".to_string(), Value::Bool(req.stream));

    if req.stream {
        body.insert("stream_options".to_string(), json!({ "include_usage": true }));
    }

    if !reasoning_model {
        if let Some(temperature) = req.params.temperature {
            body.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(top_p) = req.params.top_p {
            body.insert("top_p".to_string(), json!(top_p));
        }
    }

    if let Some(max_tokens) = req.params.max_tokens {
        let key = if reasoning_model {
            "max_completion_tokens"
        } else {
            "max_tokens"
        };
        body.insert(key.to_string(), json!(max_tokens));
    }

    if !req.params.stop.is_empty() {
        body.insert("stop".to_string(), json!(req.params.stop));
    }

    if let Some(seed) = req.params.seed {
        body.insert("seed".to_string(), json!(seed));
    }

    insert_tools(&mut body, req);

    if let Some(response_format) = map_response_format(&req.response_format) {
        body.insert("response_format".to_string(), response_format);
    }

    if reasoning_model {
        body.insert(
            "reasoning_effort".to_string(),
            Value::String(reasoning_effort(
                req.features.reasoning_effort.as_deref(),
                req.features.reasoning_budget,
            )),
        );
    }

    if req.features.web_search {
        body.insert("web_search_options".to_string(), json!({}));
    }

    TranslatedRequest::new(model, Value::Object(body))
}

pub(crate) fn is_reasoning_model(model: &str) -> bool {
    let lowered = model.to_ascii_lowercase();
    let bare = lowered.rsplit('/').next().unwrap_or(&lowered);
    REASONING_MODEL_PREFIXES
        .iter()
        .any(|prefix| bare.starts_with(prefix))
}

/// Explicit effort wins; otherwise the thinking budget picks a tier.
pub(crate) fn reasoning_effort(effort: Option<&str>, budget: Option<u32>) -> String {
    if let Some(effort) = effort.map(str::trim).filter(|effort| !effort.is_empty()) {
        return effort.to_ascii_lowercase();
    }

    match budget {
        Some(budget) if budget < 4096 => "low",
        Some(budget) if budget < 16384 => "medium",
        Some(_) => "high",
        None => "medium",
    }
    .to_string()
}

/// Adds `tools` and `tool_choice`; a choice without tools is dropped.
pub(crate) fn insert_tools(body: &mut Map<String, Value>, req: &ChatRequest) {
    if req.tools.is_empty() {
        return;
    }

    let tools = req
        .tools
        .iter()
        .map(|tool| {
            let mut function = Map::new();
            function.insert("name".to_string(), Value::String(tool.name.clone()));
            if let Some(description) = &tool.description {
                function.insert(
                    "description".to_string(),
                    Value::String(description.clone()),
                );
            }
            function.insert("parameters".to_string(), tool.parameters.clone());
            json!({ "type": "function", "function": Value::Object(function) })
        })
        .collect();
    body.insert("tools".to_string(), Value::Array(tools));

    if let Some(tool_choice) = &req.tool_choice {
        body.insert("tool_choice".to_string(), map_tool_choice(tool_choice));
    }
}

fn map_tool_choice(tool_choice: &ToolChoice) -> Value {
    match tool_choice {
        ToolChoice::None => Value::String("none".to_string()),
        ToolChoice::Auto => Value::String("auto".to_string()),
        ToolChoice::Required => Value::String("required".to_string()),
        ToolChoice::Function { name } => json!({
            "type": "function",
            "function": { "name": name }
        }),
    }
}

pub(crate) fn map_response_format(response_format: &ResponseFormat) -> Option<Value> {
    match response_format {
        ResponseFormat::Text => None,
        ResponseFormat::JsonObject => Some(json!({ "type": "json_object" })),
        ResponseFormat::JsonSchema {
            name,
            schema,
            strict,
        } => Some(json!({
            "type": "json_schema",
            "json_schema": {
                "name": name,
                "schema": schema,
                "strict": strict
            }
        })),
    }
}

pub(crate) fn map_messages(messages: &[Message]) -> Vec<Value> {
    messages.iter().map(map_message).collect()
}

fn map_message(message: &Message) -> Value {
    match message.role {
        MessageRole::System => json!({
            "role": "system",
            "content": message.content.joined_text(),
        }),
        MessageRole::User => json!({
            "role": "user",
            "content": map_user_content(&message.content),
        }),
        MessageRole::Assistant => map_assistant_message(message),
        MessageRole::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
            "content": message.content.joined_text(),
        }),
    }
}

fn map_user_content(content: &MessageContent) -> Value {
    let parts = match content {
        MessageContent::Text(text) => return Value::String(text.clone()),
        MessageContent::Parts(parts) => parts,
    };

    Value::Array(
        parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                ContentPart::ImageRef { source, mime_type } => json!({
                    "type": "image_url",
                    "image_url": { "url": source.to_url(mime_type) }
                }),
                ContentPart::DocumentRef {
                    source,
                    mime_type,
                    filename,
                } => map_document(source, mime_type, filename.as_deref()),
            })
            .collect(),
    )
}

fn map_document(source: &MediaSource, mime_type: &str, filename: Option<&str>) -> Value {
    json!({
        "type": "file",
        "file": {
            "filename": filename.unwrap_or("document.pdf"),
            "file_data": source.to_url(mime_type),
        }
    })
}

fn map_assistant_message(message: &Message) -> Value {
    let mut payload = Map::new();
    payload.insert("role".to_string(), Value::String("assistant".to_string()));

    let text = message.content.joined_text();
    if text.is_empty() && !message.tool_calls.is_empty() {
        payload.insert("content".to_string(), Value::Null);
    } else {
        payload.insert("content".to_string(), Value::String(text));
    }

    if !message.tool_calls.is_empty() {
        let tool_calls = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments,
                    }
                })
            })
            .collect();
        payload.insert("tool_calls".to_string(), Value::Array(tool_calls));
    }

    Value::Object(payload)
}

#[derive(Debug, Deserialize)]
struct WireCompletion {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
    #[serde(default)]
    annotations: Vec<WireAnnotation>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireAnnotation {
    #[serde(default)]
    url_citation: Option<WireCitation>,
}

#[derive(Debug, Deserialize)]
struct WireCitation {
    url: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<Value>,
}

/// Decodes an OpenAI-shaped `chat.completion` body.
///
/// Finish reasons already use the normalized vocabulary and pass through.
pub(crate) fn decode_chat_completion(
    provider: ProviderId,
    payload: &Value,
    model: &str,
) -> Result<ChatCompletion, ProviderError> {
    let completion = WireCompletion::deserialize(payload).map_err(|error| {
        protocol_error(
            provider,
            model,
            format!("{provider} response is not a chat completion: {error}"),
        )
    })?;

    if let Some(error) = completion.error {
        let message = error.message.unwrap_or_else(|| "unknown error".to_string());
        let message = match error.code {
            Some(code) => format!("{provider} error: {message} [code={code}]"),
            None => format!("{provider} error: {message}"),
        };
        return Err(protocol_error(provider, model, message));
    }

    let Some(choice) = completion.choices.into_iter().next() else {
        return Err(protocol_error(
            provider,
            model,
            format!("{provider} response choices array must not be empty"),
        ));
    };

    let wire_message = choice.message.unwrap_or_default();
    let sources = wire_message
        .annotations
        .iter()
        .filter_map(|annotation| annotation.url_citation.as_ref())
        .map(|citation| Source {
            title: citation
                .title
                .clone()
                .unwrap_or_else(|| citation.url.clone()),
            url: citation.url.clone(),
        })
        .collect::<Vec<_>>();

    let message = AssistantMessage {
        role: MessageRole::Assistant,
        content: decode_content(wire_message.content.as_ref()),
        reasoning: wire_message.reasoning.or(wire_message.reasoning_content),
        tool_calls: wire_message
            .tool_calls
            .into_iter()
            .map(|call| {
                CompletionToolCall::function(
                    call.id,
                    call.function.name,
                    call.function
                        .arguments
                        .filter(|arguments| !arguments.trim().is_empty())
                        .unwrap_or_else(|| "{}".to_string()),
                )
            })
            .collect(),
    };

    let usage = completion
        .usage
        .map(|usage| CompletionUsage::new(usage.prompt_tokens, usage.completion_tokens))
        .unwrap_or_default();

    let mut decoded = ChatCompletion::new(
        completion.id.unwrap_or_else(generate_completion_id),
        completion.model.unwrap_or_else(|| model.to_string()),
        provider,
        message,
        choice.finish_reason,
        usage,
    );
    decoded.sources = sources;
    Ok(decoded)
}

fn decode_content(content: Option<&Value>) -> Option<String> {
    match content? {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let text = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>();
            Some(text)
        }
        _ => None,
    }
}

fn protocol_error(provider: ProviderId, model: &str, message: impl Into<String>) -> ProviderError {
    ProviderError::Protocol {
        provider,
        model: Some(model.to_string()),
        message: message.into(),
    }
}

//! Gemini `generateContent` wire format.
//!
//! Requests are built as camelCase JSON; responses reuse the typed
//! `GenerateContentResponse` model from the stream normalizer.

use std::collections::HashMap;

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
use crate::stream::gemini::{GeminiResponse, PartKind, map_finish_reason, synthesize_call_id};
use crate::stream::{GeminiStreamNormalizer, StreamNormalizer};

const JSON_MIME_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiTranslator;

impl ProviderTranslator for GeminiTranslator {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn translate(&self, req: &ChatRequest) -> TranslatedRequest {
        encode_gemini_request(req)
    }

    fn decode_response(
        &self,
        payload: &Value,
        model: &str,
    ) -> Result<ChatCompletion, ProviderError> {
        decode_gemini_response(payload, model)
    }

    fn stream_normalizer(&self) -> Box<dyn StreamNormalizer> {
        Box::new(GeminiStreamNormalizer::new())
    }
}

/// The model id travels in the URL path, but it is mirrored into the body so
/// the translated request is self-describing.
pub(crate) fn encode_gemini_request(req: &ChatRequest) -> TranslatedRequest {
    let model = catalog::resolve_upstream_model(ProviderId::Gemini, req.model_id());

    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.clone()));
    body.insert(
        "contents".to_string(),
        Value::Array(
            merge_consecutive_contents(map_contents(&req.messages))
                .into_iter()
                .map(WireContent::into_json)
                .collect(),
        ),
    );

    if let Some(system_instruction) = map_system_instruction(&req.messages) {
        body.insert("systemInstruction".to_string(), system_instruction);
    }

    let tools = map_tools(req);
    if !tools.is_empty() {
        body.insert("tools".to_string(), Value::Array(tools));
    }

    if !req.tools.is_empty()
        && let Some(tool_choice) = &req.tool_choice
    {
        body.insert(
            "toolConfig".to_string(),
            json!({ "functionCallingConfig": map_tool_choice(tool_choice) }),
        );
    }

    let generation_config = map_generation_config(req);
    if !generation_config.is_empty() {
        body.insert(
            "generationConfig".to_string(),
            Value::Object(generation_config),
        );
    }

    TranslatedRequest::new(model, Value::Object(body))
}

fn map_system_instruction(messages: &[Message]) -> Option<Value> {
    let parts = messages
        .iter()
        .filter(|message| message.role == MessageRole::System)
        .map(|message| message.content.joined_text())
        .filter(|text| !text.trim().is_empty())
        .map(|text| json!({ "text": text }))
        .collect::<Vec<_>>();

    (!parts.is_empty()).then(|| json!({ "parts": parts }))
}

#[derive(Debug, Clone, PartialEq)]
struct WireContent {
    role: &'static str,
    parts: Vec<Value>,
}

impl WireContent {
    fn into_json(self) -> Value {
        json!({
            "role": self.role,
            "parts": self.parts,
        })
    }
}

fn map_contents(messages: &[Message]) -> Vec<WireContent> {
    // functionResponse parts must name the function; tool messages only carry the call id.
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    let mut contents = Vec::new();

    for message in messages {
        let (role, parts) = match message.role {
            MessageRole::System => continue,
            MessageRole::User => ("user", map_user_parts(message)),
            MessageRole::Assistant => {
                for call in &message.tool_calls {
                    call_names.insert(call.id.as_str(), call.name.as_str());
                }
                ("model", map_model_parts(message))
            }
            MessageRole::Tool => {
                let name = message
                    .tool_call_id
                    .as_deref()
                    .and_then(|id| call_names.get(id).copied())
                    .or(message.name.as_deref())
                    .unwrap_or("tool");
                ("user", vec![map_function_response(name, message)])
            }
        };

        if parts.is_empty() {
            continue;
        }
        contents.push(WireContent { role, parts });
    }

    contents
}

fn map_user_parts(message: &Message) -> Vec<Value> {
    message
        .content
        .parts()
        .into_iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } if text.is_empty() => None,
            ContentPart::Text { text } => Some(json!({ "text": text })),
            ContentPart::ImageRef { source, mime_type }
            | ContentPart::DocumentRef {
                source, mime_type, ..
            } => Some(map_media(&source, &mime_type)),
        })
        .collect()
}

fn map_media(source: &MediaSource, mime_type: &str) -> Value {
    match source {
        MediaSource::InlineBase64 { data } => json!({
            "inlineData": { "mimeType": mime_type, "data": data }
        }),
        MediaSource::Url { url } => json!({
            "fileData": { "mimeType": mime_type, "fileUri": url }
        }),
    }
}

fn map_model_parts(message: &Message) -> Vec<Value> {
    let mut parts = Vec::new();

    let text = message.content.joined_text();
    if !text.is_empty() {
        parts.push(json!({ "text": text }));
    }

    for call in &message.tool_calls {
        parts.push(json!({
            "functionCall": {
                "name": call.name,
                "args": call.arguments_value(),
            }
        }));
    }

    parts
}

fn map_function_response(name: &str, message: &Message) -> Value {
    let text = message.content.joined_text();
    let response = serde_json::from_str::<Value>(&text)
        .ok()
        .filter(Value::is_object)
        .unwrap_or_else(|| json!({ "result": text }));

    json!({
        "functionResponse": {
            "name": name,
            "response": response,
        }
    })
}

fn merge_consecutive_contents(contents: Vec<WireContent>) -> Vec<WireContent> {
    let mut merged: Vec<WireContent> = Vec::new();

    for content in contents {
        if let Some(last) = merged.last_mut()
            && last.role == content.role
        {
            last.parts.extend(content.parts);
            continue;
        }
        merged.push(content);
    }

    merged
}

/// Function declarations and the built-in grounding tools share one array.
fn map_tools(req: &ChatRequest) -> Vec<Value> {
    let features = &req.features;
    let mut tools = Vec::new();

    if !req.tools.is_empty() {
        let declarations = req
            .tools
            .iter()
            .map(|tool| {
                let mut declaration = Map::new();
                declaration.insert("name".to_string(), Value::String(tool.name.clone()));
                if let Some(description) = &tool.description {
                    declaration.insert(
                        "description".to_string(),
                        Value::String(description.clone()),
                    );
                }
                declaration.insert("parameters".to_string(), tool.parameters.clone());
                Value::Object(declaration)
            })
            .collect::<Vec<_>>();
        tools.push(json!({ "functionDeclarations": declarations }));
    }

    if features.web_search {
        tools.push(json!({ "googleSearch": {} }));
    }
    if features.code_execution {
        tools.push(json!({ "codeExecution": {} }));
    }
    if features.url_context_enabled() {
        tools.push(json!({ "urlContext": {} }));
    }

    tools
}

fn map_tool_choice(tool_choice: &ToolChoice) -> Value {
    match tool_choice {
        ToolChoice::Auto => json!({ "mode": "AUTO" }),
        ToolChoice::None => json!({ "mode": "NONE" }),
        ToolChoice::Required => json!({ "mode": "ANY" }),
        ToolChoice::Function { name } => json!({
            "mode": "ANY",
            "allowedFunctionNames": [name],
        }),
    }
}

fn map_generation_config(req: &ChatRequest) -> Map<String, Value> {
    let params = &req.params;
    let mut config = Map::new();

    if let Some(temperature) = params.temperature {
        config.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = params.top_p {
        config.insert("topP".to_string(), json!(top_p));
    }
    if let Some(top_k) = params.top_k {
        config.insert("topK".to_string(), json!(top_k));
    }
    if let Some(max_tokens) = params.max_tokens {
        config.insert("maxOutputTokens".to_string(), json!(max_tokens));
    }
    if !params.stop.is_empty() {
        config.insert("stopSequences".to_string(), json!(params.stop));
    }
    if let Some(seed) = params.seed {
        config.insert("seed".to_string(), json!(seed));
    }

    match &req.response_format {
        ResponseFormat::Text => {}
        ResponseFormat::JsonObject => {
            config.insert(
                "responseMimeType".to_string(),
                Value::String(JSON_MIME_TYPE.to_string()),
            );
        }
        ResponseFormat::JsonSchema { schema, .. } => {
            config.insert(
                "responseMimeType".to_string(),
                Value::String(JSON_MIME_TYPE.to_string()),
            );
            config.insert("responseSchema".to_string(), schema.clone());
        }
    }

    if req.features.thinking {
        let mut thinking = Map::new();
        if let Some(budget) = req.features.reasoning_budget {
            thinking.insert("thinkingBudget".to_string(), json!(budget));
        }
        thinking.insert("includeThoughts".to_string(), Value::Bool(true));
        config.insert("thinkingConfig".to_string(), Value::Object(thinking));
    }

    config
}

pub(crate) fn decode_gemini_response(
    payload: &Value,
    model: &str,
) -> Result<ChatCompletion, ProviderError> {
    let response = GeminiResponse::deserialize(payload).map_err(|error| {
        protocol_error(
            model,
            format!("gemini response is not a GenerateContentResponse: {error}"),
        )
    })?;

    if let Some(error) = &response.error {
        let message = error
            .message
            .clone()
            .unwrap_or_else(|| "unknown error".to_string());
        let message = match &error.status {
            Some(status) => format!("gemini error: {message} [status={status}]"),
            None => format!("gemini error: {message}"),
        };
        return Err(protocol_error(model, message));
    }

    let Some(candidate) = response.candidates.first() else {
        return Err(protocol_error(
            model,
            "gemini response candidates array must not be empty",
        ));
    };

    let mut text = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();

    let parts = candidate
        .content
        .as_ref()
        .map(|content| content.parts.as_slice())
        .unwrap_or_default();
    for part in parts {
        match part.kind() {
            PartKind::Reasoning(thought) => reasoning.push_str(thought),
            PartKind::Text(chunk) => text.push_str(chunk),
            PartKind::FunctionCall(call) => {
                let arguments = match &call.args {
                    Value::Object(map) if !map.is_empty() => call.args.to_string(),
                    _ => "{}".to_string(),
                };
                tool_calls.push(CompletionToolCall::function(
                    call.id.clone().unwrap_or_else(synthesize_call_id),
                    call.name.clone(),
                    arguments,
                ));
            }
            PartKind::ExecutableCode(_)
            | PartKind::ExecutionResult(_)
            | PartKind::Image(_)
            | PartKind::Other => {}
        }
    }

    let finish_reason = candidate
        .finish_reason
        .as_deref()
        .map(|reason| map_finish_reason(reason, !tool_calls.is_empty()));

    let usage = response
        .usage_metadata
        .map(|usage| CompletionUsage::new(usage.prompt_token_count, usage.completion_tokens()))
        .unwrap_or_default();

    let sources = candidate.sources();

    let message = AssistantMessage {
        role: MessageRole::Assistant,
        content: Some(text),
        reasoning: (!reasoning.is_empty()).then_some(reasoning),
        tool_calls,
    };

    let mut completion = ChatCompletion::new(
        response
            .response_id
            .clone()
            .unwrap_or_else(generate_completion_id),
        model,
        ProviderId::Gemini,
        message,
        finish_reason,
        usage,
    );
    completion.sources = sources;
    Ok(completion)
}

fn protocol_error(model: &str, message: impl Into<String>) -> ProviderError {
    ProviderError::Protocol {
        provider: ProviderId::Gemini,
        model: Some(model.to_string()),
        message: message.into(),
    }
}

//! Inbound request normalization.
//!
//! Accepts an OpenAI Chat Completions body (plus the gateway's feature flags) and
//! produces a [`ChatRequest`]. Structural problems in `messages` are rejected;
//! malformed optional fields are dropped rather than failing the request.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::core::error::GatewayError;
use crate::core::types::{
    ChatRequest, ContentPart, FeatureFlags, GenerationParams, MediaSource, Message,
    MessageContent, MessageRole, ResponseFormat, ToolCall, ToolChoice, ToolSpec,
};

#[derive(Debug, Default, Deserialize)]
struct InboundRequest {
    #[serde(default, deserialize_with = "lenient")]
    model: Option<String>,
    #[serde(default)]
    messages: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    stream: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    top_p: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    top_k: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    max_tokens: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    max_completion_tokens: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    stop: Option<StopField>,
    #[serde(default, deserialize_with = "lenient")]
    seed: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    tools: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "lenient")]
    tool_choice: Option<ToolChoiceField>,
    #[serde(default, deserialize_with = "lenient")]
    response_format: Option<ResponseFormatField>,
    #[serde(default, deserialize_with = "lenient")]
    web_search: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    code_execution: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    url_context: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    thinking: Option<ReasoningField>,
    #[serde(default, deserialize_with = "lenient")]
    reasoning: Option<ReasoningField>,
    #[serde(default, deserialize_with = "lenient")]
    reasoning_budget: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    reasoning_effort: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    computer_use: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    provider: Option<ProviderField>,
    #[serde(default, deserialize_with = "lenient")]
    use_direct_api: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StopField {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ToolChoiceField {
    Mode(String),
    Named {
        #[serde(default)]
        function: Option<NamedFunction>,
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct NamedFunction {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormatField {
    Text,
    JsonObject,
    JsonSchema {
        #[serde(default)]
        json_schema: Option<JsonSchemaField>,
    },
}

#[derive(Debug, Deserialize)]
struct JsonSchemaField {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    schema: Option<Value>,
    #[serde(default)]
    strict: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReasoningField {
    Enabled(bool),
    Settings {
        #[serde(default)]
        enabled: Option<bool>,
        #[serde(default)]
        budget_tokens: Option<u32>,
        #[serde(default)]
        max_tokens: Option<u32>,
        #[serde(default)]
        effort: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProviderField {
    Name(String),
    Preferences(Map<String, Value>),
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    role: String,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    tool_calls: Option<Vec<InboundToolCall>>,
    #[serde(default, deserialize_with = "lenient")]
    tool_call_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InboundToolCall {
    id: String,
    function: InboundFunctionCall,
}

#[derive(Debug, Deserialize)]
struct InboundFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct InboundTool {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    function: InboundFunctionSpec,
}

#[derive(Debug, Deserialize)]
struct InboundFunctionSpec {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrlField,
    },
    #[serde(alias = "document", alias = "input_file")]
    File {
        file: FileField,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImageUrlField {
    Bare(String),
    Object { url: String },
}

#[derive(Debug, Deserialize)]
struct FileField {
    #[serde(default)]
    file_data: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    filename: Option<String>,
}

/// Deserializes an optional field, treating a value of the wrong shape as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value).ok())
}

/// Parses and validates an inbound JSON body.
pub fn normalize_chat_request(body: &Value) -> Result<ChatRequest, GatewayError> {
    if !body.is_object() {
        return Err(GatewayError::invalid_request("request body must be a JSON object"));
    }

    let inbound = InboundRequest::deserialize(body)
        .map_err(|error| GatewayError::invalid_request(error.to_string()))?;

    let messages = normalize_messages(inbound.messages.as_ref())?;
    let features = normalize_features(&inbound);
    let (explicit_provider, provider_preferences) = match inbound.provider {
        Some(ProviderField::Name(name)) if !name.trim().is_empty() => {
            (Some(name.trim().to_string()), None)
        }
        Some(ProviderField::Preferences(preferences)) => (None, Some(Value::Object(preferences))),
        _ => (None, None),
    };

    Ok(ChatRequest {
        model: inbound
            .model
            .map(|model| model.trim().to_string())
            .filter(|model| !model.is_empty()),
        messages,
        params: GenerationParams {
            temperature: inbound.temperature,
            top_p: inbound.top_p,
            top_k: inbound.top_k,
            max_tokens: inbound.max_tokens.or(inbound.max_completion_tokens),
            stop: match inbound.stop {
                Some(StopField::One(stop)) => vec![stop],
                Some(StopField::Many(stops)) => stops,
                None => Vec::new(),
            }
            .into_iter()
            .filter(|stop| !stop.is_empty())
            .collect(),
            seed: inbound.seed,
        },
        tools: normalize_tools(inbound.tools.unwrap_or_default()),
        tool_choice: inbound.tool_choice.and_then(normalize_tool_choice),
        response_format: normalize_response_format(inbound.response_format),
        features,
        explicit_provider,
        provider_preferences,
        use_direct_api: inbound.use_direct_api.unwrap_or(false),
        stream: inbound.stream.unwrap_or(false),
    })
}

fn normalize_messages(messages: Option<&Value>) -> Result<Vec<Message>, GatewayError> {
    let Some(messages) = messages.and_then(Value::as_array) else {
        return Err(GatewayError::invalid_request("messages must be an array"));
    };

    if messages.is_empty() {
        return Err(GatewayError::invalid_request("messages must not be empty"));
    }

    messages
        .iter()
        .enumerate()
        .map(|(index, message)| normalize_message(index, message))
        .collect()
}

fn normalize_message(index: usize, raw: &Value) -> Result<Message, GatewayError> {
    let inbound = InboundMessage::deserialize(raw).map_err(|error| {
        GatewayError::invalid_request(format!("messages[{index}] is malformed: {error}"))
    })?;

    let role = match inbound.role.as_str() {
        "system" | "developer" => MessageRole::System,
        "user" => MessageRole::User,
        "assistant" => MessageRole::Assistant,
        "tool" => MessageRole::Tool,
        other => {
            return Err(GatewayError::invalid_request(format!(
                "messages[{index}].role is invalid: {other}"
            )));
        }
    };

    let tool_calls = inbound
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: match call.function.arguments {
                Some(Value::String(arguments)) => arguments,
                Some(Value::Null) | None => "{}".to_string(),
                Some(other) => other.to_string(),
            },
        })
        .collect::<Vec<_>>();

    let content = match inbound.content {
        Some(Value::String(text)) => MessageContent::Text(text),
        Some(Value::Array(parts)) => MessageContent::Parts(normalize_parts(&parts)),
        None | Some(Value::Null) if role == MessageRole::Assistant && !tool_calls.is_empty() => {
            MessageContent::Text(String::new())
        }
        _ => {
            return Err(GatewayError::invalid_request(format!(
                "messages[{index}].content must be a string or an array of content parts"
            )));
        }
    };

    let tool_call_id = inbound
        .tool_call_id
        .filter(|tool_call_id| !tool_call_id.is_empty());
    if role == MessageRole::Tool && tool_call_id.is_none() {
        return Err(GatewayError::invalid_request(format!(
            "messages[{index}] has role tool but no tool_call_id"
        )));
    }

    Ok(Message {
        role,
        content,
        tool_calls: if role == MessageRole::Assistant {
            tool_calls
        } else {
            Vec::new()
        },
        tool_call_id,
        name: inbound.name,
    })
}

fn normalize_parts(parts: &[Value]) -> Vec<ContentPart> {
    parts
        .iter()
        .filter_map(|part| InboundPart::deserialize(part).ok())
        .filter_map(|part| match part {
            InboundPart::Text { text } => Some(ContentPart::Text { text }),
            InboundPart::ImageUrl { image_url } => {
                let url = match image_url {
                    ImageUrlField::Bare(url) | ImageUrlField::Object { url } => url,
                };
                let (source, mime_type) = media_source(&url, guess_image_mime(&url))?;
                Some(ContentPart::ImageRef { source, mime_type })
            }
            InboundPart::File { file } => {
                let fallback_mime = file
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| guess_document_mime(file.filename.as_deref()));
                let raw = file.file_data.or(file.url)?;
                let (source, mime_type) = media_source(&raw, fallback_mime)?;
                Some(ContentPart::DocumentRef {
                    source,
                    mime_type,
                    filename: file.filename,
                })
            }
        })
        .collect()
}

fn media_source(raw: &str, fallback_mime: String) -> Option<(MediaSource, String)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some((mime_type, data)) = parse_data_url(raw) {
        let mime_type = if mime_type.is_empty() {
            fallback_mime
        } else {
            mime_type.to_string()
        };
        return Some((
            MediaSource::InlineBase64 {
                data: data.to_string(),
            },
            mime_type,
        ));
    }

    Some((
        MediaSource::Url {
            url: raw.to_string(),
        },
        fallback_mime,
    ))
}

/// Splits `data:<mime>;base64,<payload>` into its mime type and payload.
pub fn parse_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?;
    Some((mime_type, data))
}

fn guess_image_mime(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    let mime = if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    };
    mime.to_string()
}

fn guess_document_mime(filename: Option<&str>) -> String {
    let filename = filename.unwrap_or_default().to_ascii_lowercase();
    let mime = if filename.ends_with(".txt") {
        "text/plain"
    } else if filename.ends_with(".md") {
        "text/markdown"
    } else if filename.ends_with(".csv") {
        "text/csv"
    } else {
        "application/pdf"
    };
    mime.to_string()
}

fn normalize_tools(tools: Vec<Value>) -> Vec<ToolSpec> {
    tools
        .iter()
        .filter_map(|tool| InboundTool::deserialize(tool).ok())
        .filter(|tool| tool.kind.as_deref().is_none_or(|kind| kind == "function"))
        .filter(|tool| !tool.function.name.trim().is_empty())
        .map(|tool| ToolSpec {
            name: tool.function.name,
            description: tool.function.description,
            parameters: tool
                .function
                .parameters
                .filter(Value::is_object)
                .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
        })
        .collect()
}

fn normalize_tool_choice(choice: ToolChoiceField) -> Option<ToolChoice> {
    match choice {
        ToolChoiceField::Mode(mode) => match mode.as_str() {
            "auto" => Some(ToolChoice::Auto),
            "none" => Some(ToolChoice::None),
            "required" | "any" => Some(ToolChoice::Required),
            _ => None,
        },
        ToolChoiceField::Named { function, name } => function
            .map(|function| function.name)
            .or(name)
            .filter(|name| !name.is_empty())
            .map(|name| ToolChoice::Function { name }),
    }
}

fn normalize_response_format(format: Option<ResponseFormatField>) -> ResponseFormat {
    match format {
        None | Some(ResponseFormatField::Text) => ResponseFormat::Text,
        Some(ResponseFormatField::JsonObject) => ResponseFormat::JsonObject,
        Some(ResponseFormatField::JsonSchema { json_schema }) => match json_schema {
            Some(JsonSchemaField {
                name,
                schema: Some(schema),
                strict,
            }) if schema.is_object() => ResponseFormat::JsonSchema {
                name: name.unwrap_or_else(|| "response".to_string()),
                schema,
                strict: strict.unwrap_or(false),
            },
            _ => ResponseFormat::JsonObject,
        },
    }
}

fn normalize_features(inbound: &InboundRequest) -> FeatureFlags {
    let mut flags = FeatureFlags {
        web_search: inbound.web_search.unwrap_or(false),
        code_execution: inbound.code_execution.unwrap_or(false),
        url_context: inbound.url_context,
        thinking: false,
        reasoning_budget: inbound.reasoning_budget,
        reasoning_effort: inbound.reasoning_effort.clone(),
        computer_use: inbound.computer_use.unwrap_or(false),
    };

    for field in [inbound.thinking.as_ref(), inbound.reasoning.as_ref()]
        .into_iter()
        .flatten()
    {
        match field {
            ReasoningField::Enabled(enabled) => flags.thinking |= *enabled,
            ReasoningField::Settings {
                enabled,
                budget_tokens,
                max_tokens,
                effort,
            } => {
                flags.thinking |= enabled.unwrap_or(true);
                if flags.reasoning_budget.is_none() {
                    flags.reasoning_budget = budget_tokens.or(*max_tokens);
                }
                if flags.reasoning_effort.is_none() {
                    flags.reasoning_effort = effort.clone();
                }
            }
        }
    }

    if flags.reasoning_budget.is_some() || flags.reasoning_effort.is_some() {
        flags.thinking = true;
    }

    flags
}

#[cfg(test)]
mod tests;

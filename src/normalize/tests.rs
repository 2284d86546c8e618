use serde_json::json;

use super::*;

#[test]
fn test_minimal_request() {
    let request = normalize_chat_request(&json!({
        "model": " gpt-4o ",
        "messages": [{"role": "user", "content": "hi"}]
    }))
    .expect("minimal request should normalize");

    assert_eq!(request.model.as_deref(), Some("gpt-4o"));
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].role, MessageRole::User);
    assert_eq!(request.messages[0].content.joined_text(), "hi");
    assert!(!request.stream);
    assert!(!request.use_direct_api);
    assert_eq!(request.response_format, ResponseFormat::Text);
}

#[test]
fn test_rejects_missing_or_empty_messages() {
    let missing = normalize_chat_request(&json!({"model": "gpt-4o"})).unwrap_err();
    assert_eq!(missing.http_status(), 400);
    assert!(missing.to_string().contains("messages must be an array"));

    let empty = normalize_chat_request(&json!({"messages": []})).unwrap_err();
    assert!(empty.to_string().contains("messages must not be empty"));

    let not_object = normalize_chat_request(&json!(["hi"])).unwrap_err();
    assert_eq!(not_object.http_status(), 400);
}

#[test]
fn test_rejects_invalid_role_and_content() {
    let role = normalize_chat_request(&json!({
        "messages": [{"role": "narrator", "content": "hi"}]
    }))
    .unwrap_err();
    assert!(role.to_string().contains("messages[0].role is invalid: narrator"));

    let content = normalize_chat_request(&json!({
        "messages": [{"role": "user", "content": "ok"}, {"role": "user", "content": 42}]
    }))
    .unwrap_err();
    assert!(content.to_string().contains("messages[1].content"));
}

#[test]
fn test_tool_message_requires_tool_call_id() {
    let error = normalize_chat_request(&json!({
        "messages": [{"role": "tool", "content": "42"}]
    }))
    .unwrap_err();
    assert!(error.to_string().contains("no tool_call_id"));

    let request = normalize_chat_request(&json!({
        "messages": [{"role": "tool", "content": "42", "tool_call_id": "call_1"}]
    }))
    .expect("tool message with id should normalize");
    assert_eq!(request.messages[0].tool_call_id.as_deref(), Some("call_1"));
}

#[test]
fn test_assistant_tool_calls_with_null_content() {
    let request = normalize_chat_request(&json!({
        "messages": [
            {"role": "user", "content": "weather?"},
            {
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "weather", "arguments": "{\"city\":\"Oslo\"}"}},
                    {"id": "call_2", "type": "function", "function": {"name": "time", "arguments": {"tz": "UTC"}}}
                ]
            }
        ]
    }))
    .expect("assistant tool call message should normalize");

    let assistant = &request.messages[1];
    assert!(assistant.content.is_empty());
    assert_eq!(assistant.tool_calls.len(), 2);
    assert_eq!(assistant.tool_calls[0].arguments, "{\"city\":\"Oslo\"}");
    assert_eq!(assistant.tool_calls[1].arguments_value(), json!({"tz": "UTC"}));
}

#[test]
fn test_content_parts_and_data_urls() {
    let request = normalize_chat_request(&json!({
        "messages": [{
            "role": "user",
            "content": [
                {"type": "text", "text": "describe"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}},
                {"type": "image_url", "image_url": "https://example.com/cat.webp?size=2"},
                {"type": "file", "file": {"file_data": "data:application/pdf;base64,JVBE", "filename": "a.pdf"}},
                {"type": "audio", "audio": {}}
            ]
        }]
    }))
    .expect("parts should normalize");

    let parts = request.messages[0].content.parts();
    assert_eq!(parts.len(), 4);
    assert_eq!(
        parts[1],
        ContentPart::ImageRef {
            source: MediaSource::InlineBase64 {
                data: "AAAA".to_string()
            },
            mime_type: "image/png".to_string(),
        }
    );
    assert_eq!(
        parts[2],
        ContentPart::ImageRef {
            source: MediaSource::Url {
                url: "https://example.com/cat.webp?size=2".to_string()
            },
            mime_type: "image/webp".to_string(),
        }
    );
    assert_eq!(
        parts[3],
        ContentPart::DocumentRef {
            source: MediaSource::InlineBase64 {
                data: "JVBE".to_string()
            },
            mime_type: "application/pdf".to_string(),
            filename: Some("a.pdf".to_string()),
        }
    );
}

#[test]
fn test_parse_data_url() {
    assert_eq!(
        parse_data_url("data:image/jpeg;base64,Zm9v"),
        Some(("image/jpeg", "Zm9v"))
    );
    assert_eq!(parse_data_url("data:text/plain,hello"), None);
    assert_eq!(parse_data_url("https://example.com/a.png"), None);
}

#[test]
fn test_generation_params_are_lenient() {
    let request = normalize_chat_request(&json!({
        "messages": [{"role": "user", "content": "hi"}],
        "temperature": "hot",
        "top_p": 0.9,
        "top_k": 40,
        "max_completion_tokens": 256,
        "stop": "END",
        "seed": 7,
        "surprise": true
    }))
    .expect("malformed optional fields should be dropped");

    assert_eq!(request.params.temperature, None);
    assert_eq!(request.params.top_p, Some(0.9));
    assert_eq!(request.params.top_k, Some(40));
    assert_eq!(request.params.max_tokens, Some(256));
    assert_eq!(request.params.stop, vec!["END".to_string()]);
    assert_eq!(request.params.seed, Some(7));
}

#[test]
fn test_tools_and_tool_choice() {
    let request = normalize_chat_request(&json!({
        "messages": [{"role": "user", "content": "hi"}],
        "tools": [
            {"type": "function", "function": {"name": "weather", "description": "Look up weather", "parameters": {"type": "object"}}},
            {"type": "function", "function": {"name": "noop"}},
            {"type": "retrieval"},
            "garbage"
        ],
        "tool_choice": {"type": "function", "function": {"name": "weather"}}
    }))
    .expect("tools should normalize");

    assert_eq!(request.tools.len(), 2);
    assert_eq!(request.tools[0].name, "weather");
    assert_eq!(request.tools[1].parameters, json!({"type": "object", "properties": {}}));
    assert_eq!(
        request.tool_choice,
        Some(ToolChoice::Function {
            name: "weather".to_string()
        })
    );

    let required = normalize_chat_request(&json!({
        "messages": [{"role": "user", "content": "hi"}],
        "tool_choice": "required"
    }))
    .expect("string tool choice should normalize");
    assert_eq!(required.tool_choice, Some(ToolChoice::Required));
}

#[test]
fn test_response_format_forms() {
    let schema = normalize_chat_request(&json!({
        "messages": [{"role": "user", "content": "hi"}],
        "response_format": {
            "type": "json_schema",
            "json_schema": {"name": "answer", "schema": {"type": "object"}, "strict": true}
        }
    }))
    .expect("schema format should normalize");
    assert_eq!(
        schema.response_format,
        ResponseFormat::JsonSchema {
            name: "answer".to_string(),
            schema: json!({"type": "object"}),
            strict: true,
        }
    );

    let object = normalize_chat_request(&json!({
        "messages": [{"role": "user", "content": "hi"}],
        "response_format": {"type": "json_object"}
    }))
    .expect("json object format should normalize");
    assert_eq!(object.response_format, ResponseFormat::JsonObject);
}

#[test]
fn test_feature_flags_and_reasoning_forms() {
    let request = normalize_chat_request(&json!({
        "messages": [{"role": "user", "content": "hi"}],
        "web_search": true,
        "code_execution": true,
        "reasoning": {"effort": "high"},
        "computer_use": true,
        "use_direct_api": true,
        "stream": true
    }))
    .expect("flags should normalize");

    assert!(request.features.web_search);
    assert!(request.features.code_execution);
    assert_eq!(request.features.url_context, None);
    assert!(request.features.thinking);
    assert_eq!(request.features.reasoning_effort.as_deref(), Some("high"));
    assert!(request.features.computer_use);
    assert!(request.use_direct_api);
    assert!(request.stream);

    let budget = normalize_chat_request(&json!({
        "messages": [{"role": "user", "content": "hi"}],
        "thinking": {"budget_tokens": 2048},
        "url_context": false
    }))
    .expect("thinking object should normalize");
    assert!(budget.features.thinking);
    assert_eq!(budget.features.reasoning_budget, Some(2048));
    assert_eq!(budget.features.url_context, Some(false));

    let disabled = normalize_chat_request(&json!({
        "messages": [{"role": "user", "content": "hi"}],
        "thinking": false
    }))
    .expect("thinking flag should normalize");
    assert!(!disabled.features.thinking);
}

#[test]
fn test_provider_hint_and_preferences() {
    let hint = normalize_chat_request(&json!({
        "messages": [{"role": "user", "content": "hi"}],
        "provider": "anthropic"
    }))
    .expect("provider hint should normalize");
    assert_eq!(hint.explicit_provider.as_deref(), Some("anthropic"));
    assert_eq!(hint.provider_preferences, None);

    let preferences = normalize_chat_request(&json!({
        "messages": [{"role": "user", "content": "hi"}],
        "provider": {"order": ["together"], "allow_fallbacks": false}
    }))
    .expect("provider preferences should normalize");
    assert_eq!(preferences.explicit_provider, None);
    assert_eq!(
        preferences.provider_preferences,
        Some(json!({"order": ["together"], "allow_fallbacks": false}))
    );
}

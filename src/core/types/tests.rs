use super::*;
use serde_json::json;

#[test]
fn test_message_content_untagged_forms() {
    let text: MessageContent = serde_json::from_value(json!("hello")).expect("text content");
    assert_eq!(text, MessageContent::Text("hello".to_string()));

    let parts: MessageContent = serde_json::from_value(json!([
        {"type": "text", "text": "look"},
        {
            "type": "image_ref",
            "source": {"kind": "inline_base64", "data": "AAAA"},
            "mime_type": "image/png"
        }
    ]))
    .expect("part content");

    match &parts {
        MessageContent::Parts(parts) => {
            assert_eq!(parts.len(), 2);
            assert!(matches!(
                &parts[1],
                ContentPart::ImageRef { mime_type, .. } if mime_type == "image/png"
            ));
        }
        other => panic!("expected parts, got {other:?}"),
    }
    assert_eq!(parts.joined_text(), "look");
}

#[test]
fn test_media_source_to_url() {
    let inline = MediaSource::InlineBase64 {
        data: "Zm9v".to_string(),
    };
    assert_eq!(inline.to_url("image/jpeg"), "data:image/jpeg;base64,Zm9v");

    let remote = MediaSource::Url {
        url: "https://example.com/cat.png".to_string(),
    };
    assert_eq!(remote.to_url("image/png"), "https://example.com/cat.png");
}

#[test]
fn test_tool_call_arguments_value_tolerates_bad_json() {
    let good = ToolCall {
        id: "call_1".to_string(),
        name: "lookup".to_string(),
        arguments: r#"{"city":"SF"}"#.to_string(),
    };
    assert_eq!(good.arguments_value(), json!({"city": "SF"}));

    let bad = ToolCall {
        arguments: "{not json".to_string(),
        ..good.clone()
    };
    assert_eq!(bad.arguments_value(), json!({}));

    let scalar = ToolCall {
        arguments: "42".to_string(),
        ..good
    };
    assert_eq!(scalar.arguments_value(), json!({}));
}

#[test]
fn test_provider_id_parse_and_display() {
    assert_eq!(ProviderId::parse("OpenRouter"), Some(ProviderId::Openrouter));
    assert_eq!(ProviderId::parse(" google "), Some(ProviderId::Gemini));
    assert_eq!(ProviderId::parse("gemini"), Some(ProviderId::Gemini));
    assert_eq!(ProviderId::parse("mistral"), None);
    assert_eq!(ProviderId::Anthropic.to_string(), "anthropic");
    assert_eq!(
        serde_json::to_value(ProviderId::Openai).expect("serialize"),
        json!("openai")
    );
}

#[test]
fn test_chat_completion_shape() {
    let completion = ChatCompletion::new(
        "cmpl_1",
        "gemini-2.5-flash",
        ProviderId::Gemini,
        AssistantMessage {
            role: MessageRole::Assistant,
            content: Some("hi".to_string()),
            reasoning: None,
            tool_calls: vec![CompletionToolCall::function("call_1", "lookup", "{}")],
        },
        Some("stop".to_string()),
        CompletionUsage::new(3, 4),
    );

    let value = serde_json::to_value(&completion).expect("serialize completion");
    assert_eq!(value["object"], json!("chat.completion"));
    assert_eq!(value["choices"][0]["message"]["role"], json!("assistant"));
    assert_eq!(
        value["choices"][0]["message"]["tool_calls"][0]["type"],
        json!("function")
    );
    assert_eq!(value["usage"]["total_tokens"], json!(7));
    assert!(value.get("sources").is_none());
    assert!(value["choices"][0]["message"].get("reasoning").is_none());
    assert_eq!(completion.finish_reason(), Some("stop"));
}

#[test]
fn test_request_model_id_ignores_blank() {
    let mut request = ChatRequest::default();
    assert_eq!(request.model_id(), None);

    request.model = Some("   ".to_string());
    assert_eq!(request.model_id(), None);

    request.model = Some(" claude-3-opus ".to_string());
    assert_eq!(request.model_id(), Some("claude-3-opus"));
}

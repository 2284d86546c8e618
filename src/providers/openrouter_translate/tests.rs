use serde_json::json;

use super::OpenRouterTranslator;
use crate::core::types::{
    ChatRequest, Message, MessageRole, ProviderId, ResponseFormat, ToolChoice, ToolSpec,
};
use crate::providers::translator_contract::ProviderTranslator;

fn base_request() -> ChatRequest {
    ChatRequest {
        model: Some("meta-llama/llama-3.1-70b-instruct".to_string()),
        messages: vec![
            Message::text(MessageRole::System, "Be brief."),
            Message::text(MessageRole::User, "hello"),
        ],
        ..ChatRequest::default()
    }
}

#[test]
fn test_encode_openrouter_forwards_params_and_routing_hints() {
    let mut req = base_request();
    req.params.temperature = Some(0.4);
    req.params.top_k = Some(40);
    req.params.seed = Some(7);
    req.params.stop = vec!["###".to_string()];
    req.tools = vec![ToolSpec {
        name: "search_docs".to_string(),
        description: None,
        parameters: json!({"type":"object","properties":{}}),
    }];
    req.tool_choice = Some(ToolChoice::Required);
    req.provider_preferences = Some(json!({"order": ["Together"], "allow_fallbacks": false}));
    req.features.web_search = true;
    req.stream = true;

    let translated = OpenRouterTranslator.translate(&req);
    let body = translated.body;

    assert_eq!(translated.model, "meta-llama/llama-3.1-70b-instruct");
    assert_eq!(body["model"], "meta-llama/llama-3.1-70b-instruct");
    assert_eq!(body["messages"][0], json!({"role":"system","content":"Be brief."}));
    assert_eq!(body["top_k"], 40);
    assert_eq!(body["seed"], 7);
    assert_eq!(body["stop"], json!(["###"]));
    assert_eq!(body["tool_choice"], "required");
    assert_eq!(body["tools"][0]["function"]["name"], "search_docs");
    assert_eq!(
        body["provider"],
        json!({"order": ["Together"], "allow_fallbacks": false})
    );
    assert_eq!(body["plugins"], json!([{"id": "web"}]));
    assert_eq!(body["usage"], json!({"include": true}));
    assert!(translated.headers.is_empty());
}

#[test]
fn test_encode_openrouter_reasoning_variants() {
    let mut req = base_request();
    req.features.thinking = true;
    assert_eq!(
        OpenRouterTranslator.translate(&req).body["reasoning"],
        json!({"enabled": true})
    );

    req.features.reasoning_budget = Some(2048);
    assert_eq!(
        OpenRouterTranslator.translate(&req).body["reasoning"],
        json!({"max_tokens": 2048})
    );

    req.features.reasoning_effort = Some("High".to_string());
    assert_eq!(
        OpenRouterTranslator.translate(&req).body["reasoning"],
        json!({"effort": "high"})
    );
}

#[test]
fn test_encode_openrouter_minimal_request() {
    let mut req = base_request();
    req.model = None;
    req.response_format = ResponseFormat::JsonObject;
    req.tool_choice = Some(ToolChoice::Auto);

    let body = OpenRouterTranslator.translate(&req).body;

    assert_eq!(body["model"], "openai/gpt-4o-mini");
    assert_eq!(body["stream"], false);
    assert_eq!(body["response_format"], json!({"type":"json_object"}));
    assert!(body.get("tool_choice").is_none());
    assert!(body.get("plugins").is_none());
    assert!(body.get("reasoning").is_none());
    assert!(body.get("usage").is_none());
}

#[test]
fn test_decode_openrouter_response_keeps_provider() {
    let payload = json!({
        "id": "gen-123",
        "model": "anthropic/claude-3.5-haiku",
        "choices": [{
            "message": {"role": "assistant", "content": "hi", "reasoning": "thought"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 4, "completion_tokens": 1}
    });

    let completion = OpenRouterTranslator
        .decode_response(&payload, "anthropic/claude-3.5-haiku")
        .expect("decode");

    assert_eq!(completion.provider, ProviderId::Openrouter);
    assert_eq!(completion.id, "gen-123");
    assert_eq!(
        completion.message().and_then(|m| m.reasoning.as_deref()),
        Some("thought")
    );
    assert_eq!(completion.usage.total_tokens, 5);
}

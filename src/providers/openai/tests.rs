use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::core::error::ProviderError;
use crate::core::traits::ProviderAdapter;
use crate::core::types::{ChatRequest, Message, MessageRole, ProviderId};
use crate::providers::openai::OpenAiAdapter;
use crate::stream::NormalizedStreamEvent;
use crate::test_support::{MockResponse, MockServer};
use crate::transport::http::HttpTransport;

fn request() -> ChatRequest {
    ChatRequest {
        model: Some("gpt-4o".to_string()),
        messages: vec![Message::text(MessageRole::User, "hello")],
        ..ChatRequest::default()
    }
}

fn adapter(api_key: Option<&str>, base_url: &str) -> OpenAiAdapter {
    OpenAiAdapter::with_transport(
        api_key.map(str::to_string),
        base_url,
        HttpTransport::new(2_000).expect("transport"),
    )
}

#[tokio::test]
async fn test_openai_adapter_posts_chat_completions_with_bearer_auth() {
    let mut server = MockServer::start(vec![MockResponse::json(
        200,
        r#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[{"message":{"role":"assistant","content":"hi"},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":1}}"#,
    )]);

    let completion = adapter(Some("sk-test"), &format!("{}/", server.url()))
        .complete(&request())
        .await
        .expect("completion");

    assert_eq!(completion.provider, ProviderId::Openai);
    assert_eq!(completion.message().and_then(|m| m.content.as_deref()), Some("hi"));

    server.shutdown();
    let captured = server.captured();
    assert!(captured[0].request_line.starts_with("POST /v1/chat/completions "));
    assert_eq!(
        captured[0].headers.get("authorization"),
        Some(&"Bearer sk-test".to_string())
    );
    let body = captured[0].json_body();
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["stream"], false);
}

#[tokio::test]
async fn test_openai_adapter_streams_passthrough_chunks() {
    let mut server = MockServer::start(vec![MockResponse::event_stream(
        "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n",
    )]);

    let events = adapter(Some("sk-test"), &server.url())
        .stream(&request(), CancellationToken::new())
        .await
        .expect("stream")
        .collect_events()
        .await;

    assert_eq!(
        events,
        vec![
            NormalizedStreamEvent::Passthrough(
                "{\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}".to_string()
            ),
            NormalizedStreamEvent::StreamEnd,
        ]
    );

    server.shutdown();
    let body = server.captured()[0].json_body();
    assert_eq!(body["stream"], true);
    assert_eq!(body["stream_options"], json!({"include_usage": true}));
}

#[tokio::test]
async fn test_openai_adapter_requires_api_key_before_dispatch() {
    let error = adapter(None, "http://127.0.0.1:9")
        .complete(&request())
        .await
        .expect_err("missing key");

    assert_eq!(
        error,
        ProviderError::MissingCredential {
            provider: ProviderId::Openai,
            env_var: "OPENAI_API_KEY".to_string(),
        }
    );
}

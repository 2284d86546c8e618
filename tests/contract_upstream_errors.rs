mod common;

use chat_gateway::core::error::GatewayError;
use chat_gateway::core::types::ProviderId;
use chat_gateway::stream::NormalizedStreamEvent;
use chat_gateway::{Gateway, GatewayConfig};
use common::{MockResponse, MockServer, config_for};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const RATE_LIMITED: &str =
    r#"{"type":"error","error":{"type":"rate_limit_error","message":"Number of requests has exceeded your rate limit"}}"#;

#[tokio::test]
async fn test_upstream_rejection_passes_body_and_status_through() {
    let mut server = MockServer::start(vec![MockResponse::json(429, RATE_LIMITED)]);
    let gateway = Gateway::from_config(&config_for(&server.url())).expect("gateway");

    let error = gateway
        .complete(&json!({
            "model": "claude-sonnet-4",
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .await
        .expect_err("rejection");

    assert_eq!(error.http_status(), 429);
    assert_eq!(
        error.error_body(),
        serde_json::from_str::<serde_json::Value>(RATE_LIMITED).expect("json")
    );
    match &error {
        GatewayError::UpstreamRejection {
            provider, body, ..
        } => {
            assert_eq!(*provider, ProviderId::Anthropic);
            assert_eq!(body, RATE_LIMITED);
        }
        other => panic!("expected upstream rejection, got {other:?}"),
    }

    server.shutdown();
    assert_eq!(server.captured().len(), 1);
}

#[tokio::test]
async fn test_streaming_rejection_fails_before_any_event() {
    let mut server = MockServer::start(vec![MockResponse::json(
        400,
        r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#,
    )]);
    let gateway = Gateway::from_config(&config_for(&server.url())).expect("gateway");

    let error = gateway
        .stream(
            &json!({
                "model": "gemini-2.5-flash",
                "stream": true,
                "messages": [{"role": "user", "content": "hi"}],
            }),
            CancellationToken::new(),
        )
        .await
        .err()
        .expect("rejection");

    assert_eq!(error.http_status(), 400);
    match error.error_event() {
        NormalizedStreamEvent::Error {
            message,
            error_type,
        } => {
            assert!(message.contains("API key not valid"));
            assert_eq!(error_type, "upstream_error");
        }
        other => panic!("expected error event, got {other:?}"),
    }
    // The key rides in the query string and must not leak into the message.
    assert!(!error.to_string().contains("g-key"));
    server.shutdown();
}

#[tokio::test]
async fn test_missing_credential_is_not_dispatched() {
    let gateway = Gateway::from_config(&GatewayConfig::default()).expect("gateway");

    let error = gateway
        .complete(&json!({
            "model": "claude-sonnet-4",
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .await
        .expect_err("missing key");

    assert_eq!(error.http_status(), 500);
    assert_eq!(error.error_type(), "configuration_error");
    assert!(error.to_string().contains("ANTHROPIC_API_KEY"));
}

#[tokio::test]
async fn test_feature_validation_error_body_is_structured() {
    let gateway = Gateway::from_config(&GatewayConfig::default()).expect("gateway");

    let error = gateway
        .complete(&json!({
            "model": "openai/gpt-4o",
            "code_execution": true,
            "url_context": true,
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .await
        .expect_err("validation");

    assert_eq!(error.http_status(), 400);
    let body = error.error_body();
    assert_eq!(body["requested"], json!(["code_execution", "url_context"]));
    assert_eq!(body["supported"], json!([]));
    assert_eq!(body["errors"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_transport_failure_is_a_bad_gateway() {
    let config = config_for("http://127.0.0.1:9");
    let gateway = Gateway::from_config(&config).expect("gateway");

    let error = gateway
        .complete(&json!({
            "model": "gpt-4o",
            "use_direct_api": true,
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .await
        .expect_err("connection refused");

    assert_eq!(error.http_status(), 502);
    assert_eq!(error.error_type(), "transport_error");
}

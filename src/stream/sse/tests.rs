use serde_json::{Value, json};

use super::*;
use crate::core::types::Source;
use crate::stream::ExecutionOutcome;

fn encoder() -> SseEncoder {
    SseEncoder::new("chatcmpl-test", "gemini-2.5-flash").with_created(1_700_000_000)
}

fn decode(frame: &str) -> Value {
    let payload = frame
        .strip_prefix("data: ")
        .and_then(|rest| rest.strip_suffix("\n\n"))
        .expect("frame should be data-prefixed and blank-line terminated");
    serde_json::from_str(payload).expect("frame payload should be json")
}

#[test]
fn test_content_delta_chunk_shape() {
    let frame = encoder().encode(&NormalizedStreamEvent::ContentDelta("Hi".to_string()));
    assert_eq!(
        decode(&frame),
        json!({
            "id": "chatcmpl-test",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000u64,
            "model": "gemini-2.5-flash",
            "choices": [{"index": 0, "delta": {"content": "Hi"}, "finish_reason": null}],
        })
    );
}

#[test]
fn test_tool_call_indices_follow_first_seen_order() {
    let mut encoder = encoder();
    let first = decode(&encoder.encode(&NormalizedStreamEvent::ToolCallDelta {
        id: "b".to_string(),
        name: "beta".to_string(),
        arguments: String::new(),
    }));
    let second = decode(&encoder.encode(&NormalizedStreamEvent::ToolCallDelta {
        id: "a".to_string(),
        name: "alpha".to_string(),
        arguments: "{}".to_string(),
    }));
    let continued = decode(&encoder.encode(&NormalizedStreamEvent::ToolCallDelta {
        id: "b".to_string(),
        name: "beta".to_string(),
        arguments: "{\"x\":1}".to_string(),
    }));
    let complete = decode(&encoder.encode(&NormalizedStreamEvent::ToolCallComplete {
        id: "b".to_string(),
        name: "beta".to_string(),
        arguments: "{\"x\":1}".to_string(),
    }));

    assert_eq!(
        first["choices"][0]["delta"]["tool_calls"][0],
        json!({"index": 0, "id": "b", "type": "function", "function": {"name": "beta", "arguments": ""}})
    );
    assert_eq!(second["choices"][0]["delta"]["tool_calls"][0]["index"], 1);
    assert_eq!(
        continued["choices"][0]["delta"]["tool_calls"][0],
        json!({"index": 0, "function": {"arguments": "{\"x\":1}"}})
    );
    assert_eq!(complete["type"], "tool_event");
    assert_eq!(complete["index"], 0);
    assert_eq!(complete["tool_call"]["function"]["arguments"], "{\"x\":1}");
}

#[test]
fn test_private_event_frames() {
    let mut encoder = encoder();

    let code = decode(&encoder.encode(&NormalizedStreamEvent::CodeExecution {
        language: "python".to_string(),
        code: "print(1)".to_string(),
    }));
    assert_eq!(code, json!({"type": "code_execution", "language": "python", "code": "print(1)"}));

    let result = decode(&encoder.encode(&NormalizedStreamEvent::CodeExecutionResult {
        outcome: ExecutionOutcome::Error,
        output: "boom".to_string(),
    }));
    assert_eq!(
        result,
        json!({"type": "code_execution_result", "outcome": "error", "output": "boom"})
    );

    let sources = decode(&encoder.encode(&NormalizedStreamEvent::Sources(vec![Source {
        title: "A".to_string(),
        url: "https://a.example".to_string(),
    }])));
    assert_eq!(
        sources,
        json!({"type": "sources", "sources": [{"title": "A", "url": "https://a.example"}]})
    );

    let error = decode(&encoder.encode(&NormalizedStreamEvent::Error {
        message: "upstream closed".to_string(),
        error_type: "transport_error".to_string(),
    }));
    assert_eq!(
        error,
        json!({"error": {"message": "upstream closed", "type": "transport_error"}})
    );
}

#[test]
fn test_finish_usage_and_done() {
    let mut encoder = encoder();

    let finish = decode(&encoder.encode(&NormalizedStreamEvent::FinishReason("stop".to_string())));
    assert_eq!(
        finish["choices"],
        json!([{"index": 0, "delta": {}, "finish_reason": "stop"}])
    );

    let usage = decode(&encoder.encode(&NormalizedStreamEvent::Usage {
        prompt_tokens: 3,
        completion_tokens: 4,
    }));
    assert_eq!(usage["choices"], json!([]));
    assert_eq!(
        usage["usage"],
        json!({"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7})
    );

    assert_eq!(encoder.encode(&NormalizedStreamEvent::StreamEnd), DONE_FRAME);
}

#[test]
fn test_passthrough_is_byte_for_byte() {
    let raw = r#"{"id":"gen-1","choices":[{"delta":{"content":"x"}}],"provider":"Together"}"#;
    assert_eq!(
        encoder().encode(&NormalizedStreamEvent::Passthrough(raw.to_string())),
        format!("data: {raw}\n\n")
    );
}

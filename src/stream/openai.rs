use serde_json::Value;

use super::lines::{LineBuffer, sse_data};
use super::{NormalizedStreamEvent, StreamNormalizer};

/// Near-passthrough normalizer for the aggregator and OpenAI-direct streams.
///
/// Both already speak the outbound chunk format, so every `data:` payload that
/// parses as JSON is forwarded verbatim and `[DONE]` ends the stream.
#[derive(Debug, Default)]
pub struct OpenAiStreamNormalizer {
    lines: LineBuffer,
    ended: bool,
}

impl OpenAiStreamNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<NormalizedStreamEvent>) {
        if self.ended {
            return;
        }

        let Some(payload) = sse_data(line) else {
            return;
        };
        let payload = payload.trim_end();

        if payload == "[DONE]" {
            self.ended = true;
            events.push(NormalizedStreamEvent::StreamEnd);
            return;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(object)) if object.contains_key("error") => {
                let error = &object["error"];
                events.push(NormalizedStreamEvent::Error {
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string()),
                    error_type: error
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("upstream_error")
                        .to_string(),
                });
            }
            Ok(_) => events.push(NormalizedStreamEvent::Passthrough(payload.to_string())),
            Err(error) => {
                tracing::debug!(error = %error, "dropping malformed stream line");
            }
        }
    }
}

impl StreamNormalizer for OpenAiStreamNormalizer {
    fn consume(&mut self, chunk: &[u8]) -> Vec<NormalizedStreamEvent> {
        let mut events = Vec::new();
        for line in self.lines.push(chunk) {
            self.handle_line(&line, &mut events);
        }
        events
    }

    fn flush(&mut self) -> Vec<NormalizedStreamEvent> {
        let mut events = Vec::new();
        if let Some(line) = self.lines.take_remainder() {
            self.handle_line(&line, &mut events);
        }
        if !self.ended {
            self.ended = true;
            events.push(NormalizedStreamEvent::StreamEnd);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_lines_forwarded_verbatim() {
        let mut normalizer = OpenAiStreamNormalizer::new();
        let chunk = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n: OPENROUTER PROCESSING\n\ndata: [DONE]\n\n";

        let events = normalizer.consume(chunk.as_bytes());
        assert_eq!(
            events,
            vec![
                NormalizedStreamEvent::Passthrough(
                    "{\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}".to_string()
                ),
                NormalizedStreamEvent::StreamEnd,
            ]
        );
        assert!(normalizer.flush().is_empty());
    }

    #[test]
    fn test_split_line_and_malformed_payload() {
        let mut normalizer = OpenAiStreamNormalizer::new();
        assert!(normalizer.consume(b"data: {\"id\":").is_empty());
        assert_eq!(
            normalizer.consume(b"\"x\"}\ndata: {broken\n"),
            vec![NormalizedStreamEvent::Passthrough("{\"id\":\"x\"}".to_string())]
        );
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut normalizer = OpenAiStreamNormalizer::new();
        normalizer.consume(b"data: {\"id\":\"tail\"}");
        assert_eq!(
            normalizer.flush(),
            vec![
                NormalizedStreamEvent::Passthrough("{\"id\":\"tail\"}".to_string()),
                NormalizedStreamEvent::StreamEnd,
            ]
        );
        assert!(normalizer.flush().is_empty());
    }

    #[test]
    fn test_inline_error_payload() {
        let mut normalizer = OpenAiStreamNormalizer::new();
        let events = normalizer
            .consume(b"data: {\"error\":{\"message\":\"overloaded\",\"type\":\"server_error\"}}\n");
        assert_eq!(
            events,
            vec![NormalizedStreamEvent::Error {
                message: "overloaded".to_string(),
                error_type: "server_error".to_string(),
            }]
        );
    }
}

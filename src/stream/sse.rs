//! Outbound `data: <json>\n\n` framing of normalized events.

use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexSet;
use serde_json::{Value, json};

use super::NormalizedStreamEvent;

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Encodes normalized events as OpenAI `chat.completion.chunk` frames, with
/// private `type`-tagged frames for payloads the chunk schema cannot carry.
///
/// One encoder per response: it owns the stable chunk id and the tool-call
/// index table.
#[derive(Debug)]
pub struct SseEncoder {
    id: String,
    model: String,
    created: u64,
    tool_indices: IndexSet<String>,
}

impl SseEncoder {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();

        Self {
            id: id.into(),
            model: model.into(),
            created,
            tool_indices: IndexSet::new(),
        }
    }

    pub fn with_created(mut self, created: u64) -> Self {
        self.created = created;
        self
    }

    /// Renders one event as a complete SSE frame.
    pub fn encode(&mut self, event: &NormalizedStreamEvent) -> String {
        match event {
            NormalizedStreamEvent::Passthrough(raw) => format!("data: {raw}\n\n"),
            NormalizedStreamEvent::StreamEnd => DONE_FRAME.to_string(),
            other => frame(&self.payload(other)),
        }
    }

    fn payload(&mut self, event: &NormalizedStreamEvent) -> Value {
        match event {
            NormalizedStreamEvent::ContentDelta(text) => self.delta(json!({ "content": text })),
            NormalizedStreamEvent::ReasoningDelta(text) => {
                self.delta(json!({ "reasoning": text }))
            }
            NormalizedStreamEvent::ToolCallDelta {
                id,
                name,
                arguments,
            } => {
                let (index, first_seen) = self.tool_index(id);
                let call = if first_seen {
                    json!({
                        "index": index,
                        "id": id,
                        "type": "function",
                        "function": { "name": name, "arguments": arguments },
                    })
                } else {
                    json!({ "index": index, "function": { "arguments": arguments } })
                };
                self.delta(json!({ "tool_calls": [call] }))
            }
            NormalizedStreamEvent::ToolCallComplete {
                id,
                name,
                arguments,
            } => {
                let (index, _) = self.tool_index(id);
                json!({
                    "type": "tool_event",
                    "status": "completed",
                    "index": index,
                    "tool_call": {
                        "id": id,
                        "type": "function",
                        "function": { "name": name, "arguments": arguments },
                    },
                })
            }
            NormalizedStreamEvent::CodeExecution { language, code } => json!({
                "type": "code_execution",
                "language": language,
                "code": code,
            }),
            NormalizedStreamEvent::CodeExecutionResult { outcome, output } => json!({
                "type": "code_execution_result",
                "outcome": outcome.as_str(),
                "output": output,
            }),
            NormalizedStreamEvent::Sources(sources) => json!({
                "type": "sources",
                "sources": sources,
            }),
            NormalizedStreamEvent::ImageGenerated { mime_type, data } => json!({
                "type": "image",
                "mime_type": mime_type,
                "data": data,
            }),
            NormalizedStreamEvent::Usage {
                prompt_tokens,
                completion_tokens,
            } => {
                let mut chunk = self.chunk(Vec::new());
                chunk["usage"] = json!({
                    "prompt_tokens": prompt_tokens,
                    "completion_tokens": completion_tokens,
                    "total_tokens": prompt_tokens + completion_tokens,
                });
                chunk
            }
            NormalizedStreamEvent::FinishReason(reason) => self.chunk(vec![json!({
                "index": 0,
                "delta": {},
                "finish_reason": reason,
            })]),
            NormalizedStreamEvent::Error {
                message,
                error_type,
            } => json!({ "error": { "message": message, "type": error_type } }),
            NormalizedStreamEvent::Passthrough(_) | NormalizedStreamEvent::StreamEnd => Value::Null,
        }
    }

    /// Index of a tool call in first-seen order, and whether this is its first sighting.
    fn tool_index(&mut self, id: &str) -> (usize, bool) {
        match self.tool_indices.get_index_of(id) {
            Some(index) => (index, false),
            None => self.tool_indices.insert_full(id.to_string()),
        }
    }

    fn delta(&self, delta: Value) -> Value {
        self.chunk(vec![json!({
            "index": 0,
            "delta": delta,
            "finish_reason": Value::Null,
        })])
    }

    fn chunk(&self, choices: Vec<Value>) -> Value {
        json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": choices,
        })
    }
}

fn frame(payload: &Value) -> String {
    format!("data: {payload}\n\n")
}

#[cfg(test)]
mod tests;

//! Upstream stream normalization.
//!
//! Each provider gets a [`StreamNormalizer`]: an explicit per-request state
//! struct fed raw upstream bytes through `consume` and closed with `flush`.
//! [`NormalizedEventStream`] drives one normalizer from an upstream body and is
//! what callers pull events from.

pub mod anthropic;
pub mod gemini;
pub mod lines;
pub mod openai;
pub mod scanner;
pub mod sse;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::core::error::ProviderError;
use crate::core::types::Source;

pub use anthropic::AnthropicStreamNormalizer;
pub use gemini::GeminiStreamNormalizer;
pub use openai::OpenAiStreamNormalizer;
pub use sse::SseEncoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Ok,
    Error,
}

impl ExecutionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Provider-independent event emitted while a completion streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedStreamEvent {
    ContentDelta(String),
    ReasoningDelta(String),
    ToolCallDelta {
        id: String,
        name: String,
        arguments: String,
    },
    ToolCallComplete {
        id: String,
        name: String,
        arguments: String,
    },
    CodeExecution {
        language: String,
        code: String,
    },
    CodeExecutionResult {
        outcome: ExecutionOutcome,
        output: String,
    },
    Sources(Vec<Source>),
    ImageGenerated {
        mime_type: String,
        data: String,
    },
    Usage {
        prompt_tokens: u64,
        completion_tokens: u64,
    },
    FinishReason(String),
    Error {
        message: String,
        error_type: String,
    },
    /// An upstream `data:` payload that is already in the outbound chunk format.
    Passthrough(String),
    StreamEnd,
}

/// Per-request decoder from a provider's incremental wire format.
///
/// `consume` must tolerate chunk boundaries anywhere, including inside a
/// multi-byte character or a JSON string. `flush` emits exactly one
/// [`NormalizedStreamEvent::StreamEnd`] over the normalizer's lifetime, so
/// calling it again is a no-op.
pub trait StreamNormalizer: Send {
    fn consume(&mut self, chunk: &[u8]) -> Vec<NormalizedStreamEvent>;

    fn flush(&mut self) -> Vec<NormalizedStreamEvent>;
}

pub type UpstreamBody = BoxStream<'static, Result<Vec<u8>, ProviderError>>;

/// Pull-driven event stream over one upstream response body.
///
/// The upstream body is only read when the caller polls. Dropping the stream or
/// cancelling its token drops the body, which closes the upstream connection.
pub struct NormalizedEventStream {
    upstream: Option<UpstreamBody>,
    normalizer: Box<dyn StreamNormalizer>,
    pending: VecDeque<NormalizedStreamEvent>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    finished: bool,
}

impl NormalizedEventStream {
    pub fn new(
        upstream: UpstreamBody,
        normalizer: Box<dyn StreamNormalizer>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            upstream: Some(upstream),
            normalizer,
            pending: VecDeque::new(),
            cancelled: Box::pin(cancel.cancelled_owned()),
            finished: false,
        }
    }

    /// Drains the whole stream into a vector.
    pub async fn collect_events(self) -> Vec<NormalizedStreamEvent> {
        self.collect().await
    }

    fn close_upstream(&mut self) {
        if self.upstream.take().is_some() {
            tracing::debug!("closing upstream response body");
        }
    }
}

impl Stream for NormalizedEventStream {
    type Item = NormalizedStreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if !this.finished && this.cancelled.as_mut().poll(cx).is_ready() {
                tracing::debug!("stream cancelled by caller");
                this.close_upstream();
                this.pending.clear();
                this.finished = true;
            }

            if let Some(event) = this.pending.pop_front() {
                if event == NormalizedStreamEvent::StreamEnd {
                    this.close_upstream();
                    this.pending.clear();
                    this.finished = true;
                }
                return Poll::Ready(Some(event));
            }

            if this.finished {
                return Poll::Ready(None);
            }

            let Some(upstream) = this.upstream.as_mut() else {
                this.pending.extend(this.normalizer.flush());
                if this.pending.is_empty() {
                    this.finished = true;
                }
                continue;
            };

            match upstream.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    this.pending.extend(this.normalizer.consume(&chunk));
                }
                Poll::Ready(Some(Err(error))) => {
                    tracing::error!(error = %error, "upstream stream failed");
                    this.close_upstream();
                    this.pending.push_back(NormalizedStreamEvent::Error {
                        message: error.to_string(),
                        error_type: "transport_error".to_string(),
                    });
                }
                Poll::Ready(None) => this.close_upstream(),
            }
        }
    }
}

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::catalog;
use crate::core::error::ProviderError;
use crate::core::types::{ChatCompletion, ChatRequest, ProviderCapabilities, ProviderId};
use crate::stream::NormalizedEventStream;

/// Provider adapter contract: translate a normalized request, call the
/// upstream once, and return a normalized result.
///
/// Adapters never retry. Every call may bill upstream, so a failure is
/// reported once and the caller decides what to do.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable provider identifier for routing and diagnostics.
    fn id(&self) -> ProviderId;

    /// Gated feature support; defaults to the static capability table.
    fn capabilities(&self) -> ProviderCapabilities {
        catalog::capabilities(self.id())
    }

    /// Executes a single non-streaming request.
    async fn complete(&self, req: &ChatRequest) -> Result<ChatCompletion, ProviderError>;

    /// Opens an upstream stream and wraps it in the provider's normalizer.
    ///
    /// A non-2xx upstream status is returned as an error before any event is
    /// produced. Cancelling `cancel` (or dropping the stream) closes the
    /// upstream body.
    async fn stream(
        &self,
        req: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<NormalizedEventStream, ProviderError>;
}

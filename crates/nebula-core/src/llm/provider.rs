//! LlmProvider trait definition.
//!
//! The model collaborator the agent talks to. Uses RPITIT for `complete`
//! and `Pin<Box<dyn Stream>>` for `stream` (streams need to be object-safe
//! for the BoxLlmProvider wrapper).

use std::pin::Pin;

use futures_util::Stream;

use nebula_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent};

/// Boxed stream of provider events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// Trait for language-model backends.
///
/// A well-behaved stream yields zero or more `TextDelta` events followed by
/// exactly one `Done`. A stream that ends without `Done`, or yields an
/// `Err`, is treated as a provider fault by the caller.
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;

    /// Send a streaming completion request. Returns a stream of events.
    ///
    /// Dropping the returned stream must release the underlying call.
    fn stream(&self, request: CompletionRequest) -> EventStream;
}

//! Agent execution engine for nebula.
//!
//! AgentEngine assembles a CompletionRequest from the conversation so far
//! plus the new prompt, sends it through BoxLlmProvider, and returns either
//! the event stream or the full response. GenAI spans instrument every call.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use nebula_types::config::AgentConfig;
use nebula_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent};
use nebula_types::message::Message;
use pin_project_lite::pin_project;
use tracing::{Instrument, debug, info_span};

use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::provider::EventStream;

/// Executes model calls on behalf of an agent.
pub struct AgentEngine {
    provider: BoxLlmProvider,
}

impl AgentEngine {
    pub fn new(provider: BoxLlmProvider) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Build a request from prior turns plus the new user prompt.
    ///
    /// `history` is sent in order, followed by `prompt` as a user message.
    pub fn build_request(
        config: &AgentConfig,
        system_prompt: Option<String>,
        history: Vec<Message>,
        prompt: &str,
        stream: bool,
    ) -> CompletionRequest {
        let mut messages = history;
        messages.push(Message::user(prompt));

        CompletionRequest {
            model: config.model.clone(),
            messages,
            system: system_prompt,
            max_tokens: config.max_tokens,
            temperature: Some(config.temperature),
            stream,
        }
    }

    /// Start a streaming call. The span stays open until the stream is dropped.
    pub fn execute(&self, request: CompletionRequest) -> EventStream {
        let span = info_span!(
            "gen_ai.execute",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            gen_ai.request.stream = true,
            gen_ai.request.messages = request.messages.len(),
        );
        debug!(parent: &span, "starting streaming call");

        let stream = self.provider.stream(request);
        Box::pin(StreamInSpan {
            inner: stream,
            span,
        })
    }

    /// Run a non-streaming call and return the full response.
    pub async fn execute_non_streaming(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let span = info_span!(
            "gen_ai.complete",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            gen_ai.request.stream = false,
            gen_ai.request.messages = request.messages.len(),
        );

        self.provider.complete(request).instrument(span).await
    }
}

pin_project! {
    /// Keeps a span entered while the wrapped stream is polled.
    struct StreamInSpan<St> {
        #[pin]
        inner: St,
        span: tracing::Span,
    }
}

impl<St> Stream for StreamInSpan<St>
where
    St: Stream<Item = Result<StreamEvent, LlmError>>,
{
    type Item = Result<StreamEvent, LlmError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let _enter = this.span.enter();
        this.inner.poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedProvider;
    use futures_util::StreamExt;

    fn config() -> AgentConfig {
        AgentConfig {
            model: "test-model".to_string(),
            max_tokens: 256,
            temperature: 0.2,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_request_appends_prompt_after_history() {
        let history = vec![Message::user("Hi"), Message::assistant("Hello!")];
        let request = AgentEngine::build_request(
            &config(),
            Some("Be brief.".to_string()),
            history,
            "What is my name?",
            true,
        );

        assert_eq!(request.model, "test-model");
        assert_eq!(request.max_tokens, 256);
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.system.as_deref(), Some("Be brief."));
        assert!(request.stream);
        let contents: Vec<&str> = request.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Hi", "Hello!", "What is my name?"]);
    }

    #[tokio::test]
    async fn test_execute_streams_provider_events() {
        let engine = AgentEngine::new(BoxLlmProvider::new(ScriptedProvider::new(["a", "b"])));
        let request = AgentEngine::build_request(&config(), None, vec![], "go", true);

        let events: Vec<_> = engine.execute(request).collect().await;
        assert!(matches!(events.first(), Some(Ok(StreamEvent::Connected))));
        assert!(matches!(events.last(), Some(Ok(StreamEvent::Done))));
    }

    #[tokio::test]
    async fn test_execute_non_streaming() {
        let engine = AgentEngine::new(BoxLlmProvider::new(ScriptedProvider::replying("All good")));
        assert_eq!(engine.provider_name(), "scripted");

        let request = AgentEngine::build_request(&config(), None, vec![], "status?", false);
        let response = engine.execute_non_streaming(&request).await.unwrap();
        assert_eq!(response.content, "All good");
    }
}

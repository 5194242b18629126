//! Scripted provider that replays a fixed sequence of chunks.
//!
//! Used to drive the agent without a network model: offline demos, and the
//! test suites of this crate and nebula-infra. Every call replays the same
//! script and records the request it was given.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nebula_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent, Usage};

use super::provider::{EventStream, LlmProvider};

/// How a scripted stream ends once its chunks are exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptEnding {
    /// Emit `Done`.
    Done,
    /// Emit a provider error.
    Fault(String),
    /// End the stream without `Done`.
    Truncate,
    /// Never yield again.
    Hang,
}

/// A provider that replays `chunks` then `ending` on every call.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    name: String,
    chunks: Vec<String>,
    ending: ScriptEnding,
    chunk_delay: Option<Duration>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    open_streams: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new<I, T>(chunks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            name: "scripted".to_string(),
            chunks: chunks.into_iter().map(Into::into).collect(),
            ending: ScriptEnding::Done,
            chunk_delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Split `text` into word-sized chunks, keeping the separating spaces.
    pub fn replying(text: &str) -> Self {
        Self::new(text.split_inclusive(' ').map(str::to_string))
    }

    pub fn with_ending(mut self, ending: ScriptEnding) -> Self {
        self.ending = ending;
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Streams that have started and not yet been dropped.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    fn record(&self, request: &CompletionRequest) {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
    }

    fn usage(&self) -> Usage {
        Usage {
            input_tokens: 0,
            output_tokens: self.chunks.len() as u32,
        }
    }
}

struct OpenStreamGuard(Arc<AtomicUsize>);

impl OpenStreamGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for OpenStreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.record(request);
        match &self.ending {
            ScriptEnding::Fault(message) => Err(LlmError::Provider {
                message: message.clone(),
            }),
            ScriptEnding::Hang => std::future::pending().await,
            ScriptEnding::Done | ScriptEnding::Truncate => Ok(CompletionResponse {
                id: format!("scripted-{}", uuid::Uuid::now_v7()),
                content: self.chunks.concat(),
                model: request.model.clone(),
                usage: self.usage(),
            }),
        }
    }

    fn stream(&self, request: CompletionRequest) -> EventStream {
        self.record(&request);
        let chunks = self.chunks.clone();
        let ending = self.ending.clone();
        let delay = self.chunk_delay;
        let usage = self.usage();
        let counter = Arc::clone(&self.open_streams);

        Box::pin(async_stream::stream! {
            let _open = OpenStreamGuard::new(counter);
            yield Ok(StreamEvent::Connected);

            for text in chunks {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(StreamEvent::TextDelta { text });
            }

            match ending {
                ScriptEnding::Done => {
                    yield Ok(StreamEvent::Usage(usage));
                    yield Ok(StreamEvent::Done);
                }
                ScriptEnding::Fault(message) => {
                    yield Err(LlmError::Stream(message));
                }
                ScriptEnding::Truncate => {}
                ScriptEnding::Hang => {
                    std::future::pending::<()>().await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "test-model".to_string(),
            messages: vec![],
            system: None,
            max_tokens: 100,
            temperature: None,
            stream: true,
        }
    }

    #[tokio::test]
    async fn test_stream_replays_chunks_then_done() {
        let provider = ScriptedProvider::replying("Hello there world");
        let events: Vec<_> = provider.stream(request()).collect().await;

        let texts: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                Ok(StreamEvent::TextDelta { text }) => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Hello ", "there ", "world"]);
        assert!(matches!(events.last(), Some(Ok(StreamEvent::Done))));
        assert_eq!(provider.requests().len(), 1);
        assert_eq!(provider.open_streams(), 0);
    }

    #[tokio::test]
    async fn test_stream_fault_ending() {
        let provider =
            ScriptedProvider::new(["a", "b"]).with_ending(ScriptEnding::Fault("boom".into()));
        let events: Vec<_> = provider.stream(request()).collect().await;
        assert!(matches!(events.last(), Some(Err(LlmError::Stream(m))) if m == "boom"));
    }

    #[tokio::test]
    async fn test_complete_concatenates() {
        let provider = ScriptedProvider::new(["Hi", ", ", "Alice"]);
        let response = provider.complete(&request()).await.unwrap();
        assert_eq!(response.content, "Hi, Alice");
        assert_eq!(response.model, "test-model");
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_it() {
        let provider = ScriptedProvider::new(["a"]).with_ending(ScriptEnding::Hang);
        let mut stream = provider.stream(request());
        let _ = stream.next().await;
        assert_eq!(provider.open_streams(), 1);
        drop(stream);
        assert_eq!(provider.open_streams(), 0);
    }
}

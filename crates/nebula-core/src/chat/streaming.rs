//! Streaming response coordinator.
//!
//! Drives one provider stream to completion: accumulates text deltas in
//! arrival order, forwards each one to the caller's chunk handler, and
//! isolates handler faults so a misbehaving consumer never aborts an
//! otherwise healthy response. The coordinator never touches the buffer;
//! committing the finished turn is the caller's job.
//!
//! Per call: `Idle -> Requesting -> Streaming -> Completed | Failed | Cancelled`.

use std::panic::{AssertUnwindSafe, catch_unwind};

use futures_util::StreamExt;
use nebula_types::error::AgentError;
use nebula_types::llm::{LlmError, StreamEvent, Usage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::llm::provider::EventStream;

/// Lifecycle of a single streaming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Requesting,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl StreamPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamPhase::Completed | StreamPhase::Failed | StreamPhase::Cancelled
        )
    }
}

/// A chunk handler that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFault {
    /// Zero-based index of the chunk that was being handled.
    pub index: usize,
    pub message: String,
}

/// Outcome of a completed streaming call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamReport {
    /// Concatenation of every chunk, in arrival order.
    pub text: String,
    pub chunks: usize,
    /// Handler faults that were caught and skipped.
    pub faults: Vec<ChunkFault>,
    pub usage: Option<Usage>,
}

/// Drives a provider stream and tracks its phase.
#[derive(Debug)]
pub struct StreamingCoordinator {
    phase: StreamPhase,
}

impl Default for StreamingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingCoordinator {
    pub fn new() -> Self {
        Self {
            phase: StreamPhase::Idle,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Mark that the request has been handed to the provider.
    pub fn begin(&mut self) {
        self.phase = StreamPhase::Requesting;
    }

    /// Consume `stream` until `Done`, a provider fault, or cancellation.
    ///
    /// `on_chunk` runs synchronously on the calling task, once per text
    /// delta, in order. Returning `Err` or panicking from it is recorded as a
    /// [`ChunkFault`] and streaming continues. A stream that ends without
    /// `Done` counts as a provider fault. On cancellation the stream is
    /// dropped before returning, which releases the provider call.
    pub async fn drive<F>(
        &mut self,
        mut stream: EventStream,
        mut on_chunk: F,
        cancel: &CancellationToken,
    ) -> Result<StreamReport, AgentError>
    where
        F: FnMut(&str) -> anyhow::Result<()>,
    {
        if self.phase == StreamPhase::Idle {
            self.begin();
        }
        let mut report = StreamReport::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                event = stream.next() => Some(event),
            };
            let Some(event) = next else {
                drop(stream);
                self.phase = StreamPhase::Cancelled;
                debug!(chunks = report.chunks, "streaming call cancelled");
                return Err(AgentError::Cancelled);
            };

            match event {
                Some(Ok(StreamEvent::Connected)) => {
                    self.phase = StreamPhase::Streaming;
                }
                Some(Ok(StreamEvent::TextDelta { text })) => {
                    self.phase = StreamPhase::Streaming;
                    let index = report.chunks;
                    report.text.push_str(&text);
                    report.chunks += 1;
                    if let Err(message) = deliver(&mut on_chunk, &text) {
                        warn!(index, error = %message, "chunk handler failed; continuing stream");
                        report.faults.push(ChunkFault { index, message });
                    }
                }
                Some(Ok(StreamEvent::Usage(usage))) => {
                    report.usage = Some(usage);
                }
                Some(Ok(StreamEvent::Done)) => {
                    self.phase = StreamPhase::Completed;
                    debug!(
                        chunks = report.chunks,
                        faults = report.faults.len(),
                        "stream completed"
                    );
                    return Ok(report);
                }
                Some(Err(err)) => {
                    self.phase = StreamPhase::Failed;
                    warn!(error = %err, chunks = report.chunks, "provider fault during stream");
                    return Err(AgentError::Provider(err));
                }
                None => {
                    self.phase = StreamPhase::Failed;
                    warn!(chunks = report.chunks, "stream ended without completion signal");
                    return Err(AgentError::Provider(LlmError::Stream(
                        "stream ended before completion".to_string(),
                    )));
                }
            }
        }
    }
}

/// Invoke the handler, converting both error returns and panics to a message.
fn deliver<F>(on_chunk: &mut F, chunk: &str) -> Result<(), String>
where
    F: FnMut(&str) -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(|| on_chunk(chunk))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

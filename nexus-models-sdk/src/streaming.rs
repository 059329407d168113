//! # Streaming Abstraction
//!
//! A completion stream is a finite, forward-only sequence of
//! [`StreamChunk`]s with deferred aggregate usage and a single release point
//! for the underlying transport.
//!
//! ## Overview
//!
//! - [`CompletionStream`]: the polymorphic stream object every provider
//!   returns from `complete_stream`
//! - [`SseStream`]: turns an upstream byte stream of server-sent events into
//!   chunks, with blank-line and comment skipping and `[DONE]` handling
//! - [`ReplayStream`]: an in-memory stream over pre-built chunks, used by
//!   fixtures and tests
//!
//! The contract every implementation honors:
//!
//! - once `next` has returned `None`, every subsequent `next` returns `None`
//! - `usage` is `None` until the stream produced its terminal chunk, then
//!   returns the same final value forever
//! - `close` releases the transport and is idempotent; reaching end of
//!   stream, hitting an error, or dropping the consumer all converge on the
//!   same release path

use crate::error::ProviderError;
use crate::models::{StreamChunk, Usage};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;

/// A finite, forward-only sequence of completion chunks.
///
/// Streams are consumed by a single reader. They are restartable only from
/// the beginning, by issuing a new request.
#[async_trait]
pub trait CompletionStream: Send {
    /// The next chunk, or `None` at end of sequence.
    async fn next(&mut self) -> Option<Result<StreamChunk, ProviderError>>;

    /// Final token counts, available once the stream has produced its
    /// terminal chunk. `None` before that.
    fn usage(&self) -> Option<Usage>;

    /// Release the underlying transport. Idempotent.
    async fn close(&mut self);
}

/// Boxed stream object, the form providers hand to the pipeline.
pub type BoxCompletionStream = Box<dyn CompletionStream>;

/// One semantic event decoded from an SSE data payload.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A content delta.
    Chunk(StreamChunk),
    /// The terminal-usage event.
    Usage(Usage),
    /// A sentinel terminal event other than `[DONE]`.
    Done,
}

/// Adapter-supplied decoder from one SSE data payload to semantic events.
///
/// Each adapter knows its own frame format; the [`SseStream`] handles the
/// transport-level concerns (line splitting, comments, `[DONE]`, teardown)
/// and defers payload interpretation to this function.
pub type EventDecoder = Box<dyn Fn(&str) -> Result<Vec<StreamEvent>, ProviderError> + Send + Sync>;

/// Lazy SSE chunk iterator over an upstream byte stream.
///
/// Holds the transport until the stream is drained, closed, or fails;
/// whichever comes first releases it.
pub struct SseStream<S> {
    inner: Option<S>,
    decode: EventDecoder,
    buffer: String,
    pending: VecDeque<StreamChunk>,
    usage: Option<Usage>,
    finished: bool,
}

impl<S, B, E> SseStream<S>
where
    S: Stream<Item = Result<B, E>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
    E: Into<ProviderError> + Send,
{
    pub fn new(inner: S, decode: EventDecoder) -> Self {
        Self {
            inner: Some(inner),
            decode,
            buffer: String::new(),
            pending: VecDeque::new(),
            usage: None,
            finished: false,
        }
    }

    fn release(&mut self) {
        self.inner = None;
    }

    fn drain_lines(&mut self) -> Result<(), ProviderError> {
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            self.handle_line(line.trim_end_matches(['\n', '\r']))?;
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Result<(), ProviderError> {
        // Blank keep-alive lines and comment lines are not events.
        if line.is_empty() || line.starts_with(':') {
            return Ok(());
        }
        let payload = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
        if payload == "[DONE]" {
            self.finished = true;
            return Ok(());
        }
        for event in (self.decode)(payload)? {
            match event {
                StreamEvent::Chunk(chunk) => self.pending.push_back(chunk),
                StreamEvent::Usage(usage) => self.usage = Some(usage),
                StreamEvent::Done => self.finished = true,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<S, B, E> CompletionStream for SseStream<S>
where
    S: Stream<Item = Result<B, E>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
    E: Into<ProviderError> + Send,
{
    async fn next(&mut self) -> Option<Result<StreamChunk, ProviderError>> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some(Ok(chunk));
            }
            if self.finished {
                self.release();
                return None;
            }
            let inner = self.inner.as_mut()?;
            match inner.next().await {
                Some(Ok(bytes)) => {
                    self.buffer.push_str(&String::from_utf8_lossy(bytes.as_ref()));
                    if let Err(err) = self.drain_lines() {
                        self.finished = true;
                        self.release();
                        return Some(Err(err));
                    }
                }
                Some(Err(err)) => {
                    self.finished = true;
                    self.release();
                    return Some(Err(err.into()));
                }
                None => {
                    // EOF terminates the stream; a final line without a
                    // trailing newline still counts.
                    self.finished = true;
                    if !self.buffer.is_empty() {
                        let tail = std::mem::take(&mut self.buffer);
                        if let Err(err) = self.handle_line(tail.trim_end_matches(['\n', '\r'])) {
                            self.release();
                            return Some(Err(err));
                        }
                    }
                }
            }
        }
    }

    fn usage(&self) -> Option<Usage> {
        self.usage
    }

    async fn close(&mut self) {
        self.finished = true;
        self.pending.clear();
        self.release();
    }
}

/// In-memory stream over pre-built chunks.
///
/// Usage becomes observable only after the terminal chunk (one carrying a
/// finish reason) has been yielded, or at end of sequence, matching the
/// deferred-usage contract of live streams.
pub struct ReplayStream {
    pending: VecDeque<StreamChunk>,
    deferred_usage: Option<Usage>,
    usage: Option<Usage>,
    closed: bool,
}

impl ReplayStream {
    pub fn new(chunks: Vec<StreamChunk>, usage: Option<Usage>) -> Self {
        Self {
            pending: chunks.into(),
            deferred_usage: usage,
            usage: None,
            closed: false,
        }
    }
}

#[async_trait]
impl CompletionStream for ReplayStream {
    async fn next(&mut self) -> Option<Result<StreamChunk, ProviderError>> {
        if self.closed {
            return None;
        }
        match self.pending.pop_front() {
            Some(chunk) => {
                if chunk.finish_reason.is_some() || self.pending.is_empty() {
                    self.usage = self.deferred_usage;
                }
                Some(Ok(chunk))
            }
            None => {
                self.usage = self.deferred_usage;
                None
            }
        }
    }

    fn usage(&self) -> Option<Usage> {
        self.usage
    }

    async fn close(&mut self) {
        self.closed = true;
        self.pending.clear();
    }
}

//! Streaming-side guards.
//!
//! A [`StreamGuard`] inspects each chunk (optionally with an accumulated
//! window of recent content) and decides to pass, drop, replace, or block.
//! [`GuardedStream`] wraps a raw provider stream and applies the guards in
//! order; close and usage propagate to the wrapped stream.

use async_trait::async_trait;
use nexus_models_sdk::error::ProviderError;
use nexus_models_sdk::models::{StreamChunk, Usage};
use nexus_models_sdk::streaming::{BoxCompletionStream, CompletionStream};
use std::sync::Arc;

/// Verdict for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamAction {
    /// Deliver the chunk unchanged.
    Pass,
    /// Suppress the chunk and continue the stream.
    Drop,
    /// Substitute the chunk's delta content.
    Replace(String),
    /// Terminate the stream with an error carrying the reason.
    Block(String),
}

/// Buffer discipline for stream scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamScanMode {
    /// Inspect each chunk in isolation.
    PerChunk,
    /// Inspect a sliding window of accumulated content, capped at
    /// `window_chars`, so content split across chunk boundaries is caught.
    Accumulate { window_chars: usize },
}

/// A per-chunk content inspector.
pub trait StreamGuard: Send + Sync {
    fn name(&self) -> &str;

    /// Inspect one chunk. `window` is the accumulated recent content under
    /// [`StreamScanMode::Accumulate`], or just this chunk's content under
    /// [`StreamScanMode::PerChunk`].
    fn inspect(&self, chunk: &StreamChunk, window: &str) -> StreamAction;
}

/// Blocks the stream when a configured literal shows up in the scan window.
pub struct KeywordStreamGuard {
    name: String,
    keywords: Vec<String>,
}

impl KeywordStreamGuard {
    pub fn new(name: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            name: name.into(),
            keywords,
        }
    }
}

impl StreamGuard for KeywordStreamGuard {
    fn name(&self) -> &str {
        &self.name
    }

    fn inspect(&self, _chunk: &StreamChunk, window: &str) -> StreamAction {
        for keyword in &self.keywords {
            if window.contains(keyword.as_str()) {
                return StreamAction::Block(format!("stream contains forbidden content: {keyword}"));
            }
        }
        StreamAction::Pass
    }
}

/// A raw provider stream with guards interposed.
pub struct GuardedStream {
    inner: BoxCompletionStream,
    guards: Vec<Arc<dyn StreamGuard>>,
    mode: StreamScanMode,
    window: String,
    terminated: bool,
}

impl GuardedStream {
    pub fn new(
        inner: BoxCompletionStream,
        guards: Vec<Arc<dyn StreamGuard>>,
        mode: StreamScanMode,
    ) -> Self {
        Self {
            inner,
            guards,
            mode,
            window: String::new(),
            terminated: false,
        }
    }

    fn scan_window(&mut self, chunk: &StreamChunk) -> String {
        let content = chunk.delta.content.as_deref().unwrap_or("");
        match self.mode {
            StreamScanMode::PerChunk => content.to_string(),
            StreamScanMode::Accumulate { window_chars } => {
                self.window.push_str(content);
                if self.window.len() > window_chars {
                    let cut = self.window.len() - window_chars;
                    let boundary = (cut..self.window.len())
                        .find(|i| self.window.is_char_boundary(*i))
                        .unwrap_or(0);
                    self.window.drain(..boundary);
                }
                self.window.clone()
            }
        }
    }
}

#[async_trait]
impl CompletionStream for GuardedStream {
    async fn next(&mut self) -> Option<Result<StreamChunk, ProviderError>> {
        if self.terminated {
            return None;
        }
        'pull: loop {
            let mut chunk = match self.inner.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => return Some(Err(err)),
                None => return None,
            };

            let window = self.scan_window(&chunk);
            for guard in &self.guards {
                match guard.inspect(&chunk, &window) {
                    StreamAction::Pass => {}
                    StreamAction::Drop => continue 'pull,
                    StreamAction::Replace(text) => {
                        chunk.delta.content = Some(text);
                    }
                    StreamAction::Block(reason) => {
                        self.terminated = true;
                        self.inner.close().await;
                        return Some(Err(ProviderError::Stream {
                            message: format!("content blocked: {reason}"),
                        }));
                    }
                }
            }
            return Some(Ok(chunk));
        }
    }

    fn usage(&self) -> Option<Usage> {
        self.inner.usage()
    }

    async fn close(&mut self) {
        self.inner.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_models_sdk::models::{Delta, FinishReason};
    use nexus_models_sdk::streaming::ReplayStream;

    fn chunk(content: &str, finish: Option<FinishReason>) -> StreamChunk {
        StreamChunk {
            id: "s-1".to_string(),
            provider: "test".to_string(),
            model: "test-model".to_string(),
            delta: Delta {
                content: Some(content.to_string()),
                ..Default::default()
            },
            finish_reason: finish,
        }
    }

    fn replay(contents: &[&str]) -> BoxCompletionStream {
        let mut chunks: Vec<StreamChunk> = contents.iter().map(|c| chunk(c, None)).collect();
        chunks.push(chunk("", Some(FinishReason::Stop)));
        Box::new(ReplayStream::new(chunks, Some(Usage::new(5, 3))))
    }

    #[tokio::test]
    async fn test_pass_through_preserves_order_and_usage() {
        let mut stream = GuardedStream::new(replay(&["Hello", " ", "world"]), vec![], StreamScanMode::PerChunk);
        let mut contents = Vec::new();
        while let Some(item) = stream.next().await {
            let item = item.unwrap();
            if item.finish_reason.is_none() {
                contents.push(item.delta.content.unwrap());
            }
        }
        assert_eq!(contents, vec!["Hello", " ", "world"]);
        assert_eq!(stream.usage(), Some(Usage::new(5, 3)));
    }

    #[tokio::test]
    async fn test_block_terminates_stream() {
        let guard: Arc<dyn StreamGuard> =
            Arc::new(KeywordStreamGuard::new("kw", vec!["bomb".to_string()]));
        let mut stream = GuardedStream::new(
            replay(&["how to ", "build a bomb", " at home"]),
            vec![guard],
            StreamScanMode::Accumulate { window_chars: 256 },
        );

        assert!(stream.next().await.unwrap().is_ok());
        match stream.next().await {
            Some(Err(ProviderError::Stream { message })) => {
                assert!(message.contains("blocked"));
            }
            other => panic!("expected block, got {other:?}"),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_accumulate_catches_split_content() {
        // The keyword never appears inside a single chunk.
        let guard: Arc<dyn StreamGuard> =
            Arc::new(KeywordStreamGuard::new("kw", vec!["secret".to_string()]));
        let mut stream = GuardedStream::new(
            replay(&["sec", "ret plan"]),
            vec![guard],
            StreamScanMode::Accumulate { window_chars: 64 },
        );
        assert!(stream.next().await.unwrap().is_ok());
        assert!(matches!(stream.next().await, Some(Err(_))));
    }

    #[tokio::test]
    async fn test_per_chunk_misses_split_content() {
        let guard: Arc<dyn StreamGuard> =
            Arc::new(KeywordStreamGuard::new("kw", vec!["secret".to_string()]));
        let mut stream = GuardedStream::new(
            replay(&["sec", "ret plan"]),
            vec![guard],
            StreamScanMode::PerChunk,
        );
        let mut errors = 0;
        while let Some(item) = stream.next().await {
            if item.is_err() {
                errors += 1;
            }
        }
        assert_eq!(errors, 0);
    }

    #[tokio::test]
    async fn test_replace_substitutes_content() {
        struct Redactor;
        impl StreamGuard for Redactor {
            fn name(&self) -> &str {
                "redactor"
            }
            fn inspect(&self, chunk: &StreamChunk, _window: &str) -> StreamAction {
                match chunk.delta.content.as_deref() {
                    Some(c) if c.contains("555-0199") => {
                        StreamAction::Replace(c.replace("555-0199", "[REDACTED]"))
                    }
                    _ => StreamAction::Pass,
                }
            }
        }

        let mut stream = GuardedStream::new(
            replay(&["call 555-0199 now"]),
            vec![Arc::new(Redactor)],
            StreamScanMode::PerChunk,
        );
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.delta.content.as_deref(), Some("call [REDACTED] now"));
    }

    #[tokio::test]
    async fn test_drop_suppresses_chunk() {
        struct DropEmpty;
        impl StreamGuard for DropEmpty {
            fn name(&self) -> &str {
                "drop-empty"
            }
            fn inspect(&self, chunk: &StreamChunk, _window: &str) -> StreamAction {
                match chunk.delta.content.as_deref() {
                    Some("") | None if chunk.finish_reason.is_none() => StreamAction::Drop,
                    _ => StreamAction::Pass,
                }
            }
        }

        let mut chunks = vec![chunk("a", None), chunk("", None), chunk("b", None)];
        chunks.push(chunk("", Some(FinishReason::Stop)));
        let inner: BoxCompletionStream = Box::new(ReplayStream::new(chunks, None));
        let mut stream = GuardedStream::new(inner, vec![Arc::new(DropEmpty)], StreamScanMode::PerChunk);

        let mut contents = Vec::new();
        while let Some(item) = stream.next().await {
            let item = item.unwrap();
            if item.finish_reason.is_none() {
                contents.push(item.delta.content.unwrap());
            }
        }
        assert_eq!(contents, vec!["a", "b"]);
    }
}

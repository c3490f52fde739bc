//! Inference engine seam
//!
//! The controller talks to the native inference library only through these
//! traits. Streaming output arrives on a bounded channel that ends with an
//! explicit terminal event; session teardown hands back an acknowledgment
//! the controller can await before building the next session.

#[cfg(test)]
pub(crate) mod fake;
#[cfg(feature = "local-ai")]
pub mod llama;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::models::{ChatMessage, ModelParameters, Template};

/// Buffered events between the engine worker and the consumer
pub const STREAM_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EngineFailure(pub String);

impl EngineFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// One item of streamed output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Token(String),
    Finished,
    Failed(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Token(_))
    }
}

/// Producer half, owned by the engine worker
#[derive(Debug, Clone)]
pub struct TokenSink {
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl TokenSink {
    /// Returns false once the consumer is gone or cancelled
    pub async fn send(&self, event: StreamEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(event).await.is_ok()
    }

    /// For engine workers running on a plain thread
    pub fn blocking_send(&self, event: StreamEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.blocking_send(event).is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

/// Consumer half of a generation
#[derive(Debug)]
pub struct TokenStream {
    rx: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
}

impl TokenStream {
    pub fn channel() -> (TokenSink, TokenStream) {
        Self::with_capacity(STREAM_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (TokenSink, TokenStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        (
            TokenSink {
                tx,
                cancel: cancel.clone(),
            },
            TokenStream { rx, cancel },
        )
    }

    /// A stream that has already failed
    pub fn failed(reason: impl Into<String>) -> TokenStream {
        let (sink, stream) = Self::with_capacity(1);
        // Capacity 1 and a fresh channel: try_send cannot fail here
        let _ = sink.tx.try_send(StreamEvent::Failed(reason.into()));
        stream
    }

    /// Next event, or `None` after cancellation or once the producer is gone
    pub async fn next(&mut self) -> Option<StreamEvent> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.rx.recv() => event,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Resolves once the native session has released its resources
#[derive(Debug)]
pub struct TeardownAck(oneshot::Receiver<()>);

impl TeardownAck {
    pub fn channel() -> (oneshot::Sender<()>, TeardownAck) {
        let (tx, rx) = oneshot::channel();
        (tx, TeardownAck(rx))
    }

    /// Already torn down
    pub fn done() -> TeardownAck {
        let (tx, ack) = Self::channel();
        let _ = tx.send(());
        ack
    }

    /// Wait up to `limit`; true if the engine acknowledged in time.
    /// A dropped sender counts as acknowledged.
    pub async fn wait(self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.0).await.is_ok()
    }
}

#[async_trait]
pub trait InferenceEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn create_session(
        &self,
        model_path: &Path,
        template: &Template,
    ) -> Result<Arc<dyn InferenceSession>, EngineFailure>;
}

#[async_trait]
pub trait InferenceSession: Send + Sync {
    /// Start generating a reply to `prompt` given the prior turns
    fn respond(&self, history: &[ChatMessage], prompt: &str) -> TokenStream;

    /// Ask the engine to cease generating
    async fn stop(&self);

    /// Tokenize for counting only; may block
    fn encode(&self, text: &str) -> Result<Vec<i32>, EngineFailure>;

    fn apply_parameters(&self, params: &ModelParameters) -> Result<(), EngineFailure>;

    /// Release native resources
    fn shutdown(&self) -> TeardownAck;
}

/// Engine used when the binary is built without an inference backend
#[derive(Debug, Default)]
pub struct UnavailableEngine;

#[async_trait]
impl InferenceEngine for UnavailableEngine {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn create_session(
        &self,
        _model_path: &Path,
        _template: &Template,
    ) -> Result<Arc<dyn InferenceSession>, EngineFailure> {
        Err(EngineFailure::new(
            "no inference backend (rebuild with --features local-ai)",
        ))
    }
}

/// Engine selected at build time
pub fn default_engine() -> Arc<dyn InferenceEngine> {
    #[cfg(feature = "local-ai")]
    {
        match llama::LlamaEngine::new() {
            Ok(engine) => return Arc::new(engine),
            Err(e) => tracing::error!("llama backend failed to initialize: {}", e),
        }
    }
    Arc::new(UnavailableEngine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TemplateType;

    #[tokio::test]
    async fn test_stream_delivers_then_ends() {
        let (sink, mut stream) = TokenStream::channel();
        tokio::spawn(async move {
            sink.send(StreamEvent::Token("a".into())).await;
            sink.send(StreamEvent::Finished).await;
        });

        assert_eq!(stream.next().await, Some(StreamEvent::Token("a".into())));
        assert_eq!(stream.next().await, Some(StreamEvent::Finished));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_cancel_stops_stream_and_sink() {
        let (sink, mut stream) = TokenStream::channel();
        assert!(sink.send(StreamEvent::Token("a".into())).await);

        stream.cancel();
        assert!(sink.is_cancelled());
        assert!(!sink.send(StreamEvent::Token("b".into())).await);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_failed_stream() {
        let mut stream = TokenStream::failed("boom");
        let event = stream.next().await.unwrap();
        assert!(event.is_terminal());
        assert_eq!(event, StreamEvent::Failed("boom".into()));
    }

    #[tokio::test]
    async fn test_teardown_ack() {
        assert!(TeardownAck::done().wait(Duration::from_millis(10)).await);

        let (tx, ack) = TeardownAck::channel();
        drop(tx);
        assert!(ack.wait(Duration::from_millis(10)).await);

        let (_tx, ack) = TeardownAck::channel();
        assert!(!ack.wait(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_unavailable_engine_fails() {
        let engine = UnavailableEngine;
        let template = Template::new(TemplateType::ChatMl, None);
        let result = engine.create_session(Path::new("/m.gguf"), &template).await;
        assert!(result.is_err());
    }
}

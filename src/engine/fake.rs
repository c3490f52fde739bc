//! Scripted engine for tests. Records every call in order.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::{
    EngineFailure, InferenceEngine, InferenceSession, StreamEvent, TeardownAck, TokenStream,
};
use crate::models::{ChatMessage, ModelParameters, Template};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Create { session: u32, filename: String },
    Respond { session: u32, prompt: String },
    Stop { session: u32 },
    Shutdown { session: u32 },
    ApplyParameters { session: u32, params: ModelParameters },
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<String>>,
    reply: Mutex<Vec<String>>,
    hold_open: AtomicBool,
    reject_parameters: AtomicBool,
    next_session: AtomicU32,
}

impl Shared {
    fn record(&self, call: Call) {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(call);
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeEngine {
    shared: Arc<Shared>,
}

impl FakeEngine {
    pub(crate) fn new() -> Self {
        let engine = Self::default();
        engine.set_reply(&["Hello", " there"]);
        engine
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.shared
            .calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.shared
            .calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    /// Session construction fails for this filename
    pub(crate) fn fail_on(&self, filename: &str) {
        self.shared
            .failing
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(filename.to_string());
    }

    pub(crate) fn succeed_on(&self, filename: &str) {
        self.shared
            .failing
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(filename);
    }

    pub(crate) fn set_reply(&self, tokens: &[&str]) {
        *self.shared.reply.lock().unwrap_or_else(|p| p.into_inner()) =
            tokens.iter().map(|t| t.to_string()).collect();
    }

    /// Streams stay open after the reply until stopped
    pub(crate) fn hold_open(&self, hold: bool) {
        self.shared.hold_open.store(hold, Ordering::SeqCst);
    }

    pub(crate) fn reject_parameters(&self, reject: bool) {
        self.shared.reject_parameters.store(reject, Ordering::SeqCst);
    }

    pub(crate) fn created_filenames(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create { filename, .. } => Some(filename),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl InferenceEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create_session(
        &self,
        model_path: &Path,
        _template: &Template,
    ) -> Result<Arc<dyn InferenceSession>, EngineFailure> {
        let filename = model_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let session = self.shared.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.record(Call::Create {
            session,
            filename: filename.clone(),
        });

        let failing = self
            .shared
            .failing
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&filename);
        if failing {
            return Err(EngineFailure::new("model could not be loaded"));
        }

        Ok(Arc::new(FakeSession {
            id: session,
            shared: Arc::clone(&self.shared),
            stopped: Arc::new(Notify::new()),
        }))
    }
}

struct FakeSession {
    id: u32,
    shared: Arc<Shared>,
    stopped: Arc<Notify>,
}

#[async_trait]
impl InferenceSession for FakeSession {
    fn respond(&self, _history: &[ChatMessage], prompt: &str) -> TokenStream {
        self.shared.record(Call::Respond {
            session: self.id,
            prompt: prompt.to_string(),
        });

        let tokens = self
            .shared
            .reply
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        let hold_open = self.shared.hold_open.load(Ordering::SeqCst);
        let stopped = Arc::clone(&self.stopped);
        let (sink, stream) = TokenStream::channel();

        tokio::spawn(async move {
            for token in tokens {
                if !sink.send(StreamEvent::Token(token)).await {
                    return;
                }
            }
            if hold_open {
                stopped.notified().await;
                return;
            }
            sink.send(StreamEvent::Finished).await;
        });

        stream
    }

    async fn stop(&self) {
        self.shared.record(Call::Stop { session: self.id });
        self.stopped.notify_waiters();
    }

    fn encode(&self, text: &str) -> Result<Vec<i32>, EngineFailure> {
        Ok(text.split_whitespace().map(|w| w.len() as i32).collect())
    }

    fn apply_parameters(&self, params: &ModelParameters) -> Result<(), EngineFailure> {
        self.shared.record(Call::ApplyParameters {
            session: self.id,
            params: *params,
        });
        if self.shared.reject_parameters.load(Ordering::SeqCst) {
            return Err(EngineFailure::new("sampler rejected parameters"));
        }
        Ok(())
    }

    fn shutdown(&self) -> TeardownAck {
        self.shared.record(Call::Shutdown { session: self.id });
        TeardownAck::done()
    }
}

//! Streaming generation against the active session.
//!
//! Each generation gets a fresh id. Output reaches the conversation only
//! through `apply_event`, which drops events carrying any id other than the
//! current one, so tokens that arrive after a stop or a model switch are
//! discarded.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ActiveGeneration, ControllerState, ModelController, PendingOp};
use crate::engine::{StreamEvent, TokenStream};
use crate::error::{AppError, ChatError, ValidationError};
use crate::models::ChatMessage;

/// How long `stop` may take before the flag is cleared anyway
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);
pub const MAX_PROMPT_CHARS: usize = 32 * 1024;

/// A generation in flight
#[derive(Debug)]
pub struct GenerationHandle {
    pub id: u64,
    pub stream: TokenStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Token appended to the reply
    Applied,
    /// The generation ended normally
    Finished,
    /// Event belonged to a stopped or superseded generation
    Ignored,
}

impl ModelController {
    pub fn is_generating(&self) -> bool {
        self.generation.is_some()
    }

    /// Validate the prompt, check it fits the context window and start
    /// streaming a reply
    pub async fn begin_generation(&mut self, prompt: &str) -> Result<GenerationHandle, AppError> {
        self.retry = None;
        let session = match (&self.session, self.state) {
            (Some(session), ControllerState::Ready) => session.clone(),
            _ => return Err(self.report(ChatError::ModelNotReady)),
        };
        if self.generation.is_some() {
            return Err(self.report(ValidationError::OperationInProgress {
                operation: "generation".to_string(),
            }));
        }

        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(self.report(ChatError::InvalidInput {
                reason: "message is empty".to_string(),
            }));
        }
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(self.report(ValidationError::TooLong {
                field: "message".to_string(),
                max_length: MAX_PROMPT_CHARS,
            }));
        }

        let mut text = self.conversation.transcript();
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(prompt);
        let tokens = self.count_tokens(text).await.map_err(|e| self.report(e))?;
        let limit = self.parameters.context_size as usize;
        if tokens > limit {
            return Err(self.report(ChatError::ContextOverflow { tokens, limit }));
        }

        let history = self.conversation.messages().to_vec();
        self.conversation.push(ChatMessage::user(prompt));
        self.conversation.push(ChatMessage::assistant(""));

        let stream = session.respond(&history, prompt);
        self.last_generation_id += 1;
        let id = self.last_generation_id;
        self.generation = Some(ActiveGeneration {
            id,
            prompt: prompt.to_string(),
            cancel: stream.cancel_token(),
        });
        debug!(generation = id, tokens, "generation started");
        Ok(GenerationHandle { id, stream })
    }

    /// Apply one streamed event to the conversation
    pub fn apply_event(&mut self, id: u64, event: StreamEvent) -> Result<EventOutcome, AppError> {
        if self.generation.as_ref().map(|g| g.id) != Some(id) {
            debug!(generation = id, "dropping stale stream event");
            return Ok(EventOutcome::Ignored);
        }

        match event {
            StreamEvent::Token(text) => {
                if !self.conversation.append_to_reply(&text) {
                    // The reply turn is gone, so was the conversation
                    self.generation = None;
                    return Ok(EventOutcome::Ignored);
                }
                Ok(EventOutcome::Applied)
            }
            StreamEvent::Finished => {
                self.generation = None;
                debug!(generation = id, "generation finished");
                Ok(EventOutcome::Finished)
            }
            StreamEvent::Failed(reason) => {
                let prompt = self
                    .generation
                    .take()
                    .map(|g| g.prompt)
                    .unwrap_or_default();
                self.conversation.discard_empty_reply();
                Err(self.report_retryable(
                    PendingOp::Generate(prompt),
                    ChatError::GenerationFailed { reason },
                ))
            }
        }
    }

    /// Ask the engine to stop and clear the generating flag regardless of
    /// whether a terminal event ever arrives. Returns false if idle.
    pub async fn stop_generation(&mut self) -> bool {
        let Some(generation) = self.generation.take() else {
            return false;
        };
        generation.cancel.cancel();

        if let Some(session) = self.session.clone() {
            if tokio::time::timeout(STOP_TIMEOUT, session.stop()).await.is_err() {
                warn!(generation = generation.id, "engine did not stop in time");
                self.report(ChatError::StopFailed {
                    reason: format!("no response within {:?}", STOP_TIMEOUT),
                });
            }
        }

        self.conversation.discard_empty_reply();
        info!(generation = generation.id, "generation stopped");
        self.note(format!("generation {} stopped", generation.id));
        true
    }

    /// Run a whole generation and return the reply text
    pub async fn generate(&mut self, prompt: &str) -> Result<String, AppError> {
        let mut handle = self.begin_generation(prompt).await?;
        loop {
            // A stream that closes without a terminal event counts as finished
            let event = handle.stream.next().await.unwrap_or(StreamEvent::Finished);
            match self.apply_event(handle.id, event)? {
                EventOutcome::Applied => continue,
                EventOutcome::Finished | EventOutcome::Ignored => break,
            }
        }
        Ok(self.conversation.last_reply().unwrap_or_default().to_string())
    }

    /// Send `prompt` again after a failed attempt, replacing that attempt's
    /// turns instead of repeating them
    pub async fn regenerate(&mut self, prompt: &str) -> Result<String, AppError> {
        if self.conversation.discard_exchange(prompt.trim()) {
            debug!("discarded failed exchange");
        }
        self.generate(prompt).await
    }

    /// Tokens used by the conversation so far, and the context size
    pub async fn context_usage(&self) -> Result<(usize, usize), AppError> {
        let limit = self.parameters.context_size as usize;
        if self.session.is_none() || self.conversation.is_empty() {
            return Ok((0, limit));
        }
        let used = self
            .count_tokens(self.conversation.transcript())
            .await
            .map_err(|e| self.report(e))?;
        Ok((used, limit))
    }

    async fn count_tokens(&self, text: String) -> Result<usize, AppError> {
        let Some(session) = self.session.clone() else {
            return Err(ChatError::ModelNotReady.into());
        };
        match tokio::task::spawn_blocking(move || session.encode(&text)).await {
            Ok(Ok(tokens)) => Ok(tokens.len()),
            Ok(Err(e)) => Err(ChatError::UnexpectedResponse {
                detail: format!("tokenizer: {}", e),
            }
            .into()),
            Err(e) => Err(ChatError::GenerationFailed {
                reason: format!("tokenizer task: {}", e),
            }
            .into()),
        }
    }
}

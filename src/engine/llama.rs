//! llama-cpp-2 backed engine
//!
//! Only available when the `local-ai` feature is enabled. Generation runs on
//! a dedicated thread per reply and streams tokens back through the
//! `TokenSink`; shutdown joins those threads before acknowledging.

use async_trait::async_trait;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel};
use llama_cpp_2::sampling::LlamaSampler;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    EngineFailure, InferenceEngine, InferenceSession, StreamEvent, TeardownAck, TokenSink,
    TokenStream,
};
use crate::models::{ChatMessage, MessageRole, ModelParameters, Template, TemplateType};

/// Upper bound on tokens produced for one reply
const MAX_REPLY_TOKENS: usize = 2048;

pub struct LlamaEngine {
    backend: Arc<LlamaBackend>,
}

impl LlamaEngine {
    pub fn new() -> Result<Self, EngineFailure> {
        let backend = LlamaBackend::init().map_err(|e| EngineFailure::new(e.to_string()))?;
        Ok(Self {
            backend: Arc::new(backend),
        })
    }
}

#[async_trait]
impl InferenceEngine for LlamaEngine {
    fn name(&self) -> &str {
        "llama.cpp"
    }

    async fn create_session(
        &self,
        model_path: &Path,
        template: &Template,
    ) -> Result<Arc<dyn InferenceSession>, EngineFailure> {
        let backend = Arc::clone(&self.backend);
        let path = model_path.to_path_buf();

        let model = tokio::task::spawn_blocking(move || {
            let model_params = LlamaModelParams::default();
            LlamaModel::load_from_file(&backend, &path, &model_params)
        })
        .await
        .map_err(|e| EngineFailure::new(format!("loader task: {}", e)))?
        .map_err(|e| EngineFailure::new(e.to_string()))?;

        Ok(Arc::new(LlamaSession {
            model: Arc::new(model),
            backend: Arc::clone(&self.backend),
            template: template.clone(),
            params: Mutex::new(ModelParameters::default()),
            current: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
        }))
    }
}

struct LlamaSession {
    model: Arc<LlamaModel>,
    backend: Arc<LlamaBackend>,
    template: Template,
    params: Mutex<ModelParameters>,
    /// Cancellation for the reply in progress
    current: Mutex<Option<CancellationToken>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl LlamaSession {
    fn params(&self) -> ModelParameters {
        *self.params.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn cancel_current(&self) {
        if let Some(token) = self
            .current
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            token.cancel();
        }
    }
}

#[async_trait]
impl InferenceSession for LlamaSession {
    fn respond(&self, history: &[ChatMessage], prompt: &str) -> TokenStream {
        let (sink, stream) = TokenStream::channel();
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = Some(stream.cancel_token());

        let text = format_prompt(&self.template, history, prompt);
        let model = Arc::clone(&self.model);
        let backend = Arc::clone(&self.backend);
        let params = self.params();

        let spawned = std::thread::Builder::new()
            .name("pocketchat-generate".to_string())
            .spawn(move || {
                let event = match run_generation(&model, &backend, &params, &text, &sink) {
                    Ok(()) => StreamEvent::Finished,
                    Err(e) => StreamEvent::Failed(e.to_string()),
                };
                sink.blocking_send(event);
            });
        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                warn!("could not start generation thread: {}", e);
                return TokenStream::failed(format!("could not start generation: {}", e));
            }
        };

        let mut workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        workers.retain(|w| !w.is_finished());
        workers.push(worker);
        stream
    }

    async fn stop(&self) {
        self.cancel_current();
    }

    fn encode(&self, text: &str) -> Result<Vec<i32>, EngineFailure> {
        let tokens = self
            .model
            .str_to_token(text, AddBos::Always)
            .map_err(|e| EngineFailure::new(e.to_string()))?;
        Ok(tokens.iter().map(|t| t.0).collect())
    }

    fn apply_parameters(&self, params: &ModelParameters) -> Result<(), EngineFailure> {
        *self.params.lock().unwrap_or_else(|p| p.into_inner()) = *params;
        Ok(())
    }

    fn shutdown(&self) -> TeardownAck {
        self.cancel_current();
        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();

        let (tx, ack) = TeardownAck::channel();
        std::thread::spawn(move || {
            for worker in workers {
                if worker.join().is_err() {
                    warn!("generation thread panicked");
                }
            }
            if tx.send(()).is_err() {
                debug!("teardown finished after the controller stopped waiting");
            }
        });
        ack
    }
}

fn run_generation(
    model: &LlamaModel,
    backend: &LlamaBackend,
    params: &ModelParameters,
    prompt: &str,
    sink: &TokenSink,
) -> anyhow::Result<()> {
    let n_ctx = NonZeroU32::new(params.context_size)
        .ok_or_else(|| anyhow::anyhow!("context size must be positive"))?;
    let ctx_params = LlamaContextParams::default().with_n_ctx(Some(n_ctx));
    let mut ctx = model.new_context(backend, ctx_params)?;

    let tokens = model.str_to_token(prompt, AddBos::Always)?;
    if tokens.len() >= params.context_size as usize {
        anyhow::bail!("prompt uses {} of {} context tokens", tokens.len(), params.context_size);
    }

    let mut batch = LlamaBatch::new(tokens.len().max(512), 1);
    let last = tokens.len().saturating_sub(1);
    for (i, token) in tokens.iter().enumerate() {
        batch.add(*token, i as i32, &[0], i == last)?;
    }
    ctx.decode(&mut batch)?;

    let mut sampler = sampler_chain(params);
    let mut n_cur = batch.n_tokens();
    for _ in 0..MAX_REPLY_TOKENS {
        if sink.is_cancelled() {
            debug!("generation cancelled");
            return Ok(());
        }

        let token = sampler.sample(&ctx, batch.n_tokens() - 1);
        sampler.accept(token);

        if model.is_eog_token(token) {
            break;
        }

        let piece = model.token_to_str(token, Default::default())?;
        if !sink.blocking_send(StreamEvent::Token(piece)) {
            return Ok(());
        }

        batch.clear();
        batch.add(token, n_cur, &[0], true)?;
        n_cur += 1;
        if n_cur as u32 >= params.context_size {
            break;
        }
        ctx.decode(&mut batch)?;
    }
    Ok(())
}

/// Top-k and top-p truncation, temperature, then a seeded draw
fn sampler_chain(params: &ModelParameters) -> LlamaSampler {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    LlamaSampler::chain_simple([
        LlamaSampler::top_k(params.top_k.max(1) as i32),
        LlamaSampler::top_p(params.top_p, 1),
        LlamaSampler::temp(params.temperature.max(0.01)),
        LlamaSampler::dist(seed),
    ])
}

/// Wrap the conversation in the delimiters of the model family
fn format_prompt(template: &Template, history: &[ChatMessage], prompt: &str) -> String {
    let (system, user, assistant, end) = match template.template_type {
        TemplateType::ChatMl => (
            "<|im_start|>system\n",
            "<|im_start|>user\n",
            "<|im_start|>assistant\n",
            "<|im_end|>\n",
        ),
        TemplateType::Llama3 => (
            "<|start_header_id|>system<|end_header_id|>\n\n",
            "<|start_header_id|>user<|end_header_id|>\n\n",
            "<|start_header_id|>assistant<|end_header_id|>\n\n",
            "<|eot_id|>",
        ),
        TemplateType::Gemma => (
            "<start_of_turn>user\n",
            "<start_of_turn>user\n",
            "<start_of_turn>model\n",
            "<end_of_turn>\n",
        ),
        TemplateType::Phi3 => ("<|system|>\n", "<|user|>\n", "<|assistant|>\n", "<|end|>\n"),
        TemplateType::Mistral => ("[INST] ", "[INST] ", "", " [/INST]"),
        TemplateType::Alpaca => ("", "### Instruction:\n", "### Response:\n", "\n\n"),
    };

    let mut text = String::new();
    if let Some(ref system_prompt) = template.system_prompt {
        text.push_str(system);
        text.push_str(system_prompt);
        text.push_str(end);
    }
    for message in history {
        let open = match message.role {
            MessageRole::System => system,
            MessageRole::User => user,
            MessageRole::Assistant => assistant,
        };
        text.push_str(open);
        text.push_str(&message.content);
        text.push_str(end);
    }
    text.push_str(user);
    text.push_str(prompt);
    text.push_str(end);
    text.push_str(assistant);
    text
}

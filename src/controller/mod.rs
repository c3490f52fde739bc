//! Model lifecycle controller
//!
//! Owns the model catalog (bundled plus user-imported), the active inference
//! session and the visible conversation. A single task owns the controller
//! through `&mut self`, so catalog, selection and conversation have exactly
//! one writer. Every failure is reported to the shared `ErrorManager` and
//! also returned to the caller.

mod generation;
mod storage;
#[cfg(test)]
pub(crate) mod testing;

pub use generation::{EventOutcome, GenerationHandle};
pub use storage::ModelStorage;

use std::collections::VecDeque;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::db::{Database, SETTING_MODEL_PARAMETERS, SETTING_SELECTED_MODEL, SETTING_USER_MODEL_RECORDS};
use crate::engine::{InferenceEngine, InferenceSession};
use crate::error::{
    available_memory_mb, available_space_at, AppError, ChatError, ErrorManager, FileSystemError,
    ModelError, SystemError, ValidationError,
};
use crate::models::{
    bundled_configs, Conversation, ModelConfig, ModelOrigin, ModelParameters, StoredModelRecord,
    TemplateType,
};

/// Longest wait for an engine to acknowledge session teardown
pub const TEARDOWN_ACK_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_DISPLAY_NAME_CHARS: usize = 80;
const DEBUG_LOG_CAP: usize = 500;
const GGUF_MAGIC: &[u8; 4] = b"GGUF";
const MIN_MODEL_BYTES: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    Initializing,
    Ready,
    Restarting,
    Error,
    NoModels,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Restarting => "restarting",
            Self::Error => "error",
            Self::NoModels => "no_models",
        }
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model file handed over by the user for import
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRequest {
    /// Temporary or user-chosen location of the file
    pub source: PathBuf,
    pub original_filename: String,
    pub display_name: Option<String>,
    pub template_type: TemplateType,
    pub system_prompt: Option<String>,
}

impl ImportRequest {
    /// Request for `path`, keeping its filename
    pub fn from_path(path: &Path, template_type: TemplateType) -> Self {
        let original_filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            source: path.to_path_buf(),
            original_filename,
            display_name: None,
            template_type,
            system_prompt: None,
        }
    }
}

/// A failed operation that `Retry` can run again as it was
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOp {
    Import(ImportRequest),
    Delete(String),
    Generate(String),
}

struct ActiveGeneration {
    id: u64,
    prompt: String,
    cancel: CancellationToken,
}

pub struct ModelController {
    engine: Arc<dyn InferenceEngine>,
    errors: Arc<ErrorManager>,
    db: Database,
    storage: ModelStorage,
    bundle_dir: Option<PathBuf>,
    teardown_delay: Duration,
    max_import_bytes: u64,
    bundled: Vec<ModelConfig>,

    state: ControllerState,
    catalog: Vec<ModelConfig>,
    /// Selected model; kept while in the error state so it can be retried
    active: Option<ModelConfig>,
    session: Option<Arc<dyn InferenceSession>>,
    parameters: ModelParameters,
    conversation: Conversation,
    generation: Option<ActiveGeneration>,
    last_generation_id: u64,
    /// Last retryable failure and the error it raised
    retry: Option<(PendingOp, AppError)>,
    debug_log: VecDeque<String>,
}

impl ModelController {
    pub fn new(
        config: &AppConfig,
        db: Database,
        engine: Arc<dyn InferenceEngine>,
        errors: Arc<ErrorManager>,
    ) -> Self {
        Self {
            engine,
            errors,
            db,
            storage: ModelStorage::new(config.models_dir(), config.temp_dir()),
            bundle_dir: config.bundle_dir.clone(),
            teardown_delay: config.teardown_delay,
            max_import_bytes: config.max_import_bytes,
            bundled: bundled_configs(),
            state: ControllerState::Uninitialized,
            catalog: Vec::new(),
            active: None,
            session: None,
            parameters: ModelParameters::default(),
            conversation: Conversation::new(),
            generation: None,
            last_generation_id: 0,
            retry: None,
            debug_log: VecDeque::new(),
        }
    }

    /// Replace the shipped catalog
    pub fn with_bundled(mut self, bundled: Vec<ModelConfig>) -> Self {
        self.bundled = bundled
            .into_iter()
            .filter(|c| matches!(c.origin, ModelOrigin::Bundled))
            .collect();
        self
    }

    // ==================== ACCESSORS ====================

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn catalog(&self) -> &[ModelConfig] {
        &self.catalog
    }

    pub fn find(&self, filename: &str) -> Option<&ModelConfig> {
        self.catalog.iter().find(|c| c.filename == filename)
    }

    pub fn first_bundled(&self) -> Option<&ModelConfig> {
        self.catalog.iter().find(|c| c.is_bundled())
    }

    pub fn active(&self) -> Option<&ModelConfig> {
        self.active.as_ref()
    }

    /// True when `config` is selected and its session is live
    pub fn is_active(&self, config: &ModelConfig) -> bool {
        self.state == ControllerState::Ready
            && self.session.is_some()
            && self.active.as_ref().is_some_and(|a| a.id == config.id)
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn parameters(&self) -> ModelParameters {
        self.parameters
    }

    pub fn debug_log(&self) -> &VecDeque<String> {
        &self.debug_log
    }

    pub fn errors(&self) -> &Arc<ErrorManager> {
        &self.errors
    }

    pub fn storage(&self) -> &ModelStorage {
        &self.storage
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    // ==================== LIFECYCLE ====================

    /// Build the catalog, reconcile stored records and load the selected model
    pub async fn initialize(&mut self) -> Result<(), AppError> {
        self.ensure_idle()?;
        self.set_state(ControllerState::Initializing);

        self.stop_generation().await;
        self.teardown().await;
        self.conversation.clear();
        self.parameters = self.load_parameters();

        let user = self.reconcile_records();
        self.catalog = self.bundled.clone();
        self.catalog.extend(user);

        self.active = self.startup_model();
        match self.active.clone() {
            Some(config) => self.load(config).await,
            None => {
                warn!("no models available");
                self.set_state(ControllerState::NoModels);
                Ok(())
            }
        }
    }

    /// Make `target` the active model. Stops any generation first.
    pub async fn switch_model(&mut self, target: &ModelConfig) -> Result<(), AppError> {
        let Some(target) = self.catalog.iter().find(|c| c.id == target.id).cloned() else {
            return Err(self.report(ModelError::FileNotFound {
                filename: target.filename.clone(),
            }));
        };

        if self.is_active(&target) {
            debug!(model = %target.filename, "already active");
            return Ok(());
        }
        self.ensure_idle()?;

        info!(from = ?self.active.as_ref().map(|a| &a.filename), to = %target.filename, "switching model");
        self.set_state(ControllerState::Restarting);
        self.stop_generation().await;
        self.conversation.clear();
        self.persist_selection(Some(&target.filename));
        self.teardown().await;
        self.load(target).await
    }

    /// Reload the selected model with a fresh session
    pub async fn restart(&mut self) -> Result<(), AppError> {
        self.ensure_idle()?;
        let Some(config) = self.active.clone() else {
            return self.initialize().await;
        };

        info!(model = %config.filename, "restarting model");
        self.set_state(ControllerState::Restarting);
        self.stop_generation().await;
        self.conversation.clear();
        self.teardown().await;
        self.load(config).await
    }

    /// Copy a model file into private storage, record it and switch to it
    pub async fn import_model(&mut self, request: ImportRequest) -> Result<ModelConfig, AppError> {
        self.retry = None;
        self.ensure_idle()?;
        let size = match self.validate_import(&request) {
            Ok(size) => size,
            Err(e) => return Err(self.report_retryable(PendingOp::Import(request), e)),
        };

        let filename = request.original_filename.trim().to_string();
        if let Err(e) = self.storage.store(&request.source, &filename) {
            return Err(self.report_retryable(PendingOp::Import(request), e));
        }

        let display_name = request
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .unwrap_or_else(|| {
                Path::new(&filename)
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| filename.clone())
            });

        let record = StoredModelRecord {
            filename: filename.clone(),
            display_name,
            template_type: request.template_type,
            system_prompt: request.system_prompt.filter(|p| !p.trim().is_empty()),
        };
        let config = ModelConfig::from_record(&record, self.storage.models_dir());
        self.upsert_record(record);

        match self.catalog.iter_mut().find(|c| c.id == config.id) {
            Some(existing) => *existing = config.clone(),
            None => self.catalog.push(config.clone()),
        }
        info!(model = %filename, bytes = size, "model imported");
        self.note(format!("imported {} ({} bytes)", filename, size));

        let replaces_active = self.active.as_ref().is_some_and(|a| a.id == config.id);
        if replaces_active {
            // Same file, new contents: the live session must be rebuilt
            self.active = Some(config.clone());
            self.restart().await?;
        } else {
            self.switch_model(&config).await?;
        }
        Ok(config)
    }

    /// Remove a user model. Falls back to the first bundled model when it
    /// was active, or to the no-models state when there is none.
    pub async fn delete_model(&mut self, filename: &str) -> Result<(), AppError> {
        self.retry = None;
        let Some(config) = self.find(filename).cloned() else {
            return Err(self.report(ValidationError::InvalidFormat {
                field: "filename".to_string(),
                expected: "the filename of an imported model".to_string(),
            }));
        };
        if config.is_bundled() {
            return Err(self.report(ValidationError::ProtectedModel {
                name: config.display_name,
            }));
        }
        self.ensure_idle()?;

        let was_active = self.active.as_ref().is_some_and(|a| a.id == config.id);
        if was_active {
            self.stop_generation().await;
            self.conversation.clear();
            self.teardown().await;
        }

        if let Err(e) = self.storage.remove(&config.filename) {
            let error = self.report_retryable(PendingOp::Delete(config.filename.clone()), e);
            if was_active {
                if let Err(reload) = self.load(config).await {
                    warn!("reload after failed delete: {}", reload);
                }
            }
            return Err(error);
        }

        self.remove_record(&config.filename);
        self.catalog.retain(|c| c.id != config.id);
        info!(model = %config.filename, "model deleted");
        self.note(format!("deleted {}", config.filename));

        if was_active {
            match self.first_bundled().cloned() {
                Some(fallback) => {
                    self.persist_selection(Some(&fallback.filename));
                    if let Err(e) = self.load(fallback).await {
                        warn!("fallback load failed: {}", e);
                    }
                }
                None => {
                    self.active = None;
                    self.persist_selection(None);
                    self.set_state(ControllerState::NoModels);
                }
            }
        }
        Ok(())
    }

    /// Tear everything down and return to the bundled catalog
    pub async fn emergency_reset(&mut self) -> Result<(), AppError> {
        if self.state == ControllerState::Initializing {
            return Err(self.report(ValidationError::OperationInProgress {
                operation: ControllerState::Initializing.as_str().to_string(),
            }));
        }
        warn!("emergency reset");
        self.set_state(ControllerState::Restarting);

        self.stop_generation().await;
        self.teardown().await;
        self.conversation.clear();
        self.debug_log.clear();
        self.parameters = ModelParameters::default();
        if let Err(e) = self.db.save_model_parameters(&self.parameters) {
            warn!("could not reset parameters: {}", e);
            self.report(SystemError::DataCorruption {
                what: SETTING_MODEL_PARAMETERS.to_string(),
            });
        }

        let user: Vec<String> = self
            .catalog
            .iter()
            .filter(|c| !c.is_bundled())
            .map(|c| c.filename.clone())
            .collect();
        for filename in &user {
            if let Err(e) = self.storage.remove(filename) {
                self.report(e);
            }
        }
        // Catch stray files from interrupted imports too
        if let Err(e) = self.storage.remove_all() {
            self.report(e);
        }
        if let Err(e) = self.storage.clear_temp() {
            self.report(e);
        }
        if let Err(e) = self.db.clear_user_model_records() {
            warn!("could not clear model records: {}", e);
            self.report(SystemError::DataCorruption {
                what: SETTING_USER_MODEL_RECORDS.to_string(),
            });
        }

        self.catalog = self.bundled.clone();
        self.active = self.catalog.first().cloned();
        info!(removed = user.len(), "reset to bundled models");

        match self.active.clone() {
            Some(config) => {
                self.persist_selection(Some(&config.filename));
                self.load(config).await
            }
            None => {
                self.persist_selection(None);
                self.set_state(ControllerState::NoModels);
                Ok(())
            }
        }
    }

    // ==================== PARAMETERS ====================

    /// Validate and store new parameters. They reach the session only
    /// through `apply_parameters`.
    pub fn set_parameters(&mut self, params: ModelParameters) -> Result<(), AppError> {
        params.validate().map_err(|e| self.report(e))?;
        self.parameters = params;
        if let Err(e) = self.db.save_model_parameters(&params) {
            warn!("could not save parameters: {}", e);
            self.report(SystemError::DataCorruption {
                what: SETTING_MODEL_PARAMETERS.to_string(),
            });
        }
        Ok(())
    }

    pub fn apply_parameters(&mut self) -> Result<(), AppError> {
        let Some(session) = self.session.clone() else {
            return Err(self.report(ChatError::ModelNotReady));
        };
        session.apply_parameters(&self.parameters).map_err(|e| {
            self.report(ChatError::ParametersUpdateFailed {
                reason: e.to_string(),
            })
        })?;
        self.note(format!("parameters applied: {:?}", self.parameters));
        Ok(())
    }

    // ==================== HOUSEKEEPING ====================

    /// Clear the visible conversation, stopping any generation first
    pub async fn clear_conversation(&mut self) {
        self.stop_generation().await;
        self.conversation.clear();
    }

    pub fn clear_temp_files(&mut self) -> Result<usize, AppError> {
        self.storage.clear_temp().map_err(|e| self.report(e))
    }

    pub fn clear_debug_log(&mut self) {
        self.debug_log.clear();
        self.debug_log.shrink_to_fit();
    }

    // ==================== INTERNALS ====================

    pub(crate) fn report(&self, error: impl Into<AppError>) -> AppError {
        let error = error.into();
        self.errors.handle(error.clone());
        error
    }

    /// Report `error` and keep `op` so that a retry can run it again
    pub(crate) fn report_retryable(&mut self, op: PendingOp, error: impl Into<AppError>) -> AppError {
        let error = self.report(error);
        self.retry = Some((op, error.clone()));
        error
    }

    /// The operation that raised `failed`, if it can be run again.
    /// Anything else that was kept is dropped.
    pub fn take_retry(&mut self, failed: Option<&AppError>) -> Option<PendingOp> {
        match (self.retry.take(), failed) {
            (Some((op, error)), Some(failed)) if error == *failed => Some(op),
            _ => None,
        }
    }

    fn ensure_idle(&self) -> Result<(), AppError> {
        match self.state {
            ControllerState::Initializing | ControllerState::Restarting => {
                Err(self.report(ValidationError::OperationInProgress {
                    operation: self.state.as_str().to_string(),
                }))
            }
            _ => Ok(()),
        }
    }

    fn set_state(&mut self, state: ControllerState) {
        if self.state != state {
            info!(from = %self.state, to = %state, "controller state");
            self.note(format!("state {} -> {}", self.state, state));
            self.state = state;
        }
    }

    fn note(&mut self, line: String) {
        let stamp = chrono::Utc::now().format("%H:%M:%S%.3f");
        self.debug_log.push_back(format!("{} {}", stamp, line));
        while self.debug_log.len() > DEBUG_LOG_CAP {
            self.debug_log.pop_front();
        }
    }

    async fn load(&mut self, config: ModelConfig) -> Result<(), AppError> {
        self.active = Some(config.clone());

        let path = match self.resolve_path(&config) {
            Ok(path) => path,
            Err(e) => {
                self.set_state(ControllerState::Error);
                return Err(self.report(e));
            }
        };
        if let Err(e) = check_memory(&path) {
            self.set_state(ControllerState::Error);
            return Err(self.report(e));
        }

        info!(model = %config.filename, engine = self.engine.name(), "loading model");
        match self.engine.create_session(&path, &config.template).await {
            Ok(session) => {
                if let Err(e) = session.apply_parameters(&self.parameters) {
                    self.report(ChatError::ParametersUpdateFailed {
                        reason: e.to_string(),
                    });
                }
                self.session = Some(session);
                self.note(format!("loaded {}", config.filename));
                self.set_state(ControllerState::Ready);
                Ok(())
            }
            Err(e) => {
                self.session = None;
                self.set_state(ControllerState::Error);
                Err(self.report(ModelError::InitializationFailed {
                    reason: e.to_string(),
                }))
            }
        }
    }

    fn resolve_path(&self, config: &ModelConfig) -> Result<PathBuf, AppError> {
        match &config.origin {
            ModelOrigin::Bundled => {
                let dir = self.bundle_dir.as_ref().ok_or_else(|| {
                    AppError::from(ModelError::UrlConstructionFailed {
                        name: config.filename.clone(),
                    })
                })?;
                let path = dir.join(&config.filename);
                if !path.is_file() {
                    return Err(ModelError::BundleResourceMissing {
                        resource: config.filename.clone(),
                    }
                    .into());
                }
                Ok(path)
            }
            ModelOrigin::Imported { path } => {
                if !path.is_file() {
                    return Err(FileSystemError::PathDoesNotExist {
                        path: path.display().to_string(),
                    }
                    .into());
                }
                Ok(path.clone())
            }
        }
    }

    /// Wait for the session to release its resources, then the grace delay
    async fn teardown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let ack = session.shutdown();
        drop(session);

        if !ack.wait(TEARDOWN_ACK_TIMEOUT).await {
            warn!(
                "session teardown not acknowledged within {:?}",
                TEARDOWN_ACK_TIMEOUT
            );
        }
        if !self.teardown_delay.is_zero() {
            tokio::time::sleep(self.teardown_delay).await;
        }
        self.note("session torn down".to_string());
    }

    /// Stored records whose files still exist; rewrites the store if any were dropped
    fn reconcile_records(&mut self) -> Vec<ModelConfig> {
        let records = match self.db.user_model_records() {
            Ok(records) => records,
            Err(e) => {
                warn!("treating stored model records as empty: {:#}", e);
                self.report(SystemError::DataCorruption {
                    what: SETTING_USER_MODEL_RECORDS.to_string(),
                });
                return Vec::new();
            }
        };

        let total = records.len();
        let mut kept: Vec<StoredModelRecord> = Vec::with_capacity(total);
        for record in records {
            if !self.storage.contains(&record.filename) {
                info!(model = %record.filename, "dropping record without a file");
                continue;
            }
            match kept.iter_mut().find(|r| r.filename == record.filename) {
                Some(existing) => *existing = record,
                None => kept.push(record),
            }
        }

        if kept.len() != total {
            info!(kept = kept.len(), dropped = total - kept.len(), "reconciled model records");
            if let Err(e) = self.db.save_user_model_records(&kept) {
                warn!("could not rewrite model records: {}", e);
                self.report(SystemError::DataCorruption {
                    what: SETTING_USER_MODEL_RECORDS.to_string(),
                });
            }
        }

        kept.iter()
            .map(|r| ModelConfig::from_record(r, self.storage.models_dir()))
            .collect()
    }

    fn startup_model(&self) -> Option<ModelConfig> {
        let selected = match self.db.selected_model() {
            Ok(selected) => selected,
            Err(e) => {
                warn!("could not read selected model: {}", e);
                None
            }
        };
        let preferred = selected.and_then(|filename| self.find(&filename).cloned());
        if let Some(config) = &preferred {
            if self.resolve_path(config).is_ok() {
                return preferred;
            }
        }

        // The stored selection stays as it is, so it wins again once its file is back
        match self.catalog.iter().find(|c| self.resolve_path(c).is_ok()) {
            Some(fallback) => {
                if let Some(config) = &preferred {
                    warn!(selected = %config.filename, fallback = %fallback.filename, "selected model unavailable");
                }
                Some(fallback.clone())
            }
            // Nothing loads; keep the choice so its error is the one reported
            None => preferred.or_else(|| self.catalog.first().cloned()),
        }
    }

    fn load_parameters(&self) -> ModelParameters {
        match self.db.model_parameters() {
            Ok(Some(params)) => match params.validate() {
                Ok(()) => params,
                Err(e) => {
                    self.report(e);
                    ModelParameters::default()
                }
            },
            Ok(None) => ModelParameters::default(),
            Err(e) => {
                warn!("stored parameters unreadable: {:#}", e);
                self.report(SystemError::DataCorruption {
                    what: SETTING_MODEL_PARAMETERS.to_string(),
                });
                ModelParameters::default()
            }
        }
    }

    fn persist_selection(&self, filename: Option<&str>) {
        let result = match filename {
            Some(filename) => self.db.set_selected_model(filename),
            None => self.db.delete_setting(SETTING_SELECTED_MODEL).map(|_| ()),
        };
        if let Err(e) = result {
            warn!("could not save selected model: {}", e);
            self.report(SystemError::DataCorruption {
                what: SETTING_SELECTED_MODEL.to_string(),
            });
        }
    }

    fn stored_records(&self) -> Vec<StoredModelRecord> {
        match self.db.user_model_records() {
            Ok(records) => records,
            Err(e) => {
                warn!("rebuilding model records from catalog: {:#}", e);
                self.catalog.iter().filter_map(ModelConfig::to_record).collect()
            }
        }
    }

    fn upsert_record(&mut self, record: StoredModelRecord) {
        let mut records = self.stored_records();
        match records.iter_mut().find(|r| r.filename == record.filename) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.save_records(&records);
    }

    fn remove_record(&mut self, filename: &str) {
        let mut records = self.stored_records();
        records.retain(|r| r.filename != filename);
        self.save_records(&records);
    }

    fn save_records(&self, records: &[StoredModelRecord]) {
        if let Err(e) = self.db.save_user_model_records(records) {
            warn!("could not save model records: {}", e);
            self.report(SystemError::DataCorruption {
                what: SETTING_USER_MODEL_RECORDS.to_string(),
            });
        }
    }

    fn validate_import(&self, request: &ImportRequest) -> Result<u64, AppError> {
        let filename = request.original_filename.trim();
        if filename.is_empty() {
            return Err(ValidationError::EmptyField {
                field: "filename".to_string(),
            }
            .into());
        }
        if !filename.to_lowercase().ends_with(".gguf") {
            return Err(ValidationError::InvalidFormat {
                field: "filename".to_string(),
                expected: "a .gguf file".to_string(),
            }
            .into());
        }
        if self.bundled.iter().any(|b| b.filename == filename) {
            return Err(ValidationError::ProtectedModel {
                name: filename.to_string(),
            }
            .into());
        }
        if let Some(name) = &request.display_name {
            if name.chars().count() > MAX_DISPLAY_NAME_CHARS {
                return Err(ValidationError::TooLong {
                    field: "display_name".to_string(),
                    max_length: MAX_DISPLAY_NAME_CHARS,
                }
                .into());
            }
        }

        let source = &request.source;
        let metadata = std::fs::metadata(source).map_err(|e| match e.kind() {
            ErrorKind::NotFound => AppError::from(FileSystemError::PathDoesNotExist {
                path: source.display().to_string(),
            }),
            ErrorKind::PermissionDenied => FileSystemError::AccessDenied {
                path: source.display().to_string(),
            }
            .into(),
            _ => FileSystemError::InvalidPath {
                path: source.display().to_string(),
            }
            .into(),
        })?;
        if !metadata.is_file() {
            return Err(FileSystemError::InvalidPath {
                path: source.display().to_string(),
            }
            .into());
        }

        let size = metadata.len();
        if size < MIN_MODEL_BYTES {
            return Err(ValidationError::FileTooSmall { size_bytes: size }.into());
        }
        if size > self.max_import_bytes {
            return Err(ValidationError::FileTooLarge {
                size_bytes: size,
                max_bytes: self.max_import_bytes,
            }
            .into());
        }

        check_header(source, filename)?;

        let available = available_space_at(self.storage.models_dir());
        if available > 0 && available < size {
            return Err(FileSystemError::InsufficientSpace {
                required_bytes: size,
                available_bytes: available,
            }
            .into());
        }

        Ok(size)
    }
}

fn check_header(source: &Path, filename: &str) -> Result<(), AppError> {
    let mut magic = [0u8; 4];
    File::open(source)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map_err(|_| ModelError::CorruptedFile {
            filename: filename.to_string(),
        })?;
    if &magic != GGUF_MAGIC {
        return Err(ModelError::InvalidFile {
            filename: filename.to_string(),
            reason: "missing GGUF header".to_string(),
        }
        .into());
    }
    Ok(())
}

fn check_memory(path: &Path) -> Result<(), AppError> {
    let size_mb = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0) / (1024 * 1024);
    let available_mb = available_memory_mb();
    // Some sandboxes report no memory figures at all
    if available_mb > 0 && size_mb > available_mb {
        return Err(ModelError::InsufficientMemory {
            required_mb: size_mb,
            available_mb,
        }
        .into());
    }
    Ok(())
}

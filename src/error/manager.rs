//! Central error manager.
//!
//! One instance is constructed at startup and shared as `Arc<ErrorManager>`
//! with everything that reports errors; it lives for the whole process.
//! The history is the only structure written from concurrent call sites and
//! every append goes through its mutex.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{AppError, ContextSource, ErrorContext, RecoveryAction, Severity};

pub const DEFAULT_HISTORY_CAP: usize = 100;

/// Immutable record of one handled error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub id: Uuid,
    pub error: AppError,
    pub timestamp: DateTime<Utc>,
    pub context: ErrorContext,
}

/// What the presentation layer should currently show
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorPresentation {
    pub current: Option<AppError>,
    /// A blocking alert is required (severity high or critical)
    pub show_alert: bool,
}

/// Title and body for an alert or banner
#[derive(Debug, Clone, PartialEq)]
pub struct UserMessage {
    pub title: String,
    pub message: String,
    pub action: RecoveryAction,
    pub blocking: bool,
}

pub struct ErrorManager {
    history: Mutex<VecDeque<ErrorLogEntry>>,
    cap: usize,
    presentation: watch::Sender<ErrorPresentation>,
    source: Box<dyn ContextSource>,
}

impl ErrorManager {
    pub fn new(source: Box<dyn ContextSource>) -> Self {
        Self::with_capacity(source, DEFAULT_HISTORY_CAP)
    }

    pub fn with_capacity(source: Box<dyn ContextSource>, cap: usize) -> Self {
        let (presentation, _) = watch::channel(ErrorPresentation::default());
        Self {
            history: Mutex::new(VecDeque::with_capacity(cap.min(1024))),
            cap: cap.max(1),
            presentation,
            source,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    fn lock_history(&self) -> MutexGuard<'_, VecDeque<ErrorLogEntry>> {
        // A panic while holding the lock cannot leave a half-written entry
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Log the error and make it the current one
    pub fn handle(&self, error: AppError) {
        self.log_error(&error);
        let show_alert = error.severity().is_blocking();
        self.presentation.send_replace(ErrorPresentation {
            current: Some(error),
            show_alert,
        });
    }

    /// Handle the error and build the message shown to the user
    pub fn handle_with_alert(&self, error: AppError) -> UserMessage {
        let message = Self::user_message(&error);
        self.handle(error);
        message
    }

    /// Compose title and body: description, suggestion, then the call to action
    pub fn user_message(error: &AppError) -> UserMessage {
        let action = error.recovery_action();
        let mut message = error.description();

        if let Some(suggestion) = error.recovery_suggestion() {
            message.push_str("\n\n");
            message.push_str(&suggestion);
        }

        if action.is_actionable() {
            message.push_str(&format!("\n\nChoose \"{}\" to recover.", action.title()));
        }

        UserMessage {
            title: error.title().to_string(),
            message,
            action,
            blocking: error.severity().is_blocking(),
        }
    }

    /// Append to the bounded history, evicting the oldest entries
    pub fn log_error(&self, error: &AppError) {
        let entry = ErrorLogEntry {
            id: Uuid::new_v4(),
            error: error.clone(),
            timestamp: Utc::now(),
            context: self.source.snapshot(),
        };

        match error.severity() {
            Severity::Low => debug!(id = %error.identifier(), "{}", error),
            Severity::Medium => info!(id = %error.identifier(), "{}", error),
            Severity::High => warn!(id = %error.identifier(), "{}", error),
            Severity::Critical => error!(id = %error.identifier(), "{}", error),
        }

        let mut history = self.lock_history();
        history.push_back(entry);
        while history.len() > self.cap {
            history.pop_front();
        }
    }

    pub fn can_recover(&self, error: &AppError) -> bool {
        match error.severity() {
            Severity::Low | Severity::Medium => true,
            Severity::High => error.recovery_action().is_actionable(),
            Severity::Critical => false,
        }
    }

    pub fn suggest_recovery_action(&self, error: &AppError) -> RecoveryAction {
        error.recovery_action()
    }

    pub fn current(&self) -> Option<AppError> {
        self.presentation.borrow().current.clone()
    }

    pub fn presentation(&self) -> ErrorPresentation {
        self.presentation.borrow().clone()
    }

    /// Observe changes to the current error
    pub fn subscribe(&self) -> watch::Receiver<ErrorPresentation> {
        self.presentation.subscribe()
    }

    pub fn clear_current(&self) {
        self.presentation.send_replace(ErrorPresentation::default());
    }

    /// History snapshot, oldest first
    pub fn history(&self) -> Vec<ErrorLogEntry> {
        self.lock_history().iter().cloned().collect()
    }

    pub fn recent(&self, count: usize) -> Vec<ErrorLogEntry> {
        let history = self.lock_history();
        let skip = history.len().saturating_sub(count);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn clear_history(&self) {
        self.lock_history().clear();
    }

    pub fn counts_by_severity(&self) -> HashMap<Severity, usize> {
        let mut counts = HashMap::new();
        for entry in self.lock_history().iter() {
            *counts.entry(entry.error.severity()).or_insert(0) += 1;
        }
        counts
    }

    /// Serialize the history as JSON. Failures come back as plain text so
    /// that exporting never produces another `AppError`.
    pub fn export_history(&self) -> Result<String, String> {
        let history = self.history();
        serde_json::to_string_pretty(&history).map_err(|e| format!("export failed: {}", e))
    }

    /// Replace the history with a previously exported one
    pub fn restore_history(&self, json: &str) -> Result<usize, String> {
        let entries: Vec<ErrorLogEntry> =
            serde_json::from_str(json).map_err(|e| format!("import failed: {}", e))?;

        let mut history = self.lock_history();
        history.clear();
        let skip = entries.len().saturating_sub(self.cap);
        history.extend(entries.into_iter().skip(skip));
        Ok(history.len())
    }
}

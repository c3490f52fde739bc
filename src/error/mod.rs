//! Error taxonomy and the process-wide error manager.
//!
//! Every failure in the application is classified into one of seven domains
//! (model loading, file system, chat, interface, system, validation, network).
//! `AppError` wraps the domain enums so that every consumer has to match the
//! full set of kinds.

mod action;
mod context;
mod manager;
mod taxonomy;

pub use action::RecoveryAction;
pub use context::{available_memory_mb, available_space_at, ContextSource, ErrorContext, SystemContext};
#[cfg(test)]
pub(crate) use context::FixedContext;
pub use manager::{ErrorLogEntry, ErrorManager, ErrorPresentation, UserMessage, DEFAULT_HISTORY_CAP};
pub use taxonomy::{
    ChatError, FileSystemError, InterfaceError, ModelError, NetworkError, SystemError,
    ValidationError,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ordered severity scale. High and Critical block the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Whether errors of this severity require a blocking alert
    pub fn is_blocking(&self) -> bool {
        *self >= Severity::High
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any failure the application can report.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "domain", content = "error", rename_all = "snake_case")]
pub enum AppError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Interface(#[from] InterfaceError),

    #[error(transparent)]
    System(#[from] SystemError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl AppError {
    pub fn domain(&self) -> &'static str {
        match self {
            Self::Model(_) => "model",
            Self::FileSystem(_) => "file_system",
            Self::Chat(_) => "chat",
            Self::Interface(_) => "interface",
            Self::System(_) => "system",
            Self::Validation(_) => "validation",
            Self::Network(_) => "network",
        }
    }

    /// Kind code within the domain, e.g. `file_not_found`
    pub fn code(&self) -> &'static str {
        match self {
            Self::Model(e) => e.code(),
            Self::FileSystem(e) => e.code(),
            Self::Chat(e) => e.code(),
            Self::Interface(e) => e.code(),
            Self::System(e) => e.code(),
            Self::Validation(e) => e.code(),
            Self::Network(e) => e.code(),
        }
    }

    fn subject(&self) -> Option<&str> {
        match self {
            Self::Model(e) => e.subject(),
            Self::FileSystem(e) => e.subject(),
            Self::Chat(e) => e.subject(),
            Self::Interface(e) => e.subject(),
            Self::System(e) => e.subject(),
            Self::Validation(e) => e.subject(),
            Self::Network(e) => e.subject(),
        }
    }

    /// Stable identifier used to deduplicate and group errors.
    ///
    /// Format: `domain.code` or `domain.code:subject` when the kind names a
    /// file, path, field or similar subject.
    pub fn identifier(&self) -> String {
        match self.subject() {
            Some(subject) if !subject.is_empty() => {
                format!("{}.{}:{}", self.domain(), self.code(), subject)
            }
            _ => format!("{}.{}", self.domain(), self.code()),
        }
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        self.to_string()
    }

    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Model(e) => e.recovery_suggestion(),
            Self::FileSystem(e) => e.recovery_suggestion(),
            Self::Chat(e) => e.recovery_suggestion(),
            Self::Interface(e) => e.recovery_suggestion(),
            Self::System(e) => e.recovery_suggestion(),
            Self::Validation(e) => e.recovery_suggestion(),
            Self::Network(e) => e.recovery_suggestion(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Model(e) => e.severity(),
            Self::FileSystem(e) => e.severity(),
            Self::Chat(e) => e.severity(),
            Self::Interface(e) => e.severity(),
            Self::System(e) => e.severity(),
            Self::Validation(e) => e.severity(),
            Self::Network(e) => e.severity(),
        }
    }

    /// The single remedy suggested for this error
    pub fn recovery_action(&self) -> RecoveryAction {
        action::suggested_action(self)
    }

    /// Short heading for alerts and banners
    pub fn title(&self) -> &'static str {
        match self {
            Self::Model(_) => "Model Error",
            Self::FileSystem(_) => "File Error",
            Self::Chat(_) => "Chat Error",
            Self::Interface(_) => "Interface Error",
            Self::System(_) => "System Error",
            Self::Validation(_) => "Invalid Input",
            Self::Network(_) => "Network Error",
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// One instance of every leaf kind, with the given string in every text field.
    pub(crate) fn all_kinds(text: &str) -> Vec<AppError> {
        let s = || text.to_string();
        vec![
            ModelError::FileNotFound { filename: s() }.into(),
            ModelError::InvalidFile { filename: s(), reason: s() }.into(),
            ModelError::CorruptedFile { filename: s() }.into(),
            ModelError::InsufficientMemory { required_mb: 4096, available_mb: 512 }.into(),
            ModelError::InitializationFailed { reason: s() }.into(),
            ModelError::UnsupportedModelType { model_type: s() }.into(),
            ModelError::BundleResourceMissing { resource: s() }.into(),
            ModelError::UrlConstructionFailed { name: s() }.into(),
            FileSystemError::CopyFailed { source_path: s(), destination: s(), reason: s() }.into(),
            FileSystemError::DeleteFailed { path: s(), reason: s() }.into(),
            FileSystemError::AccessDenied { path: s() }.into(),
            FileSystemError::InsufficientSpace { required_bytes: 1 << 30, available_bytes: 0 }.into(),
            FileSystemError::InvalidPath { path: s() }.into(),
            FileSystemError::PathDoesNotExist { path: s() }.into(),
            FileSystemError::TempFileCreationFailed { reason: s() }.into(),
            FileSystemError::PickerFailed { reason: s() }.into(),
            ChatError::GenerationFailed { reason: s() }.into(),
            ChatError::StopFailed { reason: s() }.into(),
            ChatError::ContextOverflow { tokens: 5000, limit: 4096 }.into(),
            ChatError::InvalidInput { reason: s() }.into(),
            ChatError::ModelNotReady.into(),
            ChatError::UnexpectedResponse { detail: s() }.into(),
            ChatError::ParametersUpdateFailed { reason: s() }.into(),
            ChatError::HistoryCorrupted.into(),
            InterfaceError::InvalidState { state: s() }.into(),
            InterfaceError::NavigationFailed { destination: s() }.into(),
            InterfaceError::AlertPresentationFailed.into(),
            InterfaceError::SheetPresentationFailed { sheet: s() }.into(),
            InterfaceError::ClipboardFailed { reason: s() }.into(),
            InterfaceError::FocusFailed.into(),
            InterfaceError::AnimationFailed { name: s() }.into(),
            SystemError::OsIncompatible { required: s(), current: s() }.into(),
            SystemError::DeviceUnsupported { device: s() }.into(),
            SystemError::MemoryPressure { available_mb: 100 }.into(),
            SystemError::StorageLow { available_bytes: 1024 }.into(),
            SystemError::PermissionDenied { permission: s() }.into(),
            SystemError::BackgroundTaskFailed { task: s() }.into(),
            SystemError::DataCorruption { what: s() }.into(),
            ValidationError::EmptyField { field: s() }.into(),
            ValidationError::InvalidFormat { field: s(), expected: s() }.into(),
            ValidationError::OutOfRange { field: s(), value: s(), min: s(), max: s() }.into(),
            ValidationError::TooLong { field: s(), max_length: 10 }.into(),
            ValidationError::FileTooLarge { size_bytes: 1 << 40, max_bytes: 1 << 34 }.into(),
            ValidationError::FileTooSmall { size_bytes: 3 }.into(),
            ValidationError::ProtectedModel { name: s() }.into(),
            ValidationError::OperationInProgress { operation: s() }.into(),
            NetworkError::NoConnection.into(),
            NetworkError::Timeout.into(),
            NetworkError::InvalidResponse { status: 502 }.into(),
            NetworkError::CorruptedData.into(),
            NetworkError::InvalidUrl { url: s() }.into(),
            NetworkError::DownloadFailed { url: s(), reason: s() }.into(),
            NetworkError::UploadFailed { reason: s() }.into(),
        ]
    }

    #[test]
    fn test_every_kind_is_total_for_odd_strings() {
        for text in ["", "model.gguf", "line\nbreak\t\u{0}\u{7}", "ünïcødé 模型"] {
            for error in all_kinds(text) {
                let description = error.description();
                assert!(!description.is_empty(), "{:?}", error);
                let identifier = error.identifier();
                assert!(identifier.starts_with(error.domain()));
                let _ = error.recovery_suggestion();
                let _ = error.severity();
            }
        }
    }

    #[test]
    fn test_outputs_are_deterministic() {
        let first = all_kinds("same");
        let second = all_kinds("same");
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.identifier(), b.identifier());
            assert_eq!(a.description(), b.description());
            assert_eq!(a.severity(), b.severity());
            assert_eq!(a.recovery_suggestion(), b.recovery_suggestion());
        }
    }

    #[test]
    fn test_codes_are_unique() {
        let errors = all_kinds("x");
        let mut ids: Vec<String> = errors
            .iter()
            .map(|e| format!("{}.{}", e.domain(), e.code()))
            .collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert_eq!(total, 53);
    }

    #[test]
    fn test_identifier_includes_subject() {
        let error: AppError = ModelError::FileNotFound { filename: "a.gguf".into() }.into();
        assert_eq!(error.identifier(), "model.file_not_found:a.gguf");

        let empty: AppError = ModelError::FileNotFound { filename: String::new() }.into();
        assert_eq!(empty.identifier(), "model.file_not_found");

        let unit: AppError = ChatError::ModelNotReady.into();
        assert_eq!(unit.identifier(), "chat.model_not_ready");

        // Free-form reasons never become part of the identifier
        let first: AppError = ChatError::GenerationFailed { reason: "decode error at 17".into() }.into();
        let second: AppError = ChatError::GenerationFailed { reason: "decode error at 42".into() }.into();
        assert_eq!(first.identifier(), "chat.generation_failed");
        assert_eq!(first.identifier(), second.identifier());
        let detail: AppError = ChatError::UnexpectedResponse { detail: "tokenizer: bad utf-8".into() }.into();
        assert_eq!(detail.identifier(), "chat.unexpected_response");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert!(!Severity::Medium.is_blocking());
        assert!(Severity::High.is_blocking());
    }

    fn severity_of(error: impl Into<AppError>) -> Severity {
        error.into().severity()
    }

    #[test]
    fn test_severity_table() {
        let s = String::new;
        assert_eq!(severity_of(ModelError::FileNotFound { filename: s() }), Severity::High);
        assert_eq!(severity_of(ModelError::InvalidFile { filename: s(), reason: s() }), Severity::High);
        assert_eq!(severity_of(ModelError::CorruptedFile { filename: s() }), Severity::High);
        assert_eq!(
            severity_of(ModelError::InsufficientMemory { required_mb: 1, available_mb: 0 }),
            Severity::Critical
        );
        assert_eq!(severity_of(ModelError::InitializationFailed { reason: s() }), Severity::Critical);
        assert_eq!(severity_of(ModelError::UnsupportedModelType { model_type: s() }), Severity::Medium);
        assert_eq!(severity_of(ModelError::BundleResourceMissing { resource: s() }), Severity::Critical);
        assert_eq!(severity_of(ModelError::UrlConstructionFailed { name: s() }), Severity::Critical);

        assert_eq!(
            severity_of(FileSystemError::CopyFailed { source_path: s(), destination: s(), reason: s() }),
            Severity::High
        );
        assert_eq!(severity_of(FileSystemError::DeleteFailed { path: s(), reason: s() }), Severity::High);
        assert_eq!(severity_of(FileSystemError::AccessDenied { path: s() }), Severity::Critical);
        assert_eq!(
            severity_of(FileSystemError::InsufficientSpace { required_bytes: 1, available_bytes: 0 }),
            Severity::Critical
        );
        assert_eq!(severity_of(FileSystemError::InvalidPath { path: s() }), Severity::Medium);
        assert_eq!(severity_of(FileSystemError::PathDoesNotExist { path: s() }), Severity::Medium);
        assert_eq!(severity_of(FileSystemError::TempFileCreationFailed { reason: s() }), Severity::Medium);
        assert_eq!(severity_of(FileSystemError::PickerFailed { reason: s() }), Severity::Medium);

        assert_eq!(severity_of(ChatError::GenerationFailed { reason: s() }), Severity::Medium);
        assert_eq!(severity_of(ChatError::StopFailed { reason: s() }), Severity::Medium);
        assert_eq!(severity_of(ChatError::ContextOverflow { tokens: 2, limit: 1 }), Severity::Low);
        assert_eq!(severity_of(ChatError::InvalidInput { reason: s() }), Severity::Low);
        assert_eq!(severity_of(ChatError::ModelNotReady), Severity::Low);
        assert_eq!(severity_of(ChatError::UnexpectedResponse { detail: s() }), Severity::Low);
        assert_eq!(severity_of(ChatError::ParametersUpdateFailed { reason: s() }), Severity::Medium);
        assert_eq!(severity_of(ChatError::HistoryCorrupted), Severity::High);

        assert_eq!(severity_of(InterfaceError::InvalidState { state: s() }), Severity::High);
        assert_eq!(severity_of(InterfaceError::NavigationFailed { destination: s() }), Severity::Medium);
        assert_eq!(severity_of(InterfaceError::AlertPresentationFailed), Severity::Medium);
        assert_eq!(severity_of(InterfaceError::SheetPresentationFailed { sheet: s() }), Severity::Medium);
        assert_eq!(severity_of(InterfaceError::ClipboardFailed { reason: s() }), Severity::Low);
        assert_eq!(severity_of(InterfaceError::FocusFailed), Severity::Low);
        assert_eq!(severity_of(InterfaceError::AnimationFailed { name: s() }), Severity::Low);

        assert_eq!(
            severity_of(SystemError::OsIncompatible { required: s(), current: s() }),
            Severity::Critical
        );
        assert_eq!(severity_of(SystemError::DeviceUnsupported { device: s() }), Severity::Critical);
        assert_eq!(severity_of(SystemError::MemoryPressure { available_mb: 1 }), Severity::High);
        assert_eq!(severity_of(SystemError::StorageLow { available_bytes: 1 }), Severity::High);
        assert_eq!(severity_of(SystemError::PermissionDenied { permission: s() }), Severity::Medium);
        assert_eq!(severity_of(SystemError::BackgroundTaskFailed { task: s() }), Severity::Medium);
        assert_eq!(severity_of(SystemError::DataCorruption { what: s() }), Severity::Medium);

        assert_eq!(severity_of(ValidationError::EmptyField { field: s() }), Severity::Low);
        assert_eq!(
            severity_of(ValidationError::InvalidFormat { field: s(), expected: s() }),
            Severity::Low
        );
        assert_eq!(
            severity_of(ValidationError::OutOfRange { field: s(), value: s(), min: s(), max: s() }),
            Severity::Low
        );
        assert_eq!(severity_of(ValidationError::TooLong { field: s(), max_length: 1 }), Severity::Low);
        assert_eq!(
            severity_of(ValidationError::FileTooLarge { size_bytes: 2, max_bytes: 1 }),
            Severity::Medium
        );
        assert_eq!(severity_of(ValidationError::FileTooSmall { size_bytes: 0 }), Severity::Medium);
        assert_eq!(severity_of(ValidationError::ProtectedModel { name: s() }), Severity::Low);
        assert_eq!(
            severity_of(ValidationError::OperationInProgress { operation: s() }),
            Severity::Low
        );

        assert_eq!(severity_of(NetworkError::NoConnection), Severity::High);
        assert_eq!(severity_of(NetworkError::Timeout), Severity::Medium);
        assert_eq!(severity_of(NetworkError::InvalidResponse { status: 500 }), Severity::Medium);
        assert_eq!(severity_of(NetworkError::CorruptedData), Severity::Medium);
        assert_eq!(severity_of(NetworkError::InvalidUrl { url: s() }), Severity::Medium);
        assert_eq!(severity_of(NetworkError::DownloadFailed { url: s(), reason: s() }), Severity::Medium);
        assert_eq!(severity_of(NetworkError::UploadFailed { reason: s() }), Severity::Medium);
    }

    #[test]
    fn test_json_roundtrip_keeps_kind() {
        let error: AppError = FileSystemError::CopyFailed {
            source_path: "/tmp/a".into(),
            destination: "/data/a".into(),
            reason: "disk full".into(),
        }
        .into();
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"domain\":\"file_system\""));
        assert!(json.contains("\"kind\":\"copy_failed\""));
        let back: AppError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, error);
    }
}

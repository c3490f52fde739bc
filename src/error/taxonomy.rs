//! Leaf error kinds, one enum per error domain.
//!
//! Every method here is a pure function of the variant and its fields.
//! Parameters are plain strings and integers so that any value, including
//! empty strings, still produces a description, a code and a severity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Severity;

fn mb(bytes: &u64) -> u64 {
    *bytes / (1024 * 1024)
}

// ============================================================================
// Model loading
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelError {
    #[error("Model file '{filename}' could not be found")]
    FileNotFound { filename: String },

    #[error("Model file '{filename}' is not a valid GGUF model: {reason}")]
    InvalidFile { filename: String, reason: String },

    #[error("Model file '{filename}' is corrupted")]
    CorruptedFile { filename: String },

    #[error("Not enough memory to load the model ({required_mb} MB required, {available_mb} MB available)")]
    InsufficientMemory { required_mb: u64, available_mb: u64 },

    #[error("The inference engine failed to initialize: {reason}")]
    InitializationFailed { reason: String },

    #[error("Model type '{model_type}' is not supported")]
    UnsupportedModelType { model_type: String },

    #[error("Bundled model resource '{resource}' is missing from the application package")]
    BundleResourceMissing { resource: String },

    #[error("Could not build a file location for model '{name}'")]
    UrlConstructionFailed { name: String },
}

impl ModelError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::FileNotFound { .. } => "file_not_found",
            Self::InvalidFile { .. } => "invalid_file",
            Self::CorruptedFile { .. } => "corrupted_file",
            Self::InsufficientMemory { .. } => "insufficient_memory",
            Self::InitializationFailed { .. } => "initialization_failed",
            Self::UnsupportedModelType { .. } => "unsupported_model_type",
            Self::BundleResourceMissing { .. } => "bundle_resource_missing",
            Self::UrlConstructionFailed { .. } => "url_construction_failed",
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::FileNotFound { filename }
            | Self::InvalidFile { filename, .. }
            | Self::CorruptedFile { filename } => Some(filename),
            Self::UnsupportedModelType { model_type } => Some(model_type),
            Self::BundleResourceMissing { resource } => Some(resource),
            Self::UrlConstructionFailed { name } => Some(name),
            Self::InsufficientMemory { .. } | Self::InitializationFailed { .. } => None,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::FileNotFound { .. } | Self::InvalidFile { .. } | Self::CorruptedFile { .. } => {
                Severity::High
            }
            Self::InsufficientMemory { .. } | Self::InitializationFailed { .. } => {
                Severity::Critical
            }
            Self::UnsupportedModelType { .. } => Severity::Medium,
            Self::BundleResourceMissing { .. } | Self::UrlConstructionFailed { .. } => {
                Severity::Critical
            }
        }
    }

    pub fn recovery_suggestion(&self) -> Option<String> {
        let text = match self {
            Self::FileNotFound { .. } => "Import the model again or switch to a bundled model.",
            Self::InvalidFile { .. } => "Make sure the file is a GGUF model and import it again.",
            Self::CorruptedFile { .. } => "Delete the model and import a fresh copy.",
            Self::InsufficientMemory { required_mb, .. } => {
                return Some(format!(
                    "Close other applications to free at least {} MB, or choose a smaller model.",
                    required_mb
                ))
            }
            Self::InitializationFailed { .. } => "Restart the application.",
            Self::UnsupportedModelType { .. } => "Choose a model with a supported architecture.",
            Self::BundleResourceMissing { .. } => "Reinstall the application to restore bundled models.",
            Self::UrlConstructionFailed { .. } => "Try loading the model again.",
        };
        Some(text.to_string())
    }
}

// ============================================================================
// File system
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileSystemError {
    #[error("Failed to copy '{source_path}' to '{destination}': {reason}")]
    CopyFailed {
        source_path: String,
        destination: String,
        reason: String,
    },

    #[error("Failed to delete '{path}': {reason}")]
    DeleteFailed { path: String, reason: String },

    #[error("Access to '{path}' was denied")]
    AccessDenied { path: String },

    #[error("Not enough storage space ({} MB required, {} MB available)", mb(.required_bytes), mb(.available_bytes))]
    InsufficientSpace {
        required_bytes: u64,
        available_bytes: u64,
    },

    #[error("'{path}' is not a valid path")]
    InvalidPath { path: String },

    #[error("'{path}' does not exist")]
    PathDoesNotExist { path: String },

    #[error("Could not create a temporary file: {reason}")]
    TempFileCreationFailed { reason: String },

    #[error("The file picker failed: {reason}")]
    PickerFailed { reason: String },
}

impl FileSystemError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CopyFailed { .. } => "copy_failed",
            Self::DeleteFailed { .. } => "delete_failed",
            Self::AccessDenied { .. } => "access_denied",
            Self::InsufficientSpace { .. } => "insufficient_space",
            Self::InvalidPath { .. } => "invalid_path",
            Self::PathDoesNotExist { .. } => "path_does_not_exist",
            Self::TempFileCreationFailed { .. } => "temp_file_creation_failed",
            Self::PickerFailed { .. } => "picker_failed",
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::CopyFailed { destination, .. } => Some(destination),
            Self::DeleteFailed { path, .. }
            | Self::AccessDenied { path }
            | Self::InvalidPath { path }
            | Self::PathDoesNotExist { path } => Some(path),
            Self::InsufficientSpace { .. }
            | Self::TempFileCreationFailed { .. }
            | Self::PickerFailed { .. } => None,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::CopyFailed { .. } | Self::DeleteFailed { .. } => Severity::High,
            Self::AccessDenied { .. } | Self::InsufficientSpace { .. } => Severity::Critical,
            Self::InvalidPath { .. } | Self::PathDoesNotExist { .. } => Severity::Medium,
            Self::TempFileCreationFailed { .. } | Self::PickerFailed { .. } => Severity::Medium,
        }
    }

    pub fn recovery_suggestion(&self) -> Option<String> {
        let text = match self {
            Self::CopyFailed { .. } => "Check that the source file is still available and try again.",
            Self::DeleteFailed { .. } => "Try deleting the file again.",
            Self::AccessDenied { .. } => "Grant the application access to its storage and try again.",
            Self::InsufficientSpace { .. } => "Free up storage space by deleting unused models or files.",
            Self::InvalidPath { .. } | Self::PathDoesNotExist { .. } => {
                "Select the file again and retry."
            }
            Self::TempFileCreationFailed { .. } => "Free up some storage space and try again.",
            Self::PickerFailed { .. } => "Open the file picker again.",
        };
        Some(text.to_string())
    }
}

// ============================================================================
// Chat / inference interaction
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatError {
    #[error("Response generation failed: {reason}")]
    GenerationFailed { reason: String },

    #[error("Failed to stop generation: {reason}")]
    StopFailed { reason: String },

    #[error("The conversation is too long for the context window ({tokens} of {limit} tokens)")]
    ContextOverflow { tokens: usize, limit: usize },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("The model is not ready yet")]
    ModelNotReady,

    #[error("Unexpected response from the model: {detail}")]
    UnexpectedResponse { detail: String },

    #[error("Failed to apply model parameters: {reason}")]
    ParametersUpdateFailed { reason: String },

    #[error("The conversation history is corrupted")]
    HistoryCorrupted,
}

impl ChatError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::GenerationFailed { .. } => "generation_failed",
            Self::StopFailed { .. } => "stop_failed",
            Self::ContextOverflow { .. } => "context_overflow",
            Self::InvalidInput { .. } => "invalid_input",
            Self::ModelNotReady => "model_not_ready",
            Self::UnexpectedResponse { .. } => "unexpected_response",
            Self::ParametersUpdateFailed { .. } => "parameters_update_failed",
            Self::HistoryCorrupted => "history_corrupted",
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match self {
            // Reasons are free text, not subjects
            Self::GenerationFailed { .. }
            | Self::StopFailed { .. }
            | Self::InvalidInput { .. }
            | Self::ParametersUpdateFailed { .. }
            | Self::UnexpectedResponse { .. }
            | Self::ContextOverflow { .. }
            | Self::ModelNotReady
            | Self::HistoryCorrupted => None,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::GenerationFailed { .. } | Self::StopFailed { .. } => Severity::Medium,
            Self::ContextOverflow { .. }
            | Self::InvalidInput { .. }
            | Self::ModelNotReady
            | Self::UnexpectedResponse { .. } => Severity::Low,
            Self::ParametersUpdateFailed { .. } => Severity::Medium,
            Self::HistoryCorrupted => Severity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> Option<String> {
        let text = match self {
            Self::GenerationFailed { .. } => "Send the message again.",
            Self::StopFailed { .. } => "Wait for the response to finish, then try again.",
            Self::ContextOverflow { .. } => "Clear the conversation to start fresh.",
            Self::InvalidInput { .. } => "Check your message and try again.",
            Self::ModelNotReady => "Wait for the model to finish loading.",
            Self::UnexpectedResponse { .. } => "Try sending the message again.",
            Self::ParametersUpdateFailed { .. } => "Reset the parameters to their defaults and try again.",
            Self::HistoryCorrupted => "Clear the conversation history.",
        };
        Some(text.to_string())
    }
}

// ============================================================================
// Interface
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterfaceError {
    #[error("The interface reached an invalid state: {state}")]
    InvalidState { state: String },

    #[error("Navigation to '{destination}' failed")]
    NavigationFailed { destination: String },

    #[error("An alert could not be presented")]
    AlertPresentationFailed,

    #[error("The '{sheet}' panel could not be presented")]
    SheetPresentationFailed { sheet: String },

    #[error("Clipboard operation failed: {reason}")]
    ClipboardFailed { reason: String },

    #[error("Input focus could not be changed")]
    FocusFailed,

    #[error("Animation '{name}' failed")]
    AnimationFailed { name: String },
}

impl InterfaceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } => "invalid_state",
            Self::NavigationFailed { .. } => "navigation_failed",
            Self::AlertPresentationFailed => "alert_presentation_failed",
            Self::SheetPresentationFailed { .. } => "sheet_presentation_failed",
            Self::ClipboardFailed { .. } => "clipboard_failed",
            Self::FocusFailed => "focus_failed",
            Self::AnimationFailed { .. } => "animation_failed",
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::InvalidState { state } => Some(state),
            Self::NavigationFailed { destination } => Some(destination),
            Self::SheetPresentationFailed { sheet } => Some(sheet),
            Self::AnimationFailed { name } => Some(name),
            Self::ClipboardFailed { .. } | Self::AlertPresentationFailed | Self::FocusFailed => None,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::InvalidState { .. } => Severity::High,
            Self::NavigationFailed { .. }
            | Self::AlertPresentationFailed
            | Self::SheetPresentationFailed { .. } => Severity::Medium,
            Self::ClipboardFailed { .. } | Self::FocusFailed | Self::AnimationFailed { .. } => {
                Severity::Low
            }
        }
    }

    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::InvalidState { .. } => Some("Restart the application.".to_string()),
            Self::NavigationFailed { .. }
            | Self::AlertPresentationFailed
            | Self::SheetPresentationFailed { .. } => Some("Try the action again.".to_string()),
            Self::ClipboardFailed { .. } => Some("Copy the text again.".to_string()),
            Self::FocusFailed | Self::AnimationFailed { .. } => None,
        }
    }
}

// ============================================================================
// System / platform
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SystemError {
    #[error("This operating system version ({current}) is not supported; {required} or later is required")]
    OsIncompatible { required: String, current: String },

    #[error("This device ({device}) is not supported")]
    DeviceUnsupported { device: String },

    #[error("The system is low on memory ({available_mb} MB available)")]
    MemoryPressure { available_mb: u64 },

    #[error("The device is low on storage ({} MB available)", mb(.available_bytes))]
    StorageLow { available_bytes: u64 },

    #[error("Permission '{permission}' was denied")]
    PermissionDenied { permission: String },

    #[error("Background task '{task}' failed")]
    BackgroundTaskFailed { task: String },

    #[error("Stored data '{what}' is corrupted")]
    DataCorruption { what: String },
}

impl SystemError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::OsIncompatible { .. } => "os_incompatible",
            Self::DeviceUnsupported { .. } => "device_unsupported",
            Self::MemoryPressure { .. } => "memory_pressure",
            Self::StorageLow { .. } => "storage_low",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::BackgroundTaskFailed { .. } => "background_task_failed",
            Self::DataCorruption { .. } => "data_corruption",
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::OsIncompatible { current, .. } => Some(current),
            Self::DeviceUnsupported { device } => Some(device),
            Self::PermissionDenied { permission } => Some(permission),
            Self::BackgroundTaskFailed { task } => Some(task),
            Self::DataCorruption { what } => Some(what),
            Self::MemoryPressure { .. } | Self::StorageLow { .. } => None,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::OsIncompatible { .. } | Self::DeviceUnsupported { .. } => Severity::Critical,
            Self::MemoryPressure { .. } | Self::StorageLow { .. } => Severity::High,
            Self::PermissionDenied { .. } | Self::BackgroundTaskFailed { .. } => Severity::Medium,
            Self::DataCorruption { .. } => Severity::Medium,
        }
    }

    pub fn recovery_suggestion(&self) -> Option<String> {
        let text = match self {
            Self::OsIncompatible { required, .. } => {
                return Some(format!("Update the operating system to {} or later.", required))
            }
            Self::DeviceUnsupported { .. } => "Use a supported device.",
            Self::MemoryPressure { .. } => "Clear the conversation or close other applications.",
            Self::StorageLow { .. } => "Delete unused models or files to free storage.",
            Self::PermissionDenied { .. } => "Grant the permission in the system settings.",
            Self::BackgroundTaskFailed { .. } => "Restart the application.",
            Self::DataCorruption { .. } => "Clear the stored data to recover.",
        };
        Some(text.to_string())
    }
}

// ============================================================================
// Input validation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("'{field}' must not be empty")]
    EmptyField { field: String },

    #[error("'{field}' has an invalid format; expected {expected}")]
    InvalidFormat { field: String, expected: String },

    #[error("'{field}' value {value} is outside the allowed range {min}..={max}")]
    OutOfRange {
        field: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("'{field}' is longer than {max_length} characters")]
    TooLong { field: String, max_length: usize },

    #[error("File is too large ({} MB, limit {} MB)", mb(.size_bytes), mb(.max_bytes))]
    FileTooLarge { size_bytes: u64, max_bytes: u64 },

    #[error("File is too small to be a model ({size_bytes} bytes)")]
    FileTooSmall { size_bytes: u64 },

    #[error("'{name}' is a bundled model and cannot be modified")]
    ProtectedModel { name: String },

    #[error("Another operation is already in progress: {operation}")]
    OperationInProgress { operation: String },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyField { .. } => "empty_field",
            Self::InvalidFormat { .. } => "invalid_format",
            Self::OutOfRange { .. } => "out_of_range",
            Self::TooLong { .. } => "too_long",
            Self::FileTooLarge { .. } => "file_too_large",
            Self::FileTooSmall { .. } => "file_too_small",
            Self::ProtectedModel { .. } => "protected_model",
            Self::OperationInProgress { .. } => "operation_in_progress",
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::EmptyField { field }
            | Self::InvalidFormat { field, .. }
            | Self::OutOfRange { field, .. }
            | Self::TooLong { field, .. } => Some(field),
            Self::ProtectedModel { name } => Some(name),
            Self::OperationInProgress { operation } => Some(operation),
            Self::FileTooLarge { .. } | Self::FileTooSmall { .. } => None,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::FileTooLarge { .. } | Self::FileTooSmall { .. } => Severity::Medium,
            Self::EmptyField { .. }
            | Self::InvalidFormat { .. }
            | Self::OutOfRange { .. }
            | Self::TooLong { .. }
            | Self::ProtectedModel { .. }
            | Self::OperationInProgress { .. } => Severity::Low,
        }
    }

    pub fn recovery_suggestion(&self) -> Option<String> {
        let text = match self {
            Self::EmptyField { .. } => "Fill in the field and try again.",
            Self::InvalidFormat { .. } | Self::OutOfRange { .. } | Self::TooLong { .. } => {
                "Correct the value and try again."
            }
            Self::FileTooLarge { .. } => "Choose a smaller, more heavily quantized model file.",
            Self::FileTooSmall { .. } => "Choose a complete GGUF model file.",
            Self::ProtectedModel { .. } => "Bundled models are always available and cannot be removed.",
            Self::OperationInProgress { .. } => "Wait for the current operation to finish.",
        };
        Some(text.to_string())
    }
}

// ============================================================================
// Network
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NetworkError {
    #[error("No network connection")]
    NoConnection,

    #[error("The request timed out")]
    Timeout,

    #[error("The server returned an invalid response (status {status})")]
    InvalidResponse { status: u16 },

    #[error("Received data was corrupted")]
    CorruptedData,

    #[error("'{url}' is not a valid URL")]
    InvalidUrl { url: String },

    #[error("Download from '{url}' failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },
}

impl NetworkError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoConnection => "no_connection",
            Self::Timeout => "timeout",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::CorruptedData => "corrupted_data",
            Self::InvalidUrl { .. } => "invalid_url",
            Self::DownloadFailed { .. } => "download_failed",
            Self::UploadFailed { .. } => "upload_failed",
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::InvalidUrl { url } | Self::DownloadFailed { url, .. } => Some(url),
            Self::NoConnection
            | Self::Timeout
            | Self::InvalidResponse { .. }
            | Self::CorruptedData
            | Self::UploadFailed { .. } => None,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::NoConnection => Severity::High,
            Self::Timeout
            | Self::InvalidResponse { .. }
            | Self::CorruptedData
            | Self::InvalidUrl { .. }
            | Self::DownloadFailed { .. }
            | Self::UploadFailed { .. } => Severity::Medium,
        }
    }

    pub fn recovery_suggestion(&self) -> Option<String> {
        let text = match self {
            Self::NoConnection => "Check your network connection and try again.",
            Self::Timeout => "Try again in a moment.",
            Self::InvalidResponse { .. } | Self::CorruptedData => "Try the request again.",
            Self::InvalidUrl { .. } => "Check the address and try again.",
            Self::DownloadFailed { .. } => "Restart the download.",
            Self::UploadFailed { .. } => "Try uploading again.",
        };
        Some(text.to_string())
    }
}

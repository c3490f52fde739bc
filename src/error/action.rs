use serde::{Deserialize, Serialize};

use super::{
    AppError, ChatError, FileSystemError, InterfaceError, ModelError, SystemError, ValidationError,
};

/// Operator-level remedy suggested for an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    Restart,
    ClearData,
    SwitchModel,
    FreeMemory,
    CheckPermissions,
    ContactSupport,
    UpdateOs,
    NoAction,
}

impl RecoveryAction {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Retry => "Try Again",
            Self::Restart => "Restart",
            Self::ClearData => "Clear Data",
            Self::SwitchModel => "Switch Model",
            Self::FreeMemory => "Free Memory",
            Self::CheckPermissions => "Check Permissions",
            Self::ContactSupport => "Contact Support",
            Self::UpdateOs => "Update System",
            Self::NoAction => "OK",
        }
    }

    /// Icon hint for the presentation layer
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Retry => "arrow-clockwise",
            Self::Restart => "power",
            Self::ClearData => "trash",
            Self::SwitchModel => "arrows-swap",
            Self::FreeMemory => "memory-chip",
            Self::CheckPermissions => "lock-shield",
            Self::ContactSupport => "lifebuoy",
            Self::UpdateOs => "download",
            Self::NoAction => "checkmark",
        }
    }

    /// False only for the no-op action
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::NoAction)
    }

    pub fn all() -> &'static [RecoveryAction] {
        &[
            Self::Retry,
            Self::Restart,
            Self::ClearData,
            Self::SwitchModel,
            Self::FreeMemory,
            Self::CheckPermissions,
            Self::ContactSupport,
            Self::UpdateOs,
            Self::NoAction,
        ]
    }
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

/// The recovery table: exactly one action per leaf error kind.
pub(super) fn suggested_action(error: &AppError) -> RecoveryAction {
    use RecoveryAction::*;

    match error {
        AppError::Model(e) => match e {
            ModelError::FileNotFound { .. }
            | ModelError::InvalidFile { .. }
            | ModelError::CorruptedFile { .. }
            | ModelError::UnsupportedModelType { .. } => SwitchModel,
            ModelError::InsufficientMemory { .. } => FreeMemory,
            ModelError::InitializationFailed { .. } => Restart,
            ModelError::BundleResourceMissing { .. } => Restart,
            ModelError::UrlConstructionFailed { .. } => Retry,
        },
        AppError::FileSystem(e) => match e {
            FileSystemError::CopyFailed { .. }
            | FileSystemError::DeleteFailed { .. }
            | FileSystemError::InvalidPath { .. }
            | FileSystemError::PathDoesNotExist { .. }
            | FileSystemError::PickerFailed { .. } => Retry,
            FileSystemError::AccessDenied { .. } => CheckPermissions,
            FileSystemError::InsufficientSpace { .. } => ClearData,
            FileSystemError::TempFileCreationFailed { .. } => ClearData,
        },
        AppError::Chat(e) => match e {
            ChatError::GenerationFailed { .. }
            | ChatError::StopFailed { .. }
            | ChatError::InvalidInput { .. }
            | ChatError::UnexpectedResponse { .. }
            | ChatError::ParametersUpdateFailed { .. } => Retry,
            ChatError::ContextOverflow { .. } | ChatError::HistoryCorrupted => ClearData,
            ChatError::ModelNotReady => NoAction,
        },
        AppError::Interface(e) => match e {
            InterfaceError::InvalidState { .. } => Restart,
            InterfaceError::NavigationFailed { .. }
            | InterfaceError::AlertPresentationFailed
            | InterfaceError::SheetPresentationFailed { .. }
            | InterfaceError::ClipboardFailed { .. } => Retry,
            InterfaceError::FocusFailed | InterfaceError::AnimationFailed { .. } => NoAction,
        },
        AppError::System(e) => match e {
            SystemError::OsIncompatible { .. } | SystemError::DeviceUnsupported { .. } => UpdateOs,
            SystemError::MemoryPressure { .. } => FreeMemory,
            SystemError::StorageLow { .. } | SystemError::DataCorruption { .. } => ClearData,
            SystemError::PermissionDenied { .. } => CheckPermissions,
            SystemError::BackgroundTaskFailed { .. } => Restart,
        },
        AppError::Validation(e) => match e {
            ValidationError::EmptyField { .. }
            | ValidationError::InvalidFormat { .. }
            | ValidationError::OutOfRange { .. }
            | ValidationError::TooLong { .. }
            | ValidationError::FileTooLarge { .. }
            | ValidationError::FileTooSmall { .. } => Retry,
            ValidationError::ProtectedModel { .. } | ValidationError::OperationInProgress { .. } => {
                NoAction
            }
        },
        AppError::Network(_) => Retry,
    }
}

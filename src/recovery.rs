//! Recovery dispatcher
//!
//! Turns a suggested `RecoveryAction` into a concrete operation on the model
//! controller or the host environment. The current error is cleared before
//! the effect runs, and every effect tolerates being run twice in a row.

use std::sync::Arc;
use tracing::{info, warn};

use crate::controller::{ControllerState, ModelController, PendingOp};
use crate::error::{AppError, ErrorManager, InterfaceError, RecoveryAction};

/// Surfaces owned by the host platform
pub trait PlatformHost {
    fn open_settings(&self) -> Result<(), String>;
    fn open_system_update(&self) -> Result<(), String>;
    fn contact_support(&self) -> Result<(), String>;
}

/// Opens host surfaces in the default browser
#[derive(Debug, Clone)]
pub struct BrowserHost {
    settings_url: String,
    update_url: String,
    support_url: String,
}

impl BrowserHost {
    /// `settings_dir` is shown for permission problems
    pub fn new(settings_dir: &std::path::Path) -> Self {
        let repository = env!("CARGO_PKG_REPOSITORY");
        Self {
            settings_url: format!("file://{}", settings_dir.display()),
            update_url: format!("{}/releases", repository),
            support_url: format!("{}/issues", repository),
        }
    }

    fn open(url: &str) -> Result<(), String> {
        info!(%url, "opening host surface");
        webbrowser::open(url).map_err(|e| e.to_string())
    }
}

impl PlatformHost for BrowserHost {
    fn open_settings(&self) -> Result<(), String> {
        Self::open(&self.settings_url)
    }

    fn open_system_update(&self) -> Result<(), String> {
        Self::open(&self.update_url)
    }

    fn contact_support(&self) -> Result<(), String> {
        Self::open(&self.support_url)
    }
}

/// What a dispatch actually did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Reloaded,
    Reinitialized,
    ClearedData { temp_files: usize },
    SwitchedTo(String),
    /// A failed import ran again and succeeded
    Imported(String),
    Deleted(String),
    /// A failed reply was generated again
    Replied(String),
    FreedMemory,
    OpenedHost(&'static str),
    Nothing,
}

pub struct RecoveryDispatcher<H: PlatformHost> {
    errors: Arc<ErrorManager>,
    host: H,
}

impl<H: PlatformHost> RecoveryDispatcher<H> {
    pub fn new(errors: Arc<ErrorManager>, host: H) -> Self {
        Self { errors, host }
    }

    /// Run the action suggested for the current error, if any
    pub async fn dispatch_current(
        &self,
        controller: &mut ModelController,
    ) -> Result<DispatchOutcome, AppError> {
        match self.errors.current() {
            Some(error) => self.dispatch(error.recovery_action(), controller).await,
            None => Ok(DispatchOutcome::Nothing),
        }
    }

    pub async fn dispatch(
        &self,
        action: RecoveryAction,
        controller: &mut ModelController,
    ) -> Result<DispatchOutcome, AppError> {
        let failed = self.errors.current();
        self.errors.clear_current();
        info!(%action, "dispatching recovery");

        match action {
            RecoveryAction::Retry => {
                if let Some(op) = controller.take_retry(failed.as_ref()) {
                    return Self::replay(op, controller).await;
                }
                // Without a failed operation, only a broken model is left to retry
                if controller.state() == ControllerState::Ready {
                    return Ok(DispatchOutcome::Nothing);
                }
                controller.restart().await?;
                Ok(DispatchOutcome::Reloaded)
            }
            RecoveryAction::Restart => {
                controller.initialize().await?;
                Ok(DispatchOutcome::Reinitialized)
            }
            RecoveryAction::ClearData => {
                controller.clear_conversation().await;
                let temp_files = controller.clear_temp_files()?;
                Ok(DispatchOutcome::ClearedData { temp_files })
            }
            RecoveryAction::SwitchModel => {
                let Some(target) = controller.first_bundled().cloned() else {
                    warn!("no bundled model to switch to");
                    return Ok(DispatchOutcome::Nothing);
                };
                if controller.is_active(&target) {
                    return Ok(DispatchOutcome::Nothing);
                }
                controller.switch_model(&target).await?;
                Ok(DispatchOutcome::SwitchedTo(target.filename))
            }
            RecoveryAction::FreeMemory => {
                controller.clear_conversation().await;
                controller.clear_debug_log();
                Ok(DispatchOutcome::FreedMemory)
            }
            RecoveryAction::CheckPermissions => {
                self.open_host("settings", || self.host.open_settings())
            }
            RecoveryAction::UpdateOs => {
                self.open_host("system update", || self.host.open_system_update())
            }
            RecoveryAction::ContactSupport => {
                self.open_host("support", || self.host.contact_support())
            }
            RecoveryAction::NoAction => Ok(DispatchOutcome::Nothing),
        }
    }

    async fn replay(
        op: PendingOp,
        controller: &mut ModelController,
    ) -> Result<DispatchOutcome, AppError> {
        info!(?op, "running failed operation again");
        match op {
            PendingOp::Import(request) => {
                let config = controller.import_model(request).await?;
                Ok(DispatchOutcome::Imported(config.filename))
            }
            PendingOp::Delete(filename) => {
                controller.delete_model(&filename).await?;
                Ok(DispatchOutcome::Deleted(filename))
            }
            PendingOp::Generate(prompt) => {
                let reply = controller.regenerate(&prompt).await?;
                Ok(DispatchOutcome::Replied(reply))
            }
        }
    }

    fn open_host(
        &self,
        destination: &'static str,
        open: impl FnOnce() -> Result<(), String>,
    ) -> Result<DispatchOutcome, AppError> {
        match open() {
            Ok(()) => Ok(DispatchOutcome::OpenedHost(destination)),
            Err(reason) => {
                warn!(destination, "could not open: {}", reason);
                let error: AppError = InterfaceError::NavigationFailed {
                    destination: destination.to_string(),
                }
                .into();
                self.errors.handle(error.clone());
                Err(error)
            }
        }
    }
}

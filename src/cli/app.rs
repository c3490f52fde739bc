//! Controller plus recovery, as seen from the terminal.
//!
//! Operations on the controller report their own errors. The front-end only
//! watches the error manager's presentation channel and reacts: a blocking
//! error opens an alert offering its recovery action, anything else prints a
//! banner.

use anyhow::Result;
use tokio::sync::watch;

use super::ui;
use crate::controller::ModelController;
use crate::error::{ErrorManager, ErrorPresentation, RecoveryAction};
use crate::recovery::{DispatchOutcome, PlatformHost, RecoveryDispatcher};

pub struct App<H: PlatformHost> {
    pub controller: ModelController,
    dispatcher: RecoveryDispatcher<H>,
    alerts: watch::Receiver<ErrorPresentation>,
}

impl<H: PlatformHost> App<H> {
    pub fn new(controller: ModelController, host: H) -> Self {
        let errors = controller.errors().clone();
        let alerts = errors.subscribe();
        Self {
            controller,
            dispatcher: RecoveryDispatcher::new(errors, host),
            alerts,
        }
    }

    /// The error published since the last look, if any
    pub fn pending_alert(&mut self) -> Option<ErrorPresentation> {
        if !self.alerts.has_changed().unwrap_or(false) {
            return None;
        }
        let presentation = self.alerts.borrow_and_update().clone();
        presentation.current.is_some().then_some(presentation)
    }

    /// Show whatever errors the last operation raised. A recovery that fails
    /// raises a new error, which is shown in turn.
    pub async fn surface_errors(&mut self) -> Result<()> {
        while let Some(presentation) = self.pending_alert() {
            let Some(error) = presentation.current else {
                break;
            };
            let message = ErrorManager::user_message(&error);

            if !presentation.show_alert {
                ui::banner(&message);
                break;
            }

            let recoverable = self.controller.errors().can_recover(&error);
            match ui::alert(&message, recoverable)? {
                Some(action) => self.recover(action).await,
                None => {
                    self.controller.errors().clear_current();
                    // Consume the cleared state so it is not mistaken for news
                    self.alerts.borrow_and_update();
                    break;
                }
            }
        }
        Ok(())
    }

    /// Run a recovery action and print what it did
    pub async fn recover(&mut self, action: RecoveryAction) {
        if let Ok(outcome) = self.dispatcher.dispatch(action, &mut self.controller).await {
            ui::status(&describe(&outcome));
        }
    }

    /// Run the action suggested for the current error
    pub async fn recover_current(&mut self) -> Result<()> {
        match self.controller.errors().current() {
            Some(error) => {
                self.recover(error.recovery_action()).await;
                self.surface_errors().await
            }
            None => {
                ui::status("No error to recover from.");
                Ok(())
            }
        }
    }
}

pub fn describe(outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Reloaded => "Model reloaded.".to_string(),
        DispatchOutcome::Reinitialized => "Restarted.".to_string(),
        DispatchOutcome::ClearedData { temp_files } => match temp_files {
            0 => "Conversation cleared.".to_string(),
            1 => "Conversation and 1 temporary file cleared.".to_string(),
            n => format!("Conversation and {} temporary files cleared.", n),
        },
        DispatchOutcome::SwitchedTo(filename) => format!("Switched to {}.", filename),
        DispatchOutcome::Imported(filename) => format!("Imported {}.", filename),
        DispatchOutcome::Deleted(filename) => format!("Deleted {}.", filename),
        DispatchOutcome::Replied(reply) => reply.clone(),
        DispatchOutcome::FreedMemory => "Memory freed.".to_string(),
        DispatchOutcome::OpenedHost(what) => format!("Opened {}.", what),
        DispatchOutcome::Nothing => "Nothing to do.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::testing::{Fixture, NoHost};
    use crate::db::Database;
    use crate::error::{AppError, ChatError, ModelError};

    #[tokio::test]
    async fn test_pending_alert_follows_reports() {
        let fx = Fixture::new(&["m1.gguf"]);
        let mut app = App::new(fx.ready_controller().await, NoHost);
        assert!(app.pending_alert().is_none());

        fx.errors.handle(AppError::from(ChatError::ModelNotReady));
        let presentation = app.pending_alert().unwrap();
        assert_eq!(presentation.current, Some(AppError::from(ChatError::ModelNotReady)));
        assert!(!presentation.show_alert);
        assert!(app.pending_alert().is_none());

        fx.errors.clear_current();
        assert!(app.pending_alert().is_none());
    }

    #[tokio::test]
    async fn test_recover_reloads_failed_model() {
        let fx = Fixture::new(&["m1.gguf"]);
        fx.engine.fail_on("m1.gguf");
        let mut app = App::new(fx.controller(Database::open_memory().unwrap()), NoHost);
        let _ = app.controller.initialize().await;

        let presentation = app.pending_alert().unwrap();
        assert!(matches!(
            presentation.current,
            Some(AppError::Model(ModelError::InitializationFailed { .. }))
        ));
        assert!(presentation.show_alert);

        fx.engine.succeed_on("m1.gguf");
        app.recover_current().await.unwrap();
        assert_eq!(app.controller.state(), crate::controller::ControllerState::Ready);
        assert!(fx.errors.current().is_none());
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            describe(&DispatchOutcome::ClearedData { temp_files: 2 }),
            "Conversation and 2 temporary files cleared."
        );
        assert_eq!(
            describe(&DispatchOutcome::SwitchedTo("m1.gguf".into())),
            "Switched to m1.gguf."
        );
        assert_eq!(
            describe(&DispatchOutcome::Imported("u1.gguf".into())),
            "Imported u1.gguf."
        );
        assert_eq!(describe(&DispatchOutcome::Replied("Hi!".into())), "Hi!");
    }
}

//! Shared UI primitives for pocketchat
//!
//! Conventions:
//! - Prompts: lowercase with colon and space: `name: `
//! - Feedback: single word when possible: `Saved.`
//! - Errors and warnings go to stderr, everything else to stdout

use anyhow::Result;
use crossterm::{
    cursor,
    terminal::{Clear, ClearType},
    ExecutableCommand,
};
use inquire::{ui::RenderConfig, Confirm, InquireError, Select, Text};
use std::io::{self, Write};

use crate::error::{RecoveryAction, UserMessage};

/// Label for leaving an alert without recovering
pub const DISMISS: &str = "Dismiss";

const UNRECOVERABLE_NOTE: &str = "This may keep happening until pocketchat is restarted.";

// ============================================================================
// Layout Primitives
// ============================================================================

/// Return selection prefix for list items
#[inline]
pub fn selection_prefix(selected: bool) -> &'static str {
    if selected { "> " } else { "  " }
}

/// Truncate a string to max_chars, adding ellipsis if needed.
/// Result will be at most max_chars characters (including ellipsis if truncated).
pub fn truncate(s: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars - 1).collect();
    format!("{}…", kept)
}

/// Format a file size in the largest fitting unit (e.g. "1.2 GB")
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Clear the terminal screen and move cursor to top-left
pub fn clear_screen() -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(Clear(ClearType::All))?;
    stdout.execute(cursor::MoveTo(0, 0))?;
    stdout.flush()?;
    Ok(())
}

/// Get terminal dimensions, defaulting to 80x24 if unavailable
pub fn term_size() -> (usize, usize) {
    crossterm::terminal::size()
        .map(|(w, h)| (w as usize, h as usize))
        .unwrap_or((80, 24))
}

// ============================================================================
// Message Functions
// ============================================================================

/// Print a status message to stdout
#[inline]
pub fn status(msg: &str) {
    println!("{}", msg);
}

/// Print an error message to stderr
#[inline]
pub fn error(msg: &str) {
    eprintln!("Error: {}", msg);
}

/// Print a warning message to stderr
#[inline]
pub fn warning(msg: &str) {
    eprintln!("Warning: {}", msg);
}

/// One-line banner for errors that do not block
pub fn banner(message: &UserMessage) {
    let first = message.message.lines().next().unwrap_or_default();
    eprintln!("! {}: {}", message.title, first);
}

// ============================================================================
// Prompts
// ============================================================================

/// Get a minimal render config for inquire prompts
pub fn minimal_render_config() -> RenderConfig<'static> {
    RenderConfig::default_colored()
        .with_prompt_prefix(inquire::ui::Styled::new(""))
        .with_answered_prompt_prefix(inquire::ui::Styled::new(""))
}

/// Display a selection menu and return the chosen index
pub fn select<T: ToString>(prompt: &str, options: &[T]) -> Result<Option<usize>> {
    if options.is_empty() {
        return Ok(None);
    }

    let items: Vec<String> = options.iter().map(|o| o.to_string()).collect();

    let result = Select::new(prompt, items.clone())
        .with_render_config(minimal_render_config())
        .with_vim_mode(true)
        .prompt_skippable()?;

    Ok(result.and_then(|selected| items.iter().position(|i| *i == selected)))
}

/// Prompt for text input with optional default value
pub fn text_input(prompt: &str, default: Option<&str>) -> Result<Option<String>> {
    let mut builder = Text::new(prompt).with_render_config(minimal_render_config());

    if let Some(d) = default {
        if !d.is_empty() {
            builder = builder.with_default(d);
        }
    }

    let result = builder.prompt_skippable()?;
    Ok(result)
}

/// Prompt for yes/no confirmation (default: no)
pub fn confirm(prompt: &str) -> Result<bool> {
    match Confirm::new(prompt)
        .with_render_config(minimal_render_config())
        .with_default(false)
        .prompt()
    {
        Ok(answer) => Ok(answer),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Options offered by a blocking alert: the recovery action, then dismiss
pub fn alert_options(action: RecoveryAction) -> Vec<&'static str> {
    if action.is_actionable() {
        vec![action.title(), DISMISS]
    } else {
        vec![DISMISS]
    }
}

/// Alert text; errors that cannot be recovered in place say so
pub fn alert_body(message: &UserMessage, recoverable: bool) -> String {
    if recoverable {
        message.message.clone()
    } else {
        format!("{}\n\n{}", message.message, UNRECOVERABLE_NOTE)
    }
}

/// Show a blocking alert and return the recovery action the user picked.
/// Without a terminal the alert is printed and treated as dismissed.
pub fn alert(message: &UserMessage, recoverable: bool) -> Result<Option<RecoveryAction>> {
    eprintln!();
    eprintln!("{}", message.title);
    eprintln!("{}", alert_body(message, recoverable));
    eprintln!();

    let options = alert_options(message.action);
    let answer = Select::new("action:", options)
        .with_render_config(minimal_render_config())
        .prompt();

    match answer {
        Ok(choice) if choice == message.action.title() && message.action.is_actionable() => {
            Ok(Some(message.action))
        }
        Ok(_) => Ok(None),
        Err(
            InquireError::NotTTY
            | InquireError::OperationCanceled
            | InquireError::OperationInterrupted,
        ) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 5), "hello");
        assert_eq!(truncate("hello world", 6), "hello…");
        assert_eq!(truncate("hello", 0), "");
        assert_eq!(truncate("héllo wörld", 4), "hél…");
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(5 * 1024 * 1024 * 1024), "5.0 GB");
    }

    #[test]
    fn test_alert_options() {
        assert_eq!(alert_options(RecoveryAction::Retry), vec!["Try Again", DISMISS]);
        assert_eq!(alert_options(RecoveryAction::NoAction), vec![DISMISS]);
    }

    #[test]
    fn test_alert_body_marks_unrecoverable() {
        let message = UserMessage {
            title: "Model Error".to_string(),
            message: "Could not load.".to_string(),
            action: RecoveryAction::Restart,
            blocking: true,
        };
        assert_eq!(alert_body(&message, true), "Could not load.");
        assert!(alert_body(&message, false).ends_with(UNRECOVERABLE_NOTE));
    }

    #[test]
    fn test_selection_prefix() {
        assert_eq!(selection_prefix(true), "> ");
        assert_eq!(selection_prefix(false), "  ");
    }
}

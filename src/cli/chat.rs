//! Interactive chat
//!
//! Plain lines are sent to the active model and the reply streams back token
//! by token; Ctrl-C stops a reply in progress. Lines starting with `/` manage
//! models and settings.

use anyhow::Result;
use inquire::{InquireError, Text};
use std::io::{self, BufRead, Write};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use super::app::App;
use super::models::{run_delete, run_import, run_models, run_params, run_reset, run_use};
use super::{ui, ParamsArgs};
use crate::controller::EventOutcome;
use crate::engine::StreamEvent;
use crate::error::{ErrorManager, Severity};
use crate::models::TemplateType;
use crate::recovery::PlatformHost;

/// Entries shown by `/errors`
const RECENT_ERRORS: usize = 10;

/// Chat command parsed from user input
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    Empty,
    Help,
    Models,
    Use(String),
    Import(String),
    Delete(String),
    Restart,
    Reset,
    Params(String),
    Errors(String),
    Recover,
    Status,
    Clear,
    Quit,
    /// Text for the model
    Message(String),
    Unknown(String),
}

impl ChatCommand {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return ChatCommand::Empty;
        }

        // Handle common commands without / prefix
        let lower = input.to_lowercase();
        if matches!(lower.as_str(), "q" | "quit" | "exit" | "bye") {
            return ChatCommand::Quit;
        }
        if matches!(lower.as_str(), "help" | "?") {
            return ChatCommand::Help;
        }

        let Some(rest) = input.strip_prefix('/') else {
            return ChatCommand::Message(input.to_string());
        };

        let parts: Vec<&str> = rest.splitn(2, ' ').collect();
        let cmd = parts[0].to_lowercase();
        let args = parts.get(1).map(|s| s.trim().to_string()).unwrap_or_default();

        match cmd.as_str() {
            "h" | "help" | "?" => ChatCommand::Help,
            "m" | "models" | "ls" => ChatCommand::Models,
            "u" | "use" | "switch" => ChatCommand::Use(args),
            "i" | "import" => ChatCommand::Import(args),
            "d" | "delete" | "rm" => ChatCommand::Delete(args),
            "restart" | "reload" => ChatCommand::Restart,
            "reset" => ChatCommand::Reset,
            "p" | "params" => ChatCommand::Params(args),
            "e" | "errors" => ChatCommand::Errors(args),
            "r" | "recover" | "fix" => ChatCommand::Recover,
            "s" | "status" => ChatCommand::Status,
            "c" | "clear" | "new" => ChatCommand::Clear,
            "q" | "quit" | "exit" => ChatCommand::Quit,
            _ => ChatCommand::Unknown(format!("/{}", rest)),
        }
    }
}

const HELP: &str = "\
/models              list models
/use <name>          switch model
/import <path> [fmt] import a .gguf file (fmt: chatml, llama3, gemma, phi3, mistral, alpaca)
/delete <filename>   delete an imported model
/restart             reload the current model
/reset               remove imported models and settings
/params [k v ...]    show or set temperature, top_k, top_p, context
/errors [clear|export <path>|import <path>]
/recover             run the suggested fix for the last error
/status              model, state and context usage
/clear               start a new conversation
/quit                exit

Ctrl-C stops a reply in progress.";

/// Run the chat loop until the user quits
pub async fn run_chat<H: PlatformHost>(app: &mut App<H>) -> Result<()> {
    let (tx, mut interrupts) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    app.surface_errors().await?;
    match app.controller.active() {
        Some(model) => ui::status(&format!("{} ({})", model.display_name, app.controller.state())),
        None => ui::status("No model loaded. Import one with /import <path>"),
    }
    ui::status("Type /help for commands.");

    while let Some(line) = read_line()? {
        match ChatCommand::parse(&line) {
            ChatCommand::Empty => {}
            ChatCommand::Help => ui::status(HELP),
            ChatCommand::Quit => break,
            ChatCommand::Message(text) => stream_reply(app, &text, &mut interrupts).await?,
            ChatCommand::Models => run_models(app),
            ChatCommand::Use(name) if name.is_empty() => {
                let filenames: Vec<String> =
                    app.controller.catalog().iter().map(|m| m.filename.clone()).collect();
                let names: Vec<&str> =
                    app.controller.catalog().iter().map(|m| m.display_name.as_str()).collect();
                if let Some(idx) = ui::select("model:", &names)? {
                    run_use(app, &filenames[idx]).await?;
                }
            }
            ChatCommand::Use(name) => run_use(app, &name).await?,
            ChatCommand::Import(args) => match parse_import_args(&args) {
                Some((path, template)) => {
                    let stem = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_default();
                    let name = ui::text_input("name:", Some(&stem))?;
                    run_import(app, &path, name, &template, None).await?
                }
                None => ui::status("usage: /import <path> [format]"),
            },
            ChatCommand::Delete(name) if name.is_empty() => ui::status("usage: /delete <filename>"),
            ChatCommand::Delete(name) => run_delete(app, &name, false).await?,
            ChatCommand::Restart => {
                if app.controller.restart().await.is_ok() {
                    ui::status("Reloaded.");
                }
            }
            ChatCommand::Reset => run_reset(app, false).await?,
            ChatCommand::Params(args) => match parse_param_updates(&args) {
                Ok(updates) => run_params(app, &updates).await?,
                Err(msg) => ui::error(&msg),
            },
            ChatCommand::Errors(args) => show_errors(app, &args)?,
            ChatCommand::Recover => app.recover_current().await?,
            ChatCommand::Status => show_status(app).await,
            ChatCommand::Clear => {
                app.controller.clear_conversation().await;
                ui::clear_screen()?;
            }
            ChatCommand::Unknown(cmd) => ui::warning(&format!("Unknown command {}. Try /help", cmd)),
        }
        app.surface_errors().await?;
    }
    Ok(())
}

/// Next input line; None at end of input
fn read_line() -> Result<Option<String>> {
    let answer = tokio::task::block_in_place(|| {
        Text::new("you:")
            .with_render_config(ui::minimal_render_config())
            .prompt()
    });
    match answer {
        Ok(line) => Ok(Some(line)),
        Err(InquireError::OperationCanceled) => Ok(Some(String::new())),
        Err(InquireError::OperationInterrupted) => Ok(None),
        Err(InquireError::NotTTY) => {
            let mut line = String::new();
            let read = tokio::task::block_in_place(|| io::stdin().lock().read_line(&mut line))?;
            Ok((read > 0).then_some(line))
        }
        Err(e) => Err(e.into()),
    }
}

/// Stream one reply to stdout. Errors are left for the error channel.
async fn stream_reply<H: PlatformHost>(
    app: &mut App<H>,
    prompt: &str,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> Result<()> {
    // Ignore Ctrl-C presses from before this reply
    while interrupts.try_recv().is_ok() {}

    let Ok(mut handle) = app.controller.begin_generation(prompt).await else {
        return Ok(());
    };

    let mut stdout = io::stdout();
    loop {
        tokio::select! {
            event = handle.stream.next() => {
                let event = event.unwrap_or(StreamEvent::Finished);
                let token = match &event {
                    StreamEvent::Token(text) => Some(text.clone()),
                    _ => None,
                };
                match app.controller.apply_event(handle.id, event) {
                    Ok(EventOutcome::Applied) => {
                        if let Some(text) = token {
                            write!(stdout, "{}", text)?;
                            stdout.flush()?;
                        }
                    }
                    Ok(EventOutcome::Finished | EventOutcome::Ignored) | Err(_) => break,
                }
            }
            Some(()) = interrupts.recv() => {
                app.controller.stop_generation().await;
                writeln!(stdout)?;
                ui::status("Stopped.");
                return Ok(());
            }
        }
    }
    writeln!(stdout)?;
    Ok(())
}

async fn show_status<H: PlatformHost>(app: &App<H>) {
    let controller = &app.controller;
    let model = controller
        .active()
        .map(|m| m.display_name.clone())
        .unwrap_or_else(|| "none".to_string());
    ui::status(&format!("model:   {}", model));
    ui::status(&format!("state:   {}", controller.state()));
    ui::status(&format!("engine:  {}", controller.engine_name()));
    if let Ok((used, limit)) = controller.context_usage().await {
        ui::status(&format!("context: {}/{} tokens", used, limit));
    }
    ui::status(&format!("turns:   {}", controller.conversation().len()));
}

fn show_errors<H: PlatformHost>(app: &App<H>, args: &str) -> Result<()> {
    let errors = app.controller.errors();
    let mut parts = args.splitn(2, ' ');
    match parts.next().unwrap_or_default() {
        "" => {
            let recent = errors.recent(RECENT_ERRORS);
            // time, severity and code columns take 50
            let width = ui::term_size().0.saturating_sub(50).max(20);
            if recent.is_empty() {
                ui::status("No errors.");
            }
            for entry in recent {
                ui::status(&format!(
                    "{}  {:<8}  {:<28}  {}",
                    entry.timestamp.format("%H:%M:%S"),
                    entry.error.severity(),
                    entry.error.code(),
                    ui::truncate(&entry.error.description(), width)
                ));
            }
            if let Some(summary) = severity_summary(&errors.counts_by_severity()) {
                ui::status(&summary);
            }
        }
        "clear" => {
            errors.clear_history();
            ui::status("Cleared.");
        }
        "export" => {
            let Some(path) = parts.next().map(str::trim).filter(|p| !p.is_empty()) else {
                ui::status("usage: /errors export <path>");
                return Ok(());
            };
            match errors.export_history() {
                Ok(json) => {
                    std::fs::write(expand_home(path), json)?;
                    ui::status("Exported.");
                }
                Err(msg) => ui::error(&msg),
            }
        }
        "import" => {
            let Some(path) = parts.next().map(str::trim).filter(|p| !p.is_empty()) else {
                ui::status("usage: /errors import <path>");
                return Ok(());
            };
            match restore_errors(errors, &expand_home(path)) {
                Ok(count) => ui::status(&format!("Imported {} errors.", count)),
                Err(msg) => ui::error(&msg),
            }
        }
        other => ui::warning(&format!("Unknown option '{}'.", other)),
    }
    Ok(())
}

/// Replace the history with one written by `/errors export`
fn restore_errors(errors: &ErrorManager, path: &Path) -> std::result::Result<usize, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    errors.restore_history(&json)
}

/// "12 logged: 1 critical, 3 high, 8 low", most severe first
fn severity_summary(counts: &HashMap<Severity, usize>) -> Option<String> {
    let total: usize = counts.values().sum();
    if total == 0 {
        return None;
    }
    let parts: Vec<String> = [Severity::Critical, Severity::High, Severity::Medium, Severity::Low]
        .iter()
        .filter_map(|s| counts.get(s).filter(|n| **n > 0).map(|n| format!("{} {}", n, s)))
        .collect();
    Some(format!("{} logged: {}", total, parts.join(", ")))
}

/// `<path> [format]`, where the format is only taken from the last word
/// when it names a known template
fn parse_import_args(args: &str) -> Option<(PathBuf, String)> {
    let args = args.trim();
    if args.is_empty() {
        return None;
    }
    if let Some((path, last)) = args.rsplit_once(' ') {
        if TemplateType::parse(last).is_some() && !path.trim().is_empty() {
            return Some((expand_home(path.trim()), last.to_string()));
        }
    }
    Some((expand_home(args), TemplateType::ChatMl.as_str().to_string()))
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// `temperature 0.5 top_k 20`, `temp=0.5` or `reset`
fn parse_param_updates(args: &str) -> Result<ParamsArgs, String> {
    let mut updates = ParamsArgs::default();
    let mut words = args
        .split(|c: char| c.is_whitespace() || c == '=')
        .filter(|w| !w.is_empty());

    while let Some(key) = words.next() {
        let key = key.to_lowercase();
        if key == "reset" {
            updates.reset = true;
            continue;
        }
        let value = words
            .next()
            .ok_or_else(|| format!("missing value for {}", key))?;
        match key.as_str() {
            "temperature" | "temp" | "t" => updates.temperature = Some(parse_value(&key, value)?),
            "top_k" | "top-k" | "k" => updates.top_k = Some(parse_value(&key, value)?),
            "top_p" | "top-p" | "p" => updates.top_p = Some(parse_value(&key, value)?),
            "context" | "context_size" | "ctx" => {
                updates.context_size = Some(parse_value(&key, value)?)
            }
            _ => return Err(format!("unknown parameter: {}", key)),
        }
    }
    Ok(updates)
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid value for {}: {}", key, value))
}

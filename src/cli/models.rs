//! Model management commands, shared by the subcommands and the chat loop.

use anyhow::Result;
use std::path::Path;

use super::{app::App, ui, ParamsArgs};
use crate::controller::{ControllerState, ImportRequest, ModelController};
use crate::models::{find_bundled, ModelConfig, ModelParameters, TemplateType};
use crate::recovery::PlatformHost;

/// Print the catalog with the active model marked
pub fn run_models<H: PlatformHost>(app: &App<H>) {
    let controller = &app.controller;
    if controller.catalog().is_empty() {
        ui::status("No models. Import one with: pocketchat import <file.gguf>");
        return;
    }
    for line in catalog_lines(controller) {
        ui::status(&line);
    }
    ui::status("");
    ui::status(&format!(
        "state: {}  engine: {}",
        controller.state(),
        controller.engine_name()
    ));
}

fn catalog_lines(controller: &ModelController) -> Vec<String> {
    controller
        .catalog()
        .iter()
        .map(|model| {
            let active = controller.active().is_some_and(|a| a.id == model.id);
            format!(
                "{}{}  {}  {}",
                ui::selection_prefix(active),
                ui::truncate(&model.display_name, 40),
                model.filename,
                origin_label(model)
            )
        })
        .collect()
}

fn origin_label(model: &ModelConfig) -> String {
    if model.is_bundled() {
        return match find_bundled(&model.filename) {
            Some(shipped) => format!("bundled, {}", shipped.size_description),
            None => "bundled".to_string(),
        };
    }
    match model.location().and_then(|p| std::fs::metadata(p).ok()) {
        Some(meta) => format!("imported, {}", ui::human_size(meta.len())),
        None => "imported".to_string(),
    }
}

pub async fn run_import<H: PlatformHost>(
    app: &mut App<H>,
    path: &Path,
    name: Option<String>,
    template: &str,
    system_prompt: Option<String>,
) -> Result<()> {
    let Some(template_type) = TemplateType::parse(template) else {
        let valid: Vec<&str> = TemplateType::all().iter().map(|t| t.as_str()).collect();
        ui::error(&format!(
            "Unknown template '{}'. Use one of: {}",
            template,
            valid.join(", ")
        ));
        return Ok(());
    };

    let mut request = ImportRequest::from_path(path, template_type);
    request.display_name = name;
    request.system_prompt = system_prompt;

    ui::status("Importing...");
    match app.controller.import_model(request).await {
        Ok(model) => ui::status(&format!("Imported {}.", model.display_name)),
        Err(_) => app.surface_errors().await?,
    }
    Ok(())
}

pub async fn run_delete<H: PlatformHost>(
    app: &mut App<H>,
    filename: &str,
    skip_confirm: bool,
) -> Result<()> {
    if app.controller.find(filename).is_none() {
        ui::error(&format!("No model with filename '{}'.", filename));
        return Ok(());
    }
    if !skip_confirm && !ui::confirm(&format!("Delete {}?", filename))? {
        ui::status("Cancelled.");
        return Ok(());
    }
    match app.controller.delete_model(filename).await {
        Ok(()) => ui::status("Deleted."),
        Err(_) => app.surface_errors().await?,
    }
    Ok(())
}

pub async fn run_use<H: PlatformHost>(app: &mut App<H>, filename: &str) -> Result<()> {
    let target = app
        .controller
        .find(filename)
        .or_else(|| find_by_name(app.controller.catalog(), filename))
        .cloned();
    let Some(target) = target else {
        ui::error(&format!("No model named '{}'.", filename));
        return Ok(());
    };

    match app.controller.switch_model(&target).await {
        Ok(()) => ui::status(&format!("Using {}.", target.display_name)),
        Err(_) => app.surface_errors().await?,
    }
    Ok(())
}

/// Case-insensitive match on the display name
fn find_by_name<'a>(catalog: &'a [ModelConfig], name: &str) -> Option<&'a ModelConfig> {
    catalog
        .iter()
        .find(|m| m.display_name.eq_ignore_ascii_case(name.trim()))
}

pub async fn run_reset<H: PlatformHost>(app: &mut App<H>, skip_confirm: bool) -> Result<()> {
    if !skip_confirm && !ui::confirm("Delete all imported models and reset settings?")? {
        ui::status("Cancelled.");
        return Ok(());
    }
    match app.controller.emergency_reset().await {
        Ok(()) if app.controller.state() == ControllerState::NoModels => {
            ui::status("Reset. No bundled models found.")
        }
        Ok(()) => ui::status("Reset."),
        Err(_) => app.surface_errors().await?,
    }
    Ok(())
}

/// Show the parameters, or validate, store and apply new ones
pub async fn run_params<H: PlatformHost>(app: &mut App<H>, args: &ParamsArgs) -> Result<()> {
    if args.is_empty() {
        print_parameters(&app.controller.parameters());
        return Ok(());
    }

    let params = merge_parameters(app.controller.parameters(), args);
    if app.controller.set_parameters(params).is_err() {
        return app.surface_errors().await;
    }
    // Without a loaded session the values wait for the next load
    if app.controller.state() == ControllerState::Ready
        && app.controller.apply_parameters().is_err()
    {
        return app.surface_errors().await;
    }
    ui::status("Saved.");
    print_parameters(&app.controller.parameters());
    Ok(())
}

pub fn merge_parameters(current: ModelParameters, args: &ParamsArgs) -> ModelParameters {
    let base = if args.reset {
        ModelParameters::default()
    } else {
        current
    };
    ModelParameters {
        temperature: args.temperature.unwrap_or(base.temperature),
        top_k: args.top_k.unwrap_or(base.top_k),
        top_p: args.top_p.unwrap_or(base.top_p),
        context_size: args.context_size.unwrap_or(base.context_size),
    }
}

pub fn print_parameters(params: &ModelParameters) {
    ui::status(&format!("temperature:  {}", params.temperature));
    ui::status(&format!("top-k:        {}", params.top_k));
    ui::status(&format!("top-p:        {}", params.top_p));
    ui::status(&format!("context size: {}", params.context_size));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::testing::{Fixture, NoHost};

    #[test]
    fn test_merge_parameters() {
        let current = ModelParameters {
            temperature: 1.5,
            ..ModelParameters::default()
        };
        let args = ParamsArgs {
            top_k: Some(10),
            ..ParamsArgs::default()
        };
        let merged = merge_parameters(current, &args);
        assert_eq!(merged.temperature, 1.5);
        assert_eq!(merged.top_k, 10);

        let reset = ParamsArgs {
            reset: true,
            ..ParamsArgs::default()
        };
        assert_eq!(merge_parameters(current, &reset), ModelParameters::default());
    }

    #[tokio::test]
    async fn test_catalog_lines_mark_active() {
        let fx = Fixture::new(&["m1.gguf", "m2.gguf"]);
        let controller = fx.ready_controller().await;

        let lines = catalog_lines(&controller);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("> M1.GGUF"));
        assert!(lines[0].ends_with("bundled"));
        assert!(lines[1].starts_with("  M2.GGUF"));
    }

    #[test]
    fn test_origin_label_shows_shipped_size() {
        let shipped = &crate::models::BUNDLED_MODELS[0];
        assert_eq!(
            origin_label(&shipped.config()),
            format!("bundled, {}", shipped.size_description)
        );
    }

    #[tokio::test]
    async fn test_delete_unknown_filename_keeps_model() {
        let fx = Fixture::new(&["m1.gguf"]);
        let mut app = App::new(fx.ready_controller().await, NoHost);

        run_delete(&mut app, "typo.gguf", true).await.unwrap();

        assert_eq!(fx.errors.current(), None);
        assert!(app.pending_alert().is_none());
        assert_eq!(app.controller.active().unwrap().filename, "m1.gguf");
    }

    #[tokio::test]
    async fn test_find_by_name() {
        let fx = Fixture::new(&["m1.gguf"]);
        let controller = fx.ready_controller().await;
        assert!(find_by_name(controller.catalog(), " m1.GGUF ").is_some());
        assert!(find_by_name(controller.catalog(), "other").is_none());
    }
}

use clap::Parser;
use pocketchat::cli::{
    run_chat, run_config, run_delete, run_import, run_models, run_params, run_reset, run_use, App,
    Cli, Commands,
};
use pocketchat::config::{resolve_data_dir, AppConfig};
use pocketchat::controller::ModelController;
use pocketchat::db::Database;
use pocketchat::engine::default_engine;
use pocketchat::error::{ErrorManager, SystemContext};
use pocketchat::recovery::BrowserHost;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pocketchat=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let data_dir = resolve_data_dir()?;
    let db = Database::open_in(&data_dir)?;
    if let Some(Commands::Config(args)) = &cli.command {
        return run_config(&db, args);
    }
    let config = AppConfig::load(&db)?;

    let errors = Arc::new(ErrorManager::with_capacity(
        Box::new(SystemContext::new(config.data_dir.clone())),
        config.error_history_cap,
    ));
    let controller = ModelController::new(&config, db, default_engine(), errors);
    let mut app = App::new(controller, BrowserHost::new(&config.data_dir));

    // Reported through the error manager; shown below or in the chat loop
    if let Err(e) = app.controller.initialize().await {
        warn!("startup: {}", e);
    }

    match cli.command {
        None => run_chat(&mut app).await?,
        Some(command) => {
            app.surface_errors().await?;
            match command {
                Commands::Models => run_models(&app),
                Commands::Import(args) => {
                    run_import(
                        &mut app,
                        &args.path,
                        args.name,
                        &args.template,
                        args.system_prompt,
                    )
                    .await?
                }
                Commands::Delete(args) => run_delete(&mut app, &args.filename, args.yes).await?,
                Commands::Use(args) => run_use(&mut app, &args.filename).await?,
                Commands::Reset(args) => run_reset(&mut app, args.yes).await?,
                Commands::Params(args) => run_params(&mut app, &args).await?,
                Commands::Config(args) => run_config(app.controller.database(), &args)?,
            }
        }
    }

    Ok(())
}

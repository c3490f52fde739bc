use clap::{Args, Parser, Subcommand};

pub mod app;
pub mod chat;
pub mod models;
pub mod settings;
pub mod ui;

pub use app::App;
pub use chat::run_chat;
pub use models::{run_delete, run_import, run_models, run_params, run_reset, run_use};
pub use settings::run_config;

#[derive(Parser)]
#[command(name = "pocketchat")]
#[command(about = "Chat with local GGUF models")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available models
    Models,
    /// Copy a GGUF file into private storage and switch to it
    Import(ImportArgs),
    /// Delete an imported model
    Delete(DeleteArgs),
    /// Select the model used for chat
    Use(UseArgs),
    /// Remove imported models and return to the bundled ones
    Reset(ResetArgs),
    /// Show or change generation parameters
    Params(ParamsArgs),
    /// Show or change stored storage and tuning settings
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ImportArgs {
    /// Path to a .gguf file
    pub path: std::path::PathBuf,
    /// Name shown in the model list
    #[arg(short, long)]
    pub name: Option<String>,
    /// Prompt format: chatml, llama3, gemma, phi3, mistral, alpaca
    #[arg(short, long, default_value = "chatml")]
    pub template: String,
    #[arg(short, long)]
    pub system_prompt: Option<String>,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub filename: String,
    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct UseArgs {
    pub filename: String,
}

#[derive(Args)]
pub struct ResetArgs {
    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Default)]
pub struct ParamsArgs {
    #[arg(long)]
    pub temperature: Option<f32>,
    #[arg(long)]
    pub top_k: Option<u32>,
    #[arg(long)]
    pub top_p: Option<f32>,
    #[arg(long)]
    pub context_size: Option<u32>,
    /// Restore the defaults
    #[arg(long)]
    pub reset: bool,
}

impl ParamsArgs {
    pub fn is_empty(&self) -> bool {
        !self.reset
            && self.temperature.is_none()
            && self.top_k.is_none()
            && self.top_p.is_none()
            && self.context_size.is_none()
    }
}

#[derive(Args, Default)]
pub struct ConfigArgs {
    /// Directory the bundled model files ship in
    #[arg(long)]
    pub bundle_dir: Option<std::path::PathBuf>,
    /// Number of errors kept in the history
    #[arg(long)]
    pub error_history: Option<usize>,
    /// Pause after a model is unloaded, in milliseconds
    #[arg(long)]
    pub teardown_delay_ms: Option<u64>,
    /// Largest model file accepted for import, in megabytes
    #[arg(long)]
    pub max_import_mb: Option<u64>,
    /// Forget every stored setting
    #[arg(long)]
    pub reset: bool,
}

impl ConfigArgs {
    pub fn is_empty(&self) -> bool {
        !self.reset
            && self.bundle_dir.is_none()
            && self.error_history.is_none()
            && self.teardown_delay_ms.is_none()
            && self.max_import_mb.is_none()
    }
}

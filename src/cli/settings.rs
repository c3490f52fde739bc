//! Stored settings, changed without loading a model.

use anyhow::Result;
use std::time::Duration;

use super::{ui, ConfigArgs};
use crate::config::AppConfig;
use crate::db::Database;

/// Show the effective configuration, or store changes to it.
/// `--reset` runs first, so it can be combined with new values.
pub fn run_config(db: &Database, args: &ConfigArgs) -> Result<()> {
    if args.reset {
        AppConfig::clear(db)?;
        ui::status("Reset.");
    }

    let mut config = AppConfig::load(db)?;
    if apply_config_args(&mut config, args) {
        config.save(db)?;
        ui::status("Saved.");
    }
    print_config(&config);
    Ok(())
}

/// Copy the given values into `config`. Returns false if there were none.
pub fn apply_config_args(config: &mut AppConfig, args: &ConfigArgs) -> bool {
    let mut changed = false;
    if let Some(dir) = &args.bundle_dir {
        config.bundle_dir = Some(dir.clone());
        changed = true;
    }
    if let Some(cap) = args.error_history {
        config.error_history_cap = cap;
        changed = true;
    }
    if let Some(ms) = args.teardown_delay_ms {
        config.teardown_delay = Duration::from_millis(ms);
        changed = true;
    }
    if let Some(mb) = args.max_import_mb {
        config.max_import_bytes = mb.saturating_mul(1024 * 1024);
        changed = true;
    }
    changed
}

pub fn print_config(config: &AppConfig) {
    let bundle = config
        .bundle_dir
        .as_ref()
        .map(|d| d.display().to_string())
        .unwrap_or_else(|| "none".to_string());
    ui::status(&format!("data dir:       {}", config.data_dir.display()));
    ui::status(&format!("bundle dir:     {}", bundle));
    ui::status(&format!("error history:  {}", config.error_history_cap));
    ui::status(&format!("teardown delay: {} ms", config.teardown_delay.as_millis()));
    ui::status(&format!("max import:     {}", ui::human_size(config.max_import_bytes)));
}

//! Application configuration
//!
//! Resolves storage locations and tunables from environment variables with
//! database settings as fallback.

use crate::db::Database;
use crate::error::DEFAULT_HISTORY_CAP;
use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

// Settings keys for database storage
pub const SETTING_BUNDLE_DIR: &str = "bundle_dir";
pub const SETTING_ERROR_HISTORY: &str = "error_history_cap";
pub const SETTING_TEARDOWN_DELAY_MS: &str = "teardown_delay_ms";
pub const SETTING_MAX_IMPORT_MB: &str = "max_import_mb";

// Environment variable names
pub const ENV_DATA_DIR: &str = "POCKETCHAT_DATA_DIR";
const ENV_BUNDLE_DIR: &str = "POCKETCHAT_BUNDLE_DIR";
const ENV_ERROR_HISTORY: &str = "POCKETCHAT_ERROR_HISTORY";
const ENV_TEARDOWN_DELAY_MS: &str = "POCKETCHAT_TEARDOWN_DELAY_MS";
const ENV_MAX_IMPORT_MB: &str = "POCKETCHAT_MAX_IMPORT_MB";

pub const DEFAULT_TEARDOWN_DELAY_MS: u64 = 250;
pub const DEFAULT_MAX_IMPORT_MB: u64 = 16 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Root of private storage
    pub data_dir: PathBuf,
    /// Where bundled model files ship
    pub bundle_dir: Option<PathBuf>,
    pub error_history_cap: usize,
    /// Grace period after a session acknowledged its teardown
    pub teardown_delay: Duration,
    pub max_import_bytes: u64,
}

impl AppConfig {
    /// Configuration rooted at `data_dir` with every tunable at its default
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            bundle_dir: default_bundle_dir(),
            error_history_cap: DEFAULT_HISTORY_CAP,
            teardown_delay: Duration::from_millis(DEFAULT_TEARDOWN_DELAY_MS),
            max_import_bytes: DEFAULT_MAX_IMPORT_MB * 1024 * 1024,
        }
    }

    /// Load configuration from environment variables and database settings.
    /// Environment variables take precedence over database settings.
    pub fn load(db: &Database) -> Result<Self> {
        Self::load_with(db, |name| env::var(name).ok())
    }

    pub(crate) fn load_with(db: &Database, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = match var(ENV_DATA_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };
        let mut config = Self::with_data_dir(data_dir);

        let lookup = |env_name: &str, key: &str| -> Option<String> {
            var(env_name).or_else(|| db.get_setting(key).ok().flatten())
        };

        if let Some(dir) = lookup(ENV_BUNDLE_DIR, SETTING_BUNDLE_DIR) {
            config.bundle_dir = Some(PathBuf::from(dir));
        }

        if let Some(cap) = lookup(ENV_ERROR_HISTORY, SETTING_ERROR_HISTORY) {
            config.error_history_cap = parse_number(ENV_ERROR_HISTORY, &cap)?;
        }

        if let Some(ms) = lookup(ENV_TEARDOWN_DELAY_MS, SETTING_TEARDOWN_DELAY_MS) {
            config.teardown_delay = Duration::from_millis(parse_number(ENV_TEARDOWN_DELAY_MS, &ms)?);
        }

        if let Some(mb) = lookup(ENV_MAX_IMPORT_MB, SETTING_MAX_IMPORT_MB) {
            let mb: u64 = parse_number(ENV_MAX_IMPORT_MB, &mb)?;
            config.max_import_bytes = mb.saturating_mul(1024 * 1024);
        }

        Ok(config)
    }

    /// Private directory holding imported model files
    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    /// Staging area for imports in progress
    pub fn temp_dir(&self) -> PathBuf {
        self.data_dir.join("tmp")
    }

    /// Save the tunables to the database
    pub fn save(&self, db: &Database) -> Result<()> {
        if let Some(ref dir) = self.bundle_dir {
            db.set_setting(SETTING_BUNDLE_DIR, &dir.to_string_lossy())?;
        }
        db.set_setting(SETTING_ERROR_HISTORY, &self.error_history_cap.to_string())?;
        db.set_setting(
            SETTING_TEARDOWN_DELAY_MS,
            &self.teardown_delay.as_millis().to_string(),
        )?;
        db.set_setting(
            SETTING_MAX_IMPORT_MB,
            &(self.max_import_bytes / (1024 * 1024)).to_string(),
        )?;
        Ok(())
    }

    /// Clear stored tunables from the database
    pub fn clear(db: &Database) -> Result<()> {
        for key in [
            SETTING_BUNDLE_DIR,
            SETTING_ERROR_HISTORY,
            SETTING_TEARDOWN_DELAY_MS,
            SETTING_MAX_IMPORT_MB,
        ] {
            if let Err(e) = db.delete_setting(key) {
                warn!(setting = key, "could not clear setting: {}", e);
            }
        }
        Ok(())
    }
}

/// Data directory from the environment or the platform default
pub fn resolve_data_dir() -> Result<PathBuf> {
    match env::var(ENV_DATA_DIR) {
        Ok(dir) => Ok(PathBuf::from(dir)),
        Err(_) => default_data_dir(),
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let dir = dirs::data_dir().ok_or_else(|| anyhow!("Could not find data directory"))?;
    Ok(dir.join("pocketchat"))
}

fn default_bundle_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("models")))
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be a number, got '{}'", name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let db = Database::open_memory().unwrap();
        let config = AppConfig::load_with(&db, env_of(&[(ENV_DATA_DIR, "/tmp/pc")])).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/pc"));
        assert_eq!(config.models_dir(), PathBuf::from("/tmp/pc/models"));
        assert_eq!(config.temp_dir(), PathBuf::from("/tmp/pc/tmp"));
        assert_eq!(config.error_history_cap, DEFAULT_HISTORY_CAP);
        assert_eq!(config.teardown_delay, Duration::from_millis(250));
        assert_eq!(config.max_import_bytes, 16 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_env_wins_over_database() {
        let db = Database::open_memory().unwrap();
        db.set_setting(SETTING_TEARDOWN_DELAY_MS, "900").unwrap();
        db.set_setting(SETTING_ERROR_HISTORY, "20").unwrap();

        let config = AppConfig::load_with(
            &db,
            env_of(&[(ENV_DATA_DIR, "/d"), (ENV_TEARDOWN_DELAY_MS, "10")]),
        )
        .unwrap();

        assert_eq!(config.teardown_delay, Duration::from_millis(10));
        assert_eq!(config.error_history_cap, 20);
    }

    #[test]
    fn test_bad_number_rejected() {
        let db = Database::open_memory().unwrap();
        let result = AppConfig::load_with(
            &db,
            env_of(&[(ENV_DATA_DIR, "/d"), (ENV_MAX_IMPORT_MB, "lots")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_clear() {
        let db = Database::open_memory().unwrap();
        let mut config = AppConfig::with_data_dir(PathBuf::from("/d"));
        config.bundle_dir = Some(PathBuf::from("/bundle"));
        config.error_history_cap = 7;
        config.save(&db).unwrap();

        let loaded = AppConfig::load_with(&db, env_of(&[(ENV_DATA_DIR, "/d")])).unwrap();
        assert_eq!(loaded, config);

        AppConfig::clear(&db).unwrap();
        assert_eq!(db.get_setting(SETTING_ERROR_HISTORY).unwrap(), None);
    }
}

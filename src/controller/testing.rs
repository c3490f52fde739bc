//! Shared fixture for controller and recovery tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use super::ModelController;
use crate::config::AppConfig;
use crate::db::Database;
use crate::engine::fake::FakeEngine;
use crate::error::{ErrorManager, FixedContext};
use crate::models::{ModelConfig, StoredModelRecord, Template, TemplateType};
use crate::recovery::PlatformHost;

pub(crate) fn gguf_bytes(tag: &str) -> Vec<u8> {
    let mut bytes = b"GGUF\x03\x00\x00\x00".to_vec();
    bytes.extend_from_slice(tag.as_bytes());
    bytes
}

pub(crate) struct Fixture {
    pub dir: TempDir,
    pub engine: FakeEngine,
    pub errors: Arc<ErrorManager>,
    pub config: AppConfig,
    pub bundled: Vec<ModelConfig>,
}

impl Fixture {
    /// Bundle directory populated with one file per name
    pub fn new(bundled: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::with_data_dir(dir.path().join("data"));
        config.bundle_dir = Some(dir.path().join("bundle"));
        config.teardown_delay = Duration::ZERO;

        std::fs::create_dir_all(dir.path().join("bundle")).unwrap();
        std::fs::create_dir_all(dir.path().join("sources")).unwrap();
        for name in bundled {
            std::fs::write(dir.path().join("bundle").join(name), gguf_bytes(name)).unwrap();
        }

        let bundled = bundled
            .iter()
            .map(|name| {
                ModelConfig::bundled(
                    name,
                    &name.to_uppercase(),
                    Template::new(TemplateType::ChatMl, None),
                )
            })
            .collect();

        Self {
            dir,
            engine: FakeEngine::new(),
            errors: Arc::new(ErrorManager::new(Box::new(FixedContext))),
            config,
            bundled,
        }
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.dir.path().join("bundle")
    }

    pub fn controller(&self, db: Database) -> ModelController {
        ModelController::new(
            &self.config,
            db,
            Arc::new(self.engine.clone()),
            Arc::clone(&self.errors),
        )
        .with_bundled(self.bundled.clone())
    }

    pub async fn ready_controller(&self) -> ModelController {
        let mut controller = self.controller(Database::open_memory().unwrap());
        controller.initialize().await.unwrap();
        controller
    }

    /// Place a model file directly in private storage
    pub fn write_user_model(&self, filename: &str) {
        let dir = self.config.models_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(filename), gguf_bytes(filename)).unwrap();
    }

    /// A file outside private storage, as handed over for import
    pub fn source_file(&self, filename: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join("sources").join(filename);
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn record(filename: &str) -> StoredModelRecord {
        StoredModelRecord {
            filename: filename.to_string(),
            display_name: filename.to_string(),
            template_type: TemplateType::ChatMl,
            system_prompt: None,
        }
    }
}

/// Host whose surfaces always open
pub(crate) struct NoHost;

impl PlatformHost for NoHost {
    fn open_settings(&self) -> Result<(), String> {
        Ok(())
    }
    fn open_system_update(&self) -> Result<(), String> {
        Ok(())
    }
    fn contact_support(&self) -> Result<(), String> {
        Ok(())
    }
}

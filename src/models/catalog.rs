//! Bundled model catalog
//!
//! Models shipped with the application. Their weights are looked up in the
//! bundle directory by filename at load time; they cannot be deleted.

use super::model_config::{ModelConfig, Template, TemplateType};
use std::sync::LazyLock;

/// Static description of a shipped model
#[derive(Debug, Clone)]
pub struct BundledModel {
    pub filename: &'static str,
    pub display_name: &'static str,
    pub template_type: TemplateType,
    pub system_prompt: Option<&'static str>,
    /// Approximate file size, shown in the model list
    pub size_description: &'static str,
}

impl BundledModel {
    pub fn config(&self) -> ModelConfig {
        ModelConfig::bundled(
            self.filename,
            self.display_name,
            Template::new(self.template_type, self.system_prompt.map(String::from)),
        )
    }
}

pub static BUNDLED_MODELS: LazyLock<Vec<BundledModel>> = LazyLock::new(|| {
    vec![
        BundledModel {
            filename: "qwen2.5-0.5b-instruct-q4_k_m.gguf",
            display_name: "Qwen 2.5 0.5B",
            template_type: TemplateType::ChatMl,
            system_prompt: Some("You are a helpful assistant."),
            size_description: "~400 MB",
        },
        BundledModel {
            filename: "Llama-3.2-1B-Instruct-Q4_K_M.gguf",
            display_name: "Llama 3.2 1B",
            template_type: TemplateType::Llama3,
            system_prompt: Some("You are a helpful assistant."),
            size_description: "~800 MB",
        },
    ]
});

/// Fresh configs for every bundled model, in catalog order
pub fn bundled_configs() -> Vec<ModelConfig> {
    BUNDLED_MODELS.iter().map(BundledModel::config).collect()
}

pub fn find_bundled(filename: &str) -> Option<&'static BundledModel> {
    BUNDLED_MODELS.iter().find(|m| m.filename == filename)
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prompt-formatting family of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    #[default]
    ChatMl,
    Llama3,
    Gemma,
    Phi3,
    Mistral,
    Alpaca,
}

impl TemplateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatMl => "chatml",
            Self::Llama3 => "llama3",
            Self::Gemma => "gemma",
            Self::Phi3 => "phi3",
            Self::Mistral => "mistral",
            Self::Alpaca => "alpaca",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "chatml" | "qwen" => Some(Self::ChatMl),
            "llama3" | "llama-3" | "llama" => Some(Self::Llama3),
            "gemma" => Some(Self::Gemma),
            "phi3" | "phi-3" | "phi" => Some(Self::Phi3),
            "mistral" => Some(Self::Mistral),
            "alpaca" => Some(Self::Alpaca),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ChatMl => "ChatML (Qwen, Hermes)",
            Self::Llama3 => "Llama 3",
            Self::Gemma => "Gemma",
            Self::Phi3 => "Phi-3",
            Self::Mistral => "Mistral Instruct",
            Self::Alpaca => "Alpaca",
        }
    }

    pub fn all() -> &'static [TemplateType] {
        &[
            Self::ChatMl,
            Self::Llama3,
            Self::Gemma,
            Self::Phi3,
            Self::Mistral,
            Self::Alpaca,
        ]
    }
}

impl std::fmt::Display for TemplateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Template descriptor handed to the inference engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub template_type: TemplateType,
    pub system_prompt: Option<String>,
}

impl Template {
    pub fn new(template_type: TemplateType, system_prompt: Option<String>) -> Self {
        Self {
            template_type,
            system_prompt: system_prompt.filter(|p| !p.trim().is_empty()),
        }
    }
}

/// Where a model's weights come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelOrigin {
    /// Shipped with the application; resolved from the bundle directory at load time
    Bundled,
    /// Copied into private storage by the user
    Imported { path: PathBuf },
}

/// One loadable model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub id: String,
    /// Technical name, the filename without extension
    pub name: String,
    pub filename: String,
    pub template: Template,
    pub display_name: String,
    pub origin: ModelOrigin,
}

impl ModelConfig {
    pub fn bundled(filename: &str, display_name: &str, template: Template) -> Self {
        Self {
            id: format!("bundled:{}", filename),
            name: file_stem(filename),
            filename: filename.to_string(),
            template,
            display_name: display_name.to_string(),
            origin: ModelOrigin::Bundled,
        }
    }

    /// Rebuild a user model from its stored record and the private models directory
    pub fn from_record(record: &StoredModelRecord, models_dir: &Path) -> Self {
        Self {
            id: format!("user:{}", record.filename),
            name: file_stem(&record.filename),
            filename: record.filename.clone(),
            template: Template::new(record.template_type, record.system_prompt.clone()),
            display_name: record.display_name.clone(),
            origin: ModelOrigin::Imported {
                path: models_dir.join(&record.filename),
            },
        }
    }

    pub fn is_bundled(&self) -> bool {
        matches!(self.origin, ModelOrigin::Bundled)
    }

    /// Stored location; only imported models have one
    pub fn location(&self) -> Option<&Path> {
        match &self.origin {
            ModelOrigin::Bundled => None,
            ModelOrigin::Imported { path } => Some(path),
        }
    }

    /// Durable projection, `None` for bundled models
    pub fn to_record(&self) -> Option<StoredModelRecord> {
        if self.is_bundled() {
            return None;
        }
        Some(StoredModelRecord {
            filename: self.filename.clone(),
            display_name: self.display_name.clone(),
            template_type: self.template.template_type,
            system_prompt: self.template.system_prompt.clone(),
        })
    }
}

/// Durable record of a user-imported model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredModelRecord {
    pub filename: String,
    pub display_name: String,
    pub template_type: TemplateType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_string()
}

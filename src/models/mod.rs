pub mod catalog;
mod message;
mod model_config;
mod parameters;

pub use catalog::{bundled_configs, find_bundled, BundledModel, BUNDLED_MODELS};
pub use message::{ChatMessage, Conversation, MessageRole};
pub use model_config::{ModelConfig, ModelOrigin, StoredModelRecord, Template, TemplateType};
pub use parameters::{
    ModelParameters, CONTEXT_SIZE_RANGE, TEMPERATURE_RANGE, TOP_K_RANGE, TOP_P_RANGE,
};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const TEMPERATURE_RANGE: (f32, f32) = (0.0, 2.0);
pub const TOP_K_RANGE: (u32, u32) = (1, 200);
pub const TOP_P_RANGE: (f32, f32) = (0.05, 1.0);
pub const CONTEXT_SIZE_RANGE: (u32, u32) = (256, 32768);

/// Generation controls applied to the active session on demand
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    /// Context window in tokens
    pub context_size: u32,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.9,
            context_size: 2048,
        }
    }
}

impl ModelParameters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_f32("temperature", self.temperature, TEMPERATURE_RANGE)?;
        check_u32("top_k", self.top_k, TOP_K_RANGE)?;
        check_f32("top_p", self.top_p, TOP_P_RANGE)?;
        check_u32("context_size", self.context_size, CONTEXT_SIZE_RANGE)?;
        Ok(())
    }
}

fn check_f32(field: &str, value: f32, (min, max): (f32, f32)) -> Result<(), ValidationError> {
    // NaN fails both comparisons
    if value >= min && value <= max {
        return Ok(());
    }
    Err(ValidationError::OutOfRange {
        field: field.to_string(),
        value: value.to_string(),
        min: min.to_string(),
        max: max.to_string(),
    })
}

fn check_u32(field: &str, value: u32, (min, max): (u32, u32)) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        return Ok(());
    }
    Err(ValidationError::OutOfRange {
        field: field.to_string(),
        value: value.to_string(),
        min: min.to_string(),
        max: max.to_string(),
    })
}

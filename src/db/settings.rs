//! Key-value settings storage.

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::models::{ModelParameters, StoredModelRecord};

pub const SETTING_SELECTED_MODEL: &str = "selected_model_filename";
pub const SETTING_USER_MODEL_RECORDS: &str = "user_model_records";
pub const SETTING_MODEL_PARAMETERS: &str = "model_parameters";

impl Database {
    // ==================== RAW SETTINGS ====================

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM app_settings WHERE key = ?",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO app_settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Returns true if a row was removed
    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM app_settings WHERE key = ?", [key])?;
        Ok(rows > 0)
    }

    // ==================== SELECTED MODEL ====================

    pub fn selected_model(&self) -> Result<Option<String>> {
        self.get_setting(SETTING_SELECTED_MODEL)
    }

    pub fn set_selected_model(&self, filename: &str) -> Result<()> {
        self.set_setting(SETTING_SELECTED_MODEL, filename)
    }

    // ==================== USER MODEL RECORDS ====================

    /// Stored records in insertion order. A missing key is an empty list;
    /// an undecodable value is an error for the caller to downgrade.
    pub fn user_model_records(&self) -> Result<Vec<StoredModelRecord>> {
        match self.get_setting(SETTING_USER_MODEL_RECORDS)? {
            None => Ok(Vec::new()),
            Some(json) => serde_json::from_str(&json)
                .with_context(|| format!("Failed to decode {}", SETTING_USER_MODEL_RECORDS)),
        }
    }

    pub fn save_user_model_records(&self, records: &[StoredModelRecord]) -> Result<()> {
        let json = serde_json::to_string(records)?;
        self.set_setting(SETTING_USER_MODEL_RECORDS, &json)
    }

    pub fn clear_user_model_records(&self) -> Result<()> {
        self.delete_setting(SETTING_USER_MODEL_RECORDS)?;
        Ok(())
    }

    // ==================== MODEL PARAMETERS ====================

    pub fn model_parameters(&self) -> Result<Option<ModelParameters>> {
        match self.get_setting(SETTING_MODEL_PARAMETERS)? {
            None => Ok(None),
            Some(json) => {
                let params = serde_json::from_str(&json).with_context(|| {
                    format!("Failed to decode {}", SETTING_MODEL_PARAMETERS)
                })?;
                Ok(Some(params))
            }
        }
    }

    pub fn save_model_parameters(&self, params: &ModelParameters) -> Result<()> {
        let json = serde_json::to_string(params)?;
        self.set_setting(SETTING_MODEL_PARAMETERS, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TemplateType;

    fn record(filename: &str) -> StoredModelRecord {
        StoredModelRecord {
            filename: filename.to_string(),
            display_name: filename.to_uppercase(),
            template_type: TemplateType::ChatMl,
            system_prompt: None,
        }
    }

    #[test]
    fn test_setting_crud() {
        let db = Database::open_memory().unwrap();

        assert_eq!(db.get_setting("theme").unwrap(), None);

        db.set_setting("theme", "dark").unwrap();
        assert_eq!(db.get_setting("theme").unwrap(), Some("dark".to_string()));

        db.set_setting("theme", "light").unwrap();
        assert_eq!(db.get_setting("theme").unwrap(), Some("light".to_string()));

        assert!(db.delete_setting("theme").unwrap());
        assert!(!db.delete_setting("theme").unwrap());
        assert_eq!(db.get_setting("theme").unwrap(), None);
    }

    #[test]
    fn test_selected_model() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.selected_model().unwrap(), None);

        db.set_selected_model("a.gguf").unwrap();
        assert_eq!(db.selected_model().unwrap(), Some("a.gguf".to_string()));
    }

    #[test]
    fn test_user_records_roundtrip_in_order() {
        let db = Database::open_memory().unwrap();
        assert!(db.user_model_records().unwrap().is_empty());

        let records = vec![record("b.gguf"), record("a.gguf")];
        db.save_user_model_records(&records).unwrap();
        assert_eq!(db.user_model_records().unwrap(), records);

        db.clear_user_model_records().unwrap();
        assert!(db.user_model_records().unwrap().is_empty());
    }

    #[test]
    fn test_corrupted_records_are_an_error() {
        let db = Database::open_memory().unwrap();
        db.set_setting(SETTING_USER_MODEL_RECORDS, "[{broken").unwrap();
        assert!(db.user_model_records().is_err());
    }

    #[test]
    fn test_model_parameters() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.model_parameters().unwrap(), None);

        let params = ModelParameters {
            temperature: 1.1,
            ..ModelParameters::default()
        };
        db.save_model_parameters(&params).unwrap();
        assert_eq!(db.model_parameters().unwrap(), Some(params));

        db.set_setting(SETTING_MODEL_PARAMETERS, "nope").unwrap();
        assert!(db.model_parameters().is_err());
    }
}

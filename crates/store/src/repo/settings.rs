use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::repo::usage::{COUNT_KEY, MONTH_KEY};
use crate::{SETTINGS, Store, StoreError};

/// Keys whose values are secrets and are masked when settings are read back.
pub const SECRET_KEYS: &[&str] = &["streaming_api_key", "openai_api_key", "gemini_api_key"];

/// Known keys that only accept string values.
const STRING_KEYS: &[&str] = &[
    "streaming_api_key",
    "ai_provider",
    "openai_api_key",
    "gemini_api_key",
    "language",
];

/// Budget bookkeeping; never written through a settings patch.
const RESERVED_KEYS: &[&str] = &[COUNT_KEY, MONTH_KEY];

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("setting `{0}` must be a string")]
    NotAString(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

const MASK: &str = "********";

/// User-editable settings. Budget bookkeeping shares the document; keys
/// this struct does not know about are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub streaming_api_key: String,
    pub ai_provider: String,
    pub openai_api_key: String,
    pub gemini_api_key: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_usage_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reset_month: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            streaming_api_key: String::new(),
            ai_provider: "openai".to_string(),
            openai_api_key: String::new(),
            gemini_api_key: String::new(),
            language: "en".to_string(),
            api_usage_count: None,
            last_reset_month: None,
            extra: Map::new(),
        }
    }
}

#[derive(Clone)]
pub struct SettingsRepo {
    store: Store,
}

impl SettingsRepo {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> Result<Settings, StoreError> {
        let map = self.store.load_map(SETTINGS).await?;
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// Settings as a JSON object with secret values replaced by a mask.
    pub async fn load_masked(&self) -> Result<Map<String, Value>, StoreError> {
        let settings = self.load().await?;
        let Value::Object(mut map) = serde_json::to_value(&settings)? else {
            return Ok(Map::new());
        };
        for key in SECRET_KEYS {
            let has_value = map
                .get(*key)
                .and_then(Value::as_str)
                .is_some_and(|v| !v.is_empty());
            if has_value {
                map.insert((*key).to_string(), Value::String(MASK.to_string()));
            }
        }
        Ok(map)
    }

    /// Apply `patch`, skipping empty strings, nulls and the budget keys. A
    /// missing document is seeded with defaults first. A non-string value
    /// for a known string setting rejects the whole patch.
    pub async fn merge_non_empty(&self, patch: &Map<String, Value>) -> Result<(), SettingsError> {
        if let Some((key, _)) = patch
            .iter()
            .find(|(k, v)| STRING_KEYS.contains(&k.as_str()) && !v.is_null() && !v.is_string())
        {
            return Err(SettingsError::NotAString(key.clone()));
        }

        let defaults = match serde_json::to_value(Settings::default()).map_err(StoreError::from)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.store
            .update_map(SETTINGS, |current| {
                if current.is_empty() {
                    *current = defaults;
                }
                for (key, value) in patch {
                    if value.is_null()
                        || value.as_str() == Some("")
                        || RESERVED_KEYS.contains(&key.as_str())
                    {
                        continue;
                    }
                    current.insert(key.clone(), value.clone());
                }
            })
            .await?;
        Ok(())
    }
}

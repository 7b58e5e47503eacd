//! The flattened configuration snapshot bindings read from and write to.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    #[serde(default)]
    pub lang: String,
    pub text: String,
}

/// A configuration value as the provider hands it over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Text(String),
    Flag(bool),
    Number(serde_json::Number),
    Translations(Vec<Translation>),
}

impl ConfigValue {
    /// Text a bind variable reads. Translation lists read as their first
    /// entry's text.
    pub fn as_text(&self) -> String {
        match self {
            ConfigValue::Text(text) => text.clone(),
            ConfigValue::Flag(flag) => flag.to_string(),
            ConfigValue::Number(number) => number.to_string(),
            ConfigValue::Translations(list) => {
                list.first().map(|t| t.text.clone()).unwrap_or_default()
            }
        }
    }
}

impl Default for ConfigValue {
    fn default() -> Self {
        ConfigValue::Text(String::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedOption {
    pub id: String,
    #[serde(default)]
    pub extra_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEntry {
    pub container: String,
    pub key: String,
    #[serde(default)]
    pub value: ConfigValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<SelectedOption>,
}

impl ConfigEntry {
    pub fn new(container: impl Into<String>, key: impl Into<String>, value: ConfigValue) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
            value,
            selected_option: None,
        }
    }

    pub fn with_selected_option(mut self, option: SelectedOption) -> Self {
        self.selected_option = Some(option);
        self
    }
}

/// First entry matching `(container, key)` exactly.
pub fn find<'a>(entries: &'a [ConfigEntry], container: &str, key: &str) -> Option<&'a ConfigEntry> {
    entries
        .iter()
        .find(|e| e.container == container && e.key == key)
}

pub fn find_mut<'a>(
    entries: &'a mut [ConfigEntry],
    container: &str,
    key: &str,
) -> Option<&'a mut ConfigEntry> {
    entries
        .iter_mut()
        .find(|e| e.container == container && e.key == key)
}

/// Parse a snapshot from its JSON array form.
pub fn from_json(text: &str) -> Result<Vec<ConfigEntry>, serde_json::Error> {
    serde_json::from_str(text)
}

/// A snapshot shared between several binding executions. Each execution
/// holds the lock for its whole run.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig(Arc<Mutex<Vec<ConfigEntry>>>);

impl SharedConfig {
    pub fn new(entries: Vec<ConfigEntry>) -> Self {
        Self(Arc::new(Mutex::new(entries)))
    }

    pub fn lock(&self) -> MutexGuard<'_, Vec<ConfigEntry>> {
        self.0.lock()
    }

    pub fn snapshot(&self) -> Vec<ConfigEntry> {
        self.0.lock().clone()
    }
}

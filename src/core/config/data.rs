use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::completion::{ModelCategory, ModelInfo};

/// Default output budget for models declared without one.
pub const DEFAULT_MODEL_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CustomModel {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub category: ModelCategory,
}

impl CustomModel {
    pub fn to_model_info(&self) -> ModelInfo {
        ModelInfo {
            id: self.id.clone(),
            name: self.name.clone().unwrap_or_else(|| self.id.clone()),
            description: self.description.clone().unwrap_or_default(),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MODEL_MAX_TOKENS),
            category: self.category,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CustomProvider {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    #[serde(default)]
    pub models: Vec<CustomModel>,
}

/// Weekly send quotas. Unset values use the built-in defaults.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct LimitsConfig {
    pub standard: Option<u32>,
    pub premium: Option<u32>,
}

/// Streaming display cadence in milliseconds and graphemes.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct RendererConfig {
    pub debounce_ms: Option<u64>,
    pub frame_ms: Option<u64>,
    pub graphemes_per_frame: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    pub default_provider: Option<String>,
    #[serde(default)]
    pub default_models: HashMap<String, String>,
    #[serde(default)]
    pub custom_providers: Vec<CustomProvider>,
    /// UI theme name applied when no theme has been stored yet
    pub theme: Option<String>,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    /// Where conversations and attachments live; defaults to the platform data dir
    pub data_dir: Option<PathBuf>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    /// Adds or replaces a custom provider, matching ids case-insensitively.
    pub fn add_custom_provider(&mut self, provider: CustomProvider) {
        self.remove_custom_provider(&provider.id);
        self.custom_providers.push(provider);
    }

    pub fn remove_custom_provider(&mut self, id: &str) {
        self.custom_providers
            .retain(|p| !p.id.eq_ignore_ascii_case(id));
    }

    pub fn get_custom_provider(&self, id: &str) -> Option<&CustomProvider> {
        self.custom_providers
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(id))
    }
}

impl CustomProvider {
    pub fn new(id: String, display_name: String, base_url: String) -> Self {
        Self {
            id,
            display_name,
            base_url,
            models: Vec::new(),
        }
    }
}

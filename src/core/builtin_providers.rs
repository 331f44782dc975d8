//! Built-in provider catalog
//!
//! Providers and their models are read from the `builtin_providers.toml`
//! file embedded at build time.

use serde::{Deserialize, Serialize};

use crate::core::config::CustomModel;
use crate::core::completion::ModelInfo;

const CATALOG: &str = include_str!("../builtin_providers.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinProvider {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    pub default_model: Option<String>,
    #[serde(default)]
    pub models: Vec<CustomModel>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BuiltinProvidersConfig {
    providers: Vec<BuiltinProvider>,
}

impl BuiltinProvider {
    pub fn model_infos(&self) -> Vec<ModelInfo> {
        self.models.iter().map(CustomModel::to_model_info).collect()
    }
}

/// Load built-in providers from the embedded catalog
pub fn load_builtin_providers() -> Result<Vec<BuiltinProvider>, toml::de::Error> {
    let config: BuiltinProvidersConfig = toml::from_str(CATALOG)?;
    Ok(config.providers)
}

/// Find a built-in provider by ID (case-insensitive)
pub fn find_builtin_provider(id: &str) -> Option<BuiltinProvider> {
    load_builtin_providers()
        .ok()?
        .into_iter()
        .find(|p| p.id.eq_ignore_ascii_case(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::completion::ModelCategory;

    #[test]
    fn test_load_builtin_providers() {
        let providers = load_builtin_providers().expect("embedded catalog parses");
        let ids: Vec<&str> = providers.iter().map(|p| p.id.as_str()).collect();
        assert!(ids.contains(&"openai"));
        assert!(ids.contains(&"openrouter"));
    }

    #[test]
    fn test_find_builtin_provider_is_case_insensitive() {
        let provider = find_builtin_provider("OpenRouter").expect("openrouter present");
        assert_eq!(provider.id, "openrouter");
        assert!(find_builtin_provider("nonexistent").is_none());
    }

    #[test]
    fn test_catalog_entries_are_complete() {
        for provider in load_builtin_providers().unwrap() {
            assert!(provider.base_url.starts_with("https://"));
            assert!(!provider.models.is_empty(), "{} has no models", provider.id);
            if let Some(default) = &provider.default_model {
                assert!(
                    provider.models.iter().any(|m| &m.id == default),
                    "{} default model missing from catalog",
                    provider.id
                );
            }
        }
    }

    #[test]
    fn test_catalog_has_both_tiers() {
        let infos: Vec<ModelInfo> = load_builtin_providers()
            .unwrap()
            .iter()
            .flat_map(BuiltinProvider::model_infos)
            .collect();
        assert!(infos.iter().any(|m| m.category == ModelCategory::Standard));
        assert!(infos.iter().any(|m| m.category == ModelCategory::Premium));
    }
}

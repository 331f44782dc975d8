//! Turns the built-in catalog, custom providers and stored credentials into
//! registered completion providers.

use tracing::{debug, warn};

use crate::core::builtin_providers::load_builtin_providers;
use crate::core::completion::openai::OpenAiCompatibleProvider;
use crate::core::completion::{CompletionClient, ModelInfo};
use crate::core::config::{Config, CustomModel};
use crate::core::keyring::{
    CredentialSource, CredentialStore, KeyringAccessError, ResolvedCredential,
};
use crate::utils::url::normalize_base_url;

/// Provider that environment keys fall back to when no default is configured.
pub const DEFAULT_PROVIDER: &str = "openai";

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDefinition {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    pub default_model: Option<String>,
    pub models: Vec<ModelInfo>,
}

impl ProviderDefinition {
    /// Model to select when the user has not picked one.
    pub fn preferred_model(&self) -> Option<&str> {
        self.default_model
            .as_deref()
            .filter(|id| self.models.iter().any(|m| m.id == *id))
            .or_else(|| self.models.first().map(|m| m.id.as_str()))
    }
}

/// Built-in providers followed by custom ones; a custom provider with a
/// built-in id replaces it.
pub fn provider_definitions(config: &Config) -> Result<Vec<ProviderDefinition>, toml::de::Error> {
    let mut definitions: Vec<ProviderDefinition> = load_builtin_providers()?
        .into_iter()
        .map(|builtin| ProviderDefinition {
            models: builtin.model_infos(),
            id: builtin.id,
            display_name: builtin.display_name,
            base_url: builtin.base_url,
            default_model: builtin.default_model,
        })
        .collect();

    for custom in &config.custom_providers {
        definitions.retain(|d| !d.id.eq_ignore_ascii_case(&custom.id));
        definitions.push(ProviderDefinition {
            id: custom.id.clone(),
            display_name: custom.display_name.clone(),
            base_url: normalize_base_url(&custom.base_url),
            default_model: None,
            models: custom.models.iter().map(CustomModel::to_model_info).collect(),
        });
    }
    Ok(definitions)
}

pub fn find_definition<'a>(
    definitions: &'a [ProviderDefinition],
    id: &str,
) -> Option<&'a ProviderDefinition> {
    definitions.iter().find(|d| d.id.eq_ignore_ascii_case(id))
}

/// Registers every provider with a usable credential and returns their ids.
/// Environment keys only apply to `fallback_provider`.
pub fn register_providers<F>(
    client: &mut CompletionClient,
    definitions: &[ProviderDefinition],
    credentials: &CredentialStore,
    fallback_provider: &str,
    env: F,
) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut registered = Vec::new();
    for definition in definitions {
        let lookup: Result<Option<ResolvedCredential>, KeyringAccessError> =
            if definition.id.eq_ignore_ascii_case(fallback_provider) {
                credentials.resolve_with(&definition.id, &env)
            } else {
                credentials.get_token(&definition.id).map(|token| {
                    token.map(|api_key| ResolvedCredential {
                        api_key,
                        source: CredentialSource::Keyring,
                    })
                })
            };

        match lookup {
            Ok(Some(credential)) => {
                debug!(provider = %definition.id, source = ?credential.source, "using credential");
                client.register_provider(Box::new(OpenAiCompatibleProvider::new(
                    definition.id.clone(),
                    definition.base_url.clone(),
                    credential.api_key,
                    definition.models.clone(),
                )));
                registered.push(definition.id.clone());
            }
            Ok(None) => debug!(provider = %definition.id, "no credential; skipping"),
            Err(err) => warn!(provider = %definition.id, "keyring lookup failed: {err}"),
        }
    }
    registered
}

/// Provider and model to activate when nothing valid was persisted.
pub fn initial_selection(
    config: &Config,
    definitions: &[ProviderDefinition],
    registered: &[String],
) -> Option<(String, String)> {
    let preferred = config
        .default_provider
        .as_deref()
        .and_then(|id| registered.iter().find(|r| r.eq_ignore_ascii_case(id)));

    // Providers without any model (a fresh custom one) are skipped.
    preferred.into_iter().chain(registered).find_map(|provider_id| {
        let definition = find_definition(definitions, provider_id)?;
        let model = config
            .get_default_model(provider_id)
            .filter(|id| definition.models.iter().any(|m| &m.id == *id))
            .map(String::as_str)
            .or_else(|| definition.preferred_model())?;
        Some((definition.id.clone(), model.to_string()))
    })
}

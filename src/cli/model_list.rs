//! Model listing
//!
//! Prints every known provider with its model catalog, marking which
//! providers have a stored key and which model is the configured default.

use std::error::Error;

use tracing::warn;

use crate::core::completion::{ModelCategory, ModelInfo};
use crate::core::config::Config;
use crate::core::keyring::CredentialStore;
use crate::core::providers::{provider_definitions, ProviderDefinition, DEFAULT_PROVIDER};

pub fn list_models(config: &Config, credentials: &CredentialStore) -> Result<(), Box<dyn Error>> {
    let definitions = provider_definitions(config)?;
    let default_provider = config
        .default_provider
        .as_deref()
        .unwrap_or(DEFAULT_PROVIDER);

    println!("🤖 Available Models");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for definition in &definitions {
        let has_key = match credentials.get_token(&definition.id) {
            Ok(token) => token.is_some(),
            Err(err) => {
                warn!(provider = %definition.id, "keyring lookup failed: {err}");
                false
            }
        };
        let is_default = definition.id.eq_ignore_ascii_case(default_provider);
        println!();
        println!("{}", provider_heading(definition, has_key, is_default));

        if definition.models.is_empty() {
            println!("  (no models configured)");
            continue;
        }
        let default_model = config
            .get_default_model(&definition.id)
            .map(String::as_str)
            .or_else(|| definition.preferred_model());
        for model in &definition.models {
            println!(
                "{}",
                model_line(model, default_model == Some(model.id.as_str()))
            );
        }
    }
    Ok(())
}

fn provider_heading(definition: &ProviderDefinition, has_key: bool, is_default: bool) -> String {
    let mut heading = format!("{} ({})", definition.display_name, definition.id);
    if is_default {
        heading.push_str(" [default]");
    }
    heading.push_str(if has_key { " 🔑" } else { " (no key)" });
    heading
}

fn model_line(model: &ModelInfo, is_default: bool) -> String {
    let marker = if is_default { '*' } else { '•' };
    let premium = match model.category {
        ModelCategory::Premium => " [premium]",
        ModelCategory::Standard => "",
    };
    let mut line = format!("  {marker} {}{premium}", model.id);
    if !model.name.is_empty() && model.name != model.id {
        line.push_str(&format!("  {}", model.name));
    }
    line
}

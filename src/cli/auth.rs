//! `auth` and `deauth`: manage provider API keys in the system keyring.
//!
//! An unknown provider id is set up as a custom provider: its display name
//! and base URL are prompted for and saved to the config file.

use std::error::Error;
use std::io::{self, BufRead, Write};

use crate::core::config::{Config, CustomProvider};
use crate::core::keyring::CredentialStore;
use crate::core::providers::{find_definition, provider_definitions};
use crate::utils::url::validate_base_url;

pub fn run_auth(
    mut config: Config,
    credentials: &CredentialStore,
    provider: &str,
) -> Result<(), Box<dyn Error>> {
    let provider = provider.trim();
    if provider.is_empty() {
        return Err("Provider id cannot be empty".into());
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let definitions = provider_definitions(&config)?;

    let (provider_id, display_name) = match find_definition(&definitions, provider) {
        Some(definition) => (definition.id.clone(), definition.display_name.clone()),
        None => {
            println!("'{provider}' is not a known provider; setting it up as a custom one.");
            let display_name = prompt(&mut input, "Display name", Some(provider))?;
            let base_url = prompt(
                &mut input,
                "API base URL (typically https://some-url.example/api/v1)",
                None,
            )?;
            let base_url = validate_base_url(&base_url)?;
            config.add_custom_provider(CustomProvider::new(
                provider.to_string(),
                display_name.clone(),
                base_url,
            ));
            config.save()?;
            (provider.to_string(), display_name)
        }
    };

    println!("Selected provider: {display_name}");
    let token = prompt(&mut input, "API key", None)?;
    credentials.store_token(&provider_id, &token)?;
    println!("✅ Stored API key for {display_name} ({provider_id})");
    Ok(())
}

pub fn run_deauth(credentials: &CredentialStore, provider: &str) -> Result<(), Box<dyn Error>> {
    credentials.remove_token(provider.trim())?;
    println!("✅ Removed API key for {}", provider.trim());
    Ok(())
}

/// Reads one trimmed line. An empty answer takes `default`, or is an error
/// when there is none.
fn prompt<R: BufRead>(
    input: &mut R,
    label: &str,
    default: Option<&str>,
) -> Result<String, Box<dyn Error>> {
    match default {
        Some(default) => print!("{label} [default: {default}]: "),
        None => print!("{label}: "),
    }
    io::stdout().flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim();
    match (answer.is_empty(), default) {
        (false, _) => Ok(answer.to_string()),
        (true, Some(default)) => Ok(default.to_string()),
        (true, None) => Err(format!("{label} cannot be empty").into()),
    }
}

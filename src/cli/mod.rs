//! Command-line interface parsing and handling
//!
//! This module parses arguments, wires configuration, credentials and
//! storage into a [`ChatContext`], then runs the requested command.

pub mod auth;
pub mod conversation_list;
pub mod model_list;
pub mod say;

use std::error::Error;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::auth::{run_auth, run_deauth};
use crate::cli::conversation_list::list_conversations;
use crate::cli::model_list::list_models;
use crate::cli::say::run_say;
use crate::core::completion::CompletionClient;
use crate::core::config::Config;
use crate::core::context::ChatContext;
use crate::core::keyring::{CredentialStore, API_KEY_ENV_VARS};
use crate::core::providers::{
    find_definition, initial_selection, provider_definitions, register_providers, ProviderDefinition,
    DEFAULT_PROVIDER,
};
use crate::core::storage::{keys, FileBlobStore, FileKeyValueStore, KeyValueStore};
use crate::core::store::StoreAction;
use crate::ui::chat_loop::run_chat;

const LOG_ENV_VAR: &str = "CHATDESK_LOG";

#[derive(Parser)]
#[command(name = "chatdesk")]
#[command(about = "A terminal chat client with persistent conversations")]
#[command(
    long_about = "chatdesk keeps conversations on disk, streams replies from OpenAI-compatible \
providers and enforces weekly standard and premium quotas.\n\n\
Authentication:\n\
  Use 'chatdesk auth <provider>' to store an API key in your system keyring.\n\n\
Environment Variables (fallback for the default provider):\n\
  CHATDESK_API_KEY  API key for the default provider\n\
  OPENAI_API_KEY    Used when CHATDESK_API_KEY is not set\n\
  CHATDESK_LOG      Log filter, e.g. 'debug' or 'chatdesk=trace' (default 'warn')\n\n\
Commands inside chat:\n\
  /help             List slash commands\n\
  /retry            Resend the last message that failed\n\
  /quit             Leave chatdesk"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Provider to use for this session
    #[arg(short = 'p', long, global = true, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Model to use for this session
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Ignore the keyring and read API keys from the environment only
    #[arg(long, global = true)]
    pub env_only: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// Send one prompt and stream the reply to stdout
    Say {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// List providers and their models
    Models,
    /// List saved conversations
    Conversations,
    /// Store an API key for a provider in the system keyring
    Auth {
        provider: String,
    },
    /// Remove the stored API key for a provider
    Deauth {
        provider: String,
    },
    /// Set configuration values
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set for the key (default-model takes "<provider> <model>")
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
        /// Provider, for default-model
        value: Option<String>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let args = Args::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main(args))
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let credentials = if args.env_only {
        CredentialStore::env_only()
    } else {
        CredentialStore::new()
    };

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let config = Config::load()?;
            let ctx = bootstrap(&config, &credentials, args.provider, args.model)?;
            run_chat(ctx, config.render_cadence()).await
        }
        Commands::Say { prompt } => {
            let config = Config::load()?;
            let prompt = prompt.join(" ");
            if prompt.trim().is_empty() {
                return Err("Usage: chatdesk say <prompt>".into());
            }
            let ctx = bootstrap(&config, &credentials, args.provider, args.model)?;
            run_say(ctx, prompt, config.render_cadence()).await
        }
        Commands::Models => {
            let config = Config::load()?;
            list_models(&config, &credentials)
        }
        Commands::Conversations => {
            let config = Config::load()?;
            list_conversations(&config)
        }
        Commands::Auth { provider } => run_auth(Config::load()?, &credentials, &provider),
        Commands::Deauth { provider } => run_deauth(&credentials, &provider),
        Commands::Set { key, value } => set_config_value(&key, &value),
        Commands::Unset { key, value } => unset_config_value(&key, value.as_deref()),
    }
}

/// Opens storage under the data directory, registers every provider with a
/// usable key and picks the model for this session.
pub fn bootstrap(
    config: &Config,
    credentials: &CredentialStore,
    provider: Option<String>,
    model: Option<String>,
) -> Result<ChatContext, Box<dyn Error>> {
    let data_dir = config.data_dir()?;
    let storage = Rc::new(FileKeyValueStore::open(data_dir.join("state.json"))?);
    let blobs = Rc::new(FileBlobStore::open(data_dir.join("attachments"))?);
    let theme_stored = matches!(storage.get(keys::THEME), Ok(Some(_)));

    let definitions = provider_definitions(config)?;
    let fallback = provider
        .clone()
        .or_else(|| config.default_provider.clone())
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

    let mut client = CompletionClient::new(storage.clone());
    let registered = register_providers(
        &mut client,
        &definitions,
        credentials,
        &fallback,
        |name| std::env::var(name).ok(),
    );
    if registered.is_empty() {
        return Err(format!(
            "No API key found. Run 'chatdesk auth {fallback}' or set {}.",
            API_KEY_ENV_VARS.join(" or ")
        )
        .into());
    }

    let mut ctx = ChatContext::new(storage, blobs, client, config.usage_limits());
    apply_selection(&mut ctx, config, &definitions, &registered, provider, model)?;

    // The config theme only seeds a fresh install; a stored choice wins.
    if let (Some(theme), false) = (&config.theme, theme_stored) {
        ctx.store_mut()
            .dispatch(StoreAction::SetTheme(theme.clone()))?;
    }
    Ok(ctx)
}

fn apply_selection(
    ctx: &mut ChatContext,
    config: &Config,
    definitions: &[ProviderDefinition],
    registered: &[String],
    provider: Option<String>,
    model: Option<String>,
) -> Result<(), Box<dyn Error>> {
    match (provider, model) {
        (Some(provider), Some(model)) => {
            ctx.select_model(&provider, &model, None)?;
        }
        (Some(provider), None) => {
            let definition = find_definition(definitions, &provider)
                .ok_or_else(|| format!("Unknown provider '{provider}'"))?;
            let model = config
                .get_default_model(&definition.id)
                .map(String::as_str)
                .or_else(|| definition.preferred_model())
                .ok_or_else(|| format!("Provider '{provider}' has no models"))?
                .to_string();
            ctx.select_model(&definition.id, &model, None)?;
        }
        (None, Some(model)) => {
            let provider = ctx
                .client()
                .active_selection()
                .map(|s| s.provider.clone())
                .or_else(|| initial_selection(config, definitions, registered).map(|(p, _)| p))
                .ok_or("No provider available for the requested model")?;
            ctx.select_model(&provider, &model, None)?;
        }
        (None, None) => {
            if ctx.client().active_selection().is_none() {
                if let Some((provider, model)) = initial_selection(config, definitions, registered)
                {
                    ctx.select_model(&provider, &model, None)?;
                }
            }
        }
    }
    Ok(())
}

fn set_config_value(key: &str, value: &[String]) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;
    if value.is_empty() {
        config.print_all();
        return Ok(());
    }
    match key {
        "default-provider" => {
            let provider = value.join(" ");
            config.default_provider = Some(provider.clone());
            config.save()?;
            println!("✅ Set default-provider to: {provider}");
        }
        "default-model" => match value {
            [provider, model] => {
                config.set_default_model(provider.clone(), model.clone());
                config.save()?;
                println!("✅ Set default-model for provider '{provider}' to: {model}");
            }
            _ => {
                eprintln!("⚠️  To set a default model, specify the provider and model:");
                eprintln!("Example: chatdesk set default-model openai gpt-4o-mini");
            }
        },
        "theme" => {
            let theme = value.join(" ");
            config.theme = Some(theme.clone());
            config.save()?;
            println!("✅ Set theme to: {theme}");
        }
        _ => return Err(format!("Unknown config key: {key}").into()),
    }
    Ok(())
}

fn unset_config_value(key: &str, value: Option<&str>) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;
    match key {
        "default-provider" => {
            config.default_provider = None;
            config.save()?;
            println!("✅ Unset default-provider");
        }
        "default-model" => match value {
            Some(provider) => {
                config.unset_default_model(provider);
                config.save()?;
                println!("✅ Unset default-model for provider: {provider}");
            }
            None => {
                eprintln!("⚠️  To unset a default model, specify the provider:");
                eprintln!("Example: chatdesk unset default-model openai");
            }
        },
        "theme" => {
            config.theme = None;
            config.save()?;
            println!("✅ Unset theme");
        }
        _ => return Err(format!("Unknown config key: {key}").into()),
    }
    Ok(())
}

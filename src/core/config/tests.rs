use super::data::{path_display, Config, CustomModel, CustomProvider};
use super::io::ConfigError;
use crate::core::completion::ModelCategory;
use crate::core::session::UsageLimits;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
    assert_eq!(config.usage_limits(), UsageLimits::default());
}

#[test]
fn test_config_persistence_lifecycle() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut config = Config {
        default_provider: Some("openrouter".to_string()),
        theme: Some("light".to_string()),
        ..Default::default()
    };
    config.set_default_model("OpenRouter".to_string(), "openai/gpt-4o".to_string());
    config
        .save_to_path(&config_path)
        .expect("Failed to save config");

    let mut loaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(loaded, config);
    assert_eq!(
        loaded.get_default_model("OPENROUTER").map(String::as_str),
        Some("openai/gpt-4o")
    );

    loaded.unset_default_model("openrouter");
    loaded.default_provider = None;
    loaded
        .save_to_path(&config_path)
        .expect("Failed to save config");
    let reloaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert!(reloaded.default_models.is_empty());
    assert_eq!(reloaded.default_provider, None);
}

#[test]
fn test_parse_error_names_the_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "default_provider = [").expect("write failed");

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config"));
}

#[test]
fn test_directory_in_place_of_file_is_a_read_and_write_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::create_dir(&config_path).expect("mkdir failed");

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));

    let err = Config::default().save_to_path(&config_path).unwrap_err();
    assert!(matches!(err, ConfigError::Write { .. }));
    assert!(err.to_string().contains("Failed to write config"));
}

#[test]
fn test_custom_providers_with_models_from_toml() {
    let config: Config = toml::from_str(
        r#"
        [limits]
        standard = 50

        [renderer]
        debounce_ms = 10
        graphemes_per_frame = 0

        [[custom_providers]]
        id = "local"
        display_name = "Local"
        base_url = "http://localhost:8080/v1"

        [[custom_providers.models]]
        id = "llama"
        max_tokens = 8192

        [[custom_providers.models]]
        id = "big"
        name = "Big Model"
        category = "premium"
        "#,
    )
    .expect("parse failed");

    let provider = config.get_custom_provider("LOCAL").expect("provider missing");
    let infos: Vec<_> = provider.models.iter().map(CustomModel::to_model_info).collect();
    assert_eq!(infos[0].name, "llama");
    assert_eq!(infos[0].max_tokens, 8192);
    assert_eq!(infos[0].category, ModelCategory::Standard);
    assert_eq!(infos[1].name, "Big Model");
    assert_eq!(infos[1].category, ModelCategory::Premium);

    let limits = config.usage_limits();
    assert_eq!(limits.standard, 50);
    assert_eq!(limits.premium, UsageLimits::default().premium);

    let cadence = config.render_cadence();
    assert_eq!(cadence.debounce, Duration::from_millis(10));
    assert_eq!(cadence.frame, Duration::from_millis(16));
    assert_eq!(cadence.graphemes_per_frame, 3);
}

#[test]
fn test_add_custom_provider_replaces_same_id() {
    let mut config = Config::default();
    config.add_custom_provider(CustomProvider::new(
        "local".to_string(),
        "Local".to_string(),
        "http://a".to_string(),
    ));
    config.add_custom_provider(CustomProvider::new(
        "LOCAL".to_string(),
        "Local 2".to_string(),
        "http://b".to_string(),
    ));
    assert_eq!(config.custom_providers.len(), 1);
    assert_eq!(config.custom_providers[0].base_url, "http://b");

    config.remove_custom_provider("local");
    assert!(config.get_custom_provider("local").is_none());
}

#[cfg(unix)]
#[test]
fn test_path_display_uses_tilde_under_home() {
    if let Some(home) = std::env::var_os("HOME") {
        let path = std::path::PathBuf::from(home).join(".config/chatdesk");
        assert_eq!(path_display(&path), "~/.config/chatdesk");
    }
}

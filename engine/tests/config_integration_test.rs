//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be properly loaded,
//! validated, and processed with path expansion and canonicalization.

use ross_engine::conductor::RunSettings;
use ross_engine::config::Config;
use std::time::Duration;
use tempfile::TempDir;

fn full_toml(data_dir: &str) -> String {
    format!(
        r#"
[core]
log_level = "debug"
data_dir = {data_dir:?}

[llm]
default_provider = "ollama"
timeout_secs = 60

[llm.openai]
base_url = "https://api.openai.com/v1"
model = "gpt-4o-mini"
temperature = 0.2

[llm.ollama]
base_url = "http://localhost:11434"
model = "qwen2.5:7b"

[search]
provider = "tavily"
timeout_secs = 10

[search.tavily]
max_results = 8
search_depth = "advanced"

[server]
host = "0.0.0.0"
port = 9000
allowed_origins = ["http://localhost:3000"]

[run]
event_buffer = 16
"#
    )
}

#[test]
fn test_config_toml_parsing() {
    let temp_dir = TempDir::new().unwrap();
    let config =
        Config::from_toml_str(&full_toml(&temp_dir.path().display().to_string())).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.llm.default_provider, "ollama");
    assert_eq!(config.llm.openai.model, "gpt-4o-mini");
    assert_eq!(config.llm.ollama.model, "qwen2.5:7b");
    assert_eq!(config.search.tavily.max_results, 8);
    assert_eq!(config.search.tavily.search_depth, "advanced");
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9000);
    assert_eq!(
        config.server.allowed_origins,
        vec!["http://localhost:3000".to_string()]
    );
    assert_eq!(config.run.event_buffer, 16);
}

#[test]
fn test_missing_sections_use_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let toml = format!("[core]\ndata_dir = {:?}\n", temp_dir.path().display().to_string());
    let config = Config::from_toml_str(&toml).unwrap();

    assert_eq!(config.core.log_level, "info");
    assert_eq!(config.llm.default_provider, "openai");
    assert_eq!(config.llm.timeout_secs, 120);
    assert_eq!(config.search.timeout_secs, 30);
    assert_eq!(config.search.tavily.max_results, 5);
    assert_eq!(config.server.port, 8000);
}

#[test]
fn test_data_dir_is_created_and_canonicalized() {
    let temp_dir = TempDir::new().unwrap();
    let nested = temp_dir.path().join("a").join("b");
    let config = Config::from_toml_str(&full_toml(&nested.display().to_string())).unwrap();

    assert!(nested.exists());
    assert!(config.core.data_dir.is_absolute());
    assert_eq!(config.database_path(), config.core.data_dir.join("sessions.db"));
}

#[test]
fn test_invalid_values_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().display().to_string();

    let bad_provider = full_toml(&dir).replace("default_provider = \"ollama\"", "default_provider = \"gemini\"");
    assert!(Config::from_toml_str(&bad_provider)
        .unwrap_err()
        .to_string()
        .contains("Invalid default provider"));

    let bad_search = full_toml(&dir).replace("provider = \"tavily\"", "provider = \"bing\"");
    assert!(Config::from_toml_str(&bad_search).is_err());

    let bad_buffer = full_toml(&dir).replace("event_buffer = 16", "event_buffer = 0");
    assert!(Config::from_toml_str(&bad_buffer).is_err());

    assert!(Config::from_toml_str("[core\nbroken").is_err());
}

#[test]
fn test_load_from_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, full_toml(&temp_dir.path().display().to_string())).unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.server.port, 9000);

    assert!(Config::load_from_path(&temp_dir.path().join("missing.toml")).is_err());
}

#[test]
fn test_run_settings_follow_config() {
    let temp_dir = TempDir::new().unwrap();
    let config =
        Config::from_toml_str(&full_toml(&temp_dir.path().display().to_string())).unwrap();

    let settings = RunSettings::from_config(&config);
    assert_eq!(settings.llm_timeout, Duration::from_secs(60));
    assert_eq!(settings.search_timeout, Duration::from_secs(10));
    assert_eq!(settings.event_buffer, 16);
}

use crate::config::schema::AppConfig;
use crate::error::{FoxbridgeError, Result};
use std::fs;
use std::path::PathBuf;

/// Get the configuration file path based on platform
pub fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("foxbridge"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}

/// Load configuration from file, creating default if not exists.
/// Environment overrides are applied after the file is read.
pub fn load_config() -> Result<AppConfig> {
    let config_path = get_config_path();

    let mut config = if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(|e| {
            FoxbridgeError::Config(format!(
                "Failed to read config from {:?}: {}",
                config_path, e
            ))
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        tracing::info!("Loaded config from {:?}", config_path);
        config
    } else {
        tracing::info!(
            "Config file not found at {:?}, creating default",
            config_path
        );
        init_config()?
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig) -> Result<()> {
    let config_path = get_config_path();

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            FoxbridgeError::Config(format!(
                "Failed to create config directory {:?}: {}",
                parent, e
            ))
        })?;
    }

    let content = toml::to_string_pretty(config)?;

    fs::write(&config_path, content).map_err(|e| {
        FoxbridgeError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::info!("Saved config to {:?}", config_path);
    Ok(())
}

/// Initialize default configuration and save to file
pub fn init_config() -> Result<AppConfig> {
    let config = AppConfig::default();
    save_config(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Some(port) = std::env::var("FOXBRIDGE_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
    {
        config.api.port = port;
    }
    if let Ok(key) = std::env::var("FOXBRIDGE_API_KEY") {
        if !key.is_empty() {
            config.api.api_key = Some(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path() {
        let path = get_config_path();
        assert!(path.ends_with("config.toml"));
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.api.port, 5000);
        assert!(config.api.api_key.is_none());
        assert!(config.firefox.headless);
        assert!(config.firefox.autostart);
        assert_eq!(config.firefox.window_width, 2560);
        assert_eq!(config.firefox.window_height, 1440);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = AppConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.api.port, config.api.port);
        assert_eq!(parsed.firefox.start_url, config.firefox.start_url);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str("[api]\nport = 8123\n").unwrap();
        assert_eq!(parsed.api.port, 8123);
        assert_eq!(parsed.api.bind, "0.0.0.0");
        assert_eq!(parsed.firefox.page_load_timeout_ms, 30_000);
    }
}

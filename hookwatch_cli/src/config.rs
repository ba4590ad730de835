//! CLI configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hookwatch")
    }

    #[cfg(not(target_os = "windows"))]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hookwatch")
    }
}

/// Get the config file path
pub fn config_file() -> PathBuf {
    config_dir().join("config.yml")
}

/// Ensure the config directory exists
pub fn ensure_dirs() -> Result<()> {
    fs::create_dir_all(config_dir()).context("Failed to create config directory")?;
    Ok(())
}

/// Main configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Relay base URL, e.g. https://relay.example.com
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_url: Option<String>,
}

impl Config {
    /// Load config from file
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file())
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        ensure_dirs()?;
        self.save_to(&config_file())
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        // An empty file parses as YAML null
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Set the relay URL after validating its scheme
    pub fn set_relay(&mut self, url: &str) -> Result<()> {
        self.relay_url = Some(normalize_relay_url(url)?);
        Ok(())
    }

    /// Relay URL from the command line (or `HOOKWATCH_RELAY_URL`, which clap
    /// folds into it), else from the config file
    pub fn resolve_relay(&self, cli_relay: Option<&str>) -> Result<String> {
        match cli_relay.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => normalize_relay_url(url),
            None => self.relay_url.clone().ok_or_else(|| {
                anyhow::anyhow!(
                    "No relay configured. Pass --relay, set HOOKWATCH_RELAY_URL or run `hookwatch config set-relay <URL>`."
                )
            }),
        }
    }
}

fn normalize_relay_url(url: &str) -> Result<String> {
    let url = url.trim().trim_end_matches('/');
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        anyhow::bail!("Relay URL must start with http:// or https://: {}", url);
    }
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hookwatch-{}-{}.yml", name, std::process::id()))
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("save");
        let mut config = Config::default();
        config.set_relay("https://relay.example.com/").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded.relay_url.as_deref(), Some("https://relay.example.com"));
    }

    #[test]
    fn test_missing_and_empty_file() {
        let path = temp_path("empty");
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());

        fs::write(&path, "").unwrap();
        let loaded = Config::load_from(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_resolve_relay_precedence() {
        let config = Config {
            relay_url: Some("https://from-file".to_string()),
        };

        assert_eq!(config.resolve_relay(Some("http://cli:3001/")).unwrap(), "http://cli:3001");
        assert_eq!(config.resolve_relay(Some("  ")).unwrap(), "https://from-file");
        assert_eq!(config.resolve_relay(None).unwrap(), "https://from-file");
        assert!(Config::default().resolve_relay(None).is_err());
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let mut config = Config::default();
        assert!(config.set_relay("relay.example.com").is_err());
        assert!(config.relay_url.is_none());
    }
}

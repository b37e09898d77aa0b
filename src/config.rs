//! Service settings

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding fetched and rewritten artifacts
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// JSON file persisting the configured lists
    #[serde(default = "default_lists_file")]
    pub lists_file: PathBuf,
    #[serde(default = "default_sync_interval_hours")]
    pub sync_interval_hours: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_lists_file() -> PathBuf {
    PathBuf::from("./config.json")
}
fn default_sync_interval_hours() -> u64 {
    24
}
fn default_fetch_timeout_secs() -> u64 {
    20
}
fn default_user_agent() -> String {
    format!("m3u-epg-matcher/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            lists_file: default_lists_file(),
            sync_interval_hours: default_sync_interval_hours(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl AppConfig {
    /// Load settings from `settings.json` in the working directory, falling
    /// back to defaults when the file is absent. Individual missing fields
    /// fall back on their own thanks to the serde defaults.
    pub fn load() -> Self {
        Self::load_from(Path::new(SETTINGS_FILE))
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => warn!("ignoring malformed {}: {e}", path.display()),
                },
                Err(e) => warn!("cannot read {}: {e}", path.display()),
            }
        }
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.sync_interval_hours, 24);
        assert_eq!(config.fetch_timeout_secs, 20);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
    }

    #[test]
    fn test_partial_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"port": 8080, "sync_interval_hours": 6}"#).unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.port, 8080);
        assert_eq!(config.sync_interval_hours, 6);
        // Everything else keeps its default
        assert_eq!(config.fetch_timeout_secs, 20);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_malformed_settings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.port, 5000);
    }
}

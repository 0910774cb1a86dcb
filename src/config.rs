use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};
use reqwest::Client;

pub const DEFAULT_SEARCH_URL: &str = "http://127.0.0.1:5002/api/search";
pub const DEFAULT_FEEDBACK_URL: &str = "http://127.0.0.1:5002/api/feedback";
pub const DEFAULT_CRAWL_URL: &str = "http://127.0.0.1:8000/crawl";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// On-disk settings. Every field is optional; unset fields fall back to the
/// local development endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
}

/// Fully resolved endpoints the clients talk to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub search_url: String,
    pub feedback_url: String,
    pub crawl_url: String,
    pub connect_timeout: Duration,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| anyhow!("Invalid config file {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Layer `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merge(self, overrides: Config) -> Config {
        Config {
            search_url: overrides.search_url.or(self.search_url),
            feedback_url: overrides.feedback_url.or(self.feedback_url),
            crawl_url: overrides.crawl_url.or(self.crawl_url),
            connect_timeout_secs: overrides.connect_timeout_secs.or(self.connect_timeout_secs),
        }
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            search_url: self
                .search_url
                .clone()
                .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
            feedback_url: self
                .feedback_url
                .clone()
                .unwrap_or_else(|| DEFAULT_FEEDBACK_URL.to_string()),
            crawl_url: self
                .crawl_url
                .clone()
                .unwrap_or_else(|| DEFAULT_CRAWL_URL.to_string()),
            connect_timeout: Duration::from_secs(
                self.connect_timeout_secs.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
        }
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("qa-chat").join("config.json"))
    }
}

impl Endpoints {
    /// Shared HTTP client for all three services.
    ///
    /// Only the connect phase is bounded; answers may stream for a long time.
    pub fn http_client(&self) -> Result<Client> {
        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()?;
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();

        assert_eq!(config, Config::new());
        let endpoints = config.endpoints();
        assert_eq!(endpoints.search_url, DEFAULT_SEARCH_URL);
        assert_eq!(endpoints.feedback_url, DEFAULT_FEEDBACK_URL);
        assert_eq!(endpoints.crawl_url, DEFAULT_CRAWL_URL);
        assert_eq!(endpoints.connect_timeout, Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS));
    }

    #[test]
    fn test_save_creates_directory_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            search_url: Some("http://qa.internal/api/search".to_string()),
            connect_timeout_secs: Some(3),
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(!written.contains("crawl_url"));

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let file = Config {
            search_url: Some("http://file/search".to_string()),
            crawl_url: Some("http://file/crawl".to_string()),
            ..Config::default()
        };
        let flags = Config {
            search_url: Some("http://flag/search".to_string()),
            ..Config::default()
        };

        let endpoints = file.merge(flags).endpoints();
        assert_eq!(endpoints.search_url, "http://flag/search");
        assert_eq!(endpoints.crawl_url, "http://file/crawl");
        assert_eq!(endpoints.feedback_url, DEFAULT_FEEDBACK_URL);
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{Result, TranslatorError};

fn default_source_language() -> String {
    "en".to_string()
}

fn default_download_timeout_secs() -> u64 {
    120
}

fn default_per_language_capacity() -> usize {
    500
}

fn default_max_languages() -> usize {
    3
}

fn default_layout_debounce_ms() -> u64 {
    200
}

fn default_scroll_throttle_ms() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub provider: ProviderConfig,
    pub repository: RepositoryConfig,
    pub cache: CacheConfig,
    pub manager: ManagerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Which model provider backs the repository
    pub kind: ProviderKind,
    /// Phrasebook file for the offline provider (JSON or TOML)
    #[serde(default)]
    pub phrasebook: Option<PathBuf>,
    /// Simulated download latency per language for the offline provider, in milliseconds
    #[serde(default)]
    pub simulated_download_ms: u64,
    /// Ollama endpoint URL
    pub endpoint: String,
    /// Ollama model used for translation
    pub model: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Offline table-driven translations
    Phrasebook,
    /// Local Ollama server
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryConfig {
    /// Language all screen text is written in
    #[serde(default = "default_source_language")]
    pub source_language: String,
    /// Only download models over an unmetered connection
    #[serde(default)]
    pub require_wifi: bool,
    /// Abort a model download after this many seconds (0 waits forever)
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Maximum cached strings per language
    #[serde(default = "default_per_language_capacity")]
    pub per_language_capacity: usize,
    /// Maximum number of languages with a live cache
    #[serde(default = "default_max_languages")]
    pub max_languages: usize,
    /// Drop every language cache when originals are restored
    #[serde(default)]
    pub clear_on_restore: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagerConfig {
    /// Settle delay after a structural change before re-translating
    #[serde(default = "default_layout_debounce_ms")]
    pub layout_debounce_ms: u64,
    /// Minimum spacing between passes triggered by scrolling
    #[serde(default = "default_scroll_throttle_ms")]
    pub scroll_throttle_ms: u64,
}

impl RepositoryConfig {
    pub fn download_timeout(&self) -> Option<Duration> {
        match self.download_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl ManagerConfig {
    pub fn layout_debounce(&self) -> Duration {
        Duration::from_millis(self.layout_debounce_ms)
    }

    pub fn scroll_throttle(&self) -> Duration {
        Duration::from_millis(self.scroll_throttle_ms)
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            source_language: default_source_language(),
            require_wifi: false,
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            per_language_capacity: default_per_language_capacity(),
            max_languages: default_max_languages(),
            clear_on_restore: false,
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            layout_debounce_ms: default_layout_debounce_ms(),
            scroll_throttle_ms: default_scroll_throttle_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig {
                kind: ProviderKind::Phrasebook,
                phrasebook: None,
                simulated_download_ms: 0,
                endpoint: "http://localhost:11434".to_string(),
                model: "llama3.2:3b".to_string(),
            },
            repository: RepositoryConfig::default(),
            cache: CacheConfig::default(),
            manager: ManagerConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranslatorError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| TranslatorError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TranslatorError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| TranslatorError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Reject values the caches cannot be built from
    pub fn validate(&self) -> Result<()> {
        if self.cache.per_language_capacity == 0 {
            return Err(TranslatorError::Config(
                "cache.per_language_capacity must be at least 1".to_string(),
            ));
        }
        if self.cache.max_languages == 0 {
            return Err(TranslatorError::Config(
                "cache.max_languages must be at least 1".to_string(),
            ));
        }
        if self.provider.kind == ProviderKind::Ollama && self.provider.endpoint.trim().is_empty() {
            return Err(TranslatorError::Config(
                "provider.endpoint is required for the ollama provider".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen-translator.toml");

        let mut config = Config::default();
        config.cache.clear_on_restore = true;
        config.manager.layout_debounce_ms = 50;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let toml_text = r#"
            [provider]
            kind = "phrasebook"
            endpoint = "http://localhost:11434"
            model = "llama3.2:3b"

            [repository]
            [cache]
            max_languages = 5
            [manager]
        "#;
        let config: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(config.cache.max_languages, 5);
        assert_eq!(config.cache.per_language_capacity, 500);
        assert_eq!(config.manager.layout_debounce(), Duration::from_millis(200));
        assert_eq!(config.repository.download_timeout(), Some(Duration::from_secs(120)));
        assert!(!config.cache.clear_on_restore);
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let repo = RepositoryConfig {
            download_timeout_secs: 0,
            ..RepositoryConfig::default()
        };
        assert_eq!(repo.download_timeout(), None);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        let mut config = Config::default();
        config.cache.per_language_capacity = 0;
        config.save_to_file(&path).unwrap();

        assert!(matches!(Config::from_file(&path), Err(TranslatorError::Config(_))));
    }
}

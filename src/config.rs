use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Inference service endpoint and timing
    pub service: ServiceConfig,

    /// Model roster and capability detection
    pub models: ModelsConfig,

    /// Reply-scanning heuristics
    pub heuristics: HeuristicsConfig,

    /// Page capture settings
    pub page: PageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the local inference service
    pub base_url: String,

    /// Upper bound for a generate request, in seconds
    pub request_timeout_secs: u64,

    /// Connection establishment timeout, in seconds
    pub connect_timeout_secs: u64,

    /// Timeout for presence/listing probes, in seconds
    pub probe_timeout_secs: u64,

    /// Delay before re-probing after launching the service, in seconds
    pub restart_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Model selected on startup
    pub default_model: String,

    /// Models offered in the selector
    pub roster: Vec<String>,

    /// Name fragments marking a model as vision-capable
    pub vision_fragments: Vec<String>,

    /// Vision model offered when a screenshot needs one
    pub suggested_vision_model: String,

    /// Small model offered when no models are installed at all
    pub starter_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicsConfig {
    /// Verbs that mark a nearby URL as a navigation suggestion
    pub action_verbs: Vec<String>,

    /// Window size before a URL, in chars
    pub window_before: usize,

    /// Window size after a URL, in chars
    pub window_after: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    /// Cap on page text folded into a prompt, in bytes
    pub max_content_len: usize,

    /// Page loaded in fresh tabs
    pub home_page: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            request_timeout_secs: 120,
            connect_timeout_secs: 10,
            probe_timeout_secs: 2,
            restart_delay_secs: 3,
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_model: "llama3.2-vision:11b".to_string(),
            roster: vec![
                "llama3.2-vision:11b".to_string(),
                "llama3.2-vision:90b".to_string(),
                "llava".to_string(),
                "llava-phi3".to_string(),
                "bakllava".to_string(),
                "llama3.2".to_string(),
                "llama3.2:1b".to_string(),
                "llama3.1".to_string(),
                "mistral".to_string(),
                "phi3".to_string(),
                "gemma2".to_string(),
                "qwen2.5".to_string(),
            ],
            vision_fragments: vec![
                "llava".to_string(),
                "bakllava".to_string(),
                "llava-phi3".to_string(),
                "llama3.2-vision".to_string(),
            ],
            suggested_vision_model: "llama3.2-vision:11b".to_string(),
            starter_model: "llama3.2:1b".to_string(),
        }
    }
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            action_verbs: vec![
                "open".to_string(),
                "visit".to_string(),
                "navigate".to_string(),
                "go to".to_string(),
                "check out".to_string(),
                "opening".to_string(),
                "visiting".to_string(),
            ],
            window_before: 100,
            window_after: 50,
        }
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            max_content_len: 6000,
            home_page: "https://www.google.com".to_string(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            models: ModelsConfig::default(),
            heuristics: HeuristicsConfig::default(),
            page: PageConfig::default(),
        }
    }
}

impl BrowserConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Get the default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(".glitch").join("config.toml"))
    }
}

/// Load or create configuration
pub fn load_or_create_config(path: Option<&Path>) -> Result<BrowserConfig> {
    let config_path = if let Some(p) = path {
        p.to_path_buf()
    } else {
        BrowserConfig::default_path()?
    };

    if config_path.exists() {
        BrowserConfig::load(&config_path)
    } else {
        let config = BrowserConfig::default();
        config.save(&config_path)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = BrowserConfig::default();
        assert_eq!(config.service.base_url, "http://localhost:11434");
        assert_eq!(config.service.request_timeout_secs, 120);
        assert_eq!(config.page.max_content_len, 6000);
        assert_eq!(config.heuristics.window_before, 100);
        assert_eq!(config.heuristics.window_after, 50);
        assert!(config.models.roster.contains(&"llama3.2:1b".to_string()));
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config = BrowserConfig::default();
        config.save(&config_path).unwrap();

        let loaded = BrowserConfig::load(&config_path).unwrap();
        assert_eq!(loaded.service.base_url, config.service.base_url);
        assert_eq!(loaded.heuristics.action_verbs, config.heuristics.action_verbs);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let config = load_or_create_config(Some(&config_path)).unwrap();
        assert!(config_path.exists());
        assert_eq!(config.models.starter_model, "llama3.2:1b");
    }
}

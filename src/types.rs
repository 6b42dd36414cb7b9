use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::util::{app_dir, expand_home};

/// Application configuration (`~/.portfolio-pulse/config.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Spreadsheet feed endpoint. Required.
    #[serde(default)]
    pub feed_url: String,
    /// Minimum age of the cached snapshot before the scheduler refetches.
    #[serde(default = "default_refresh_interval_hours")]
    pub refresh_interval_hours: u32,
    /// Snapshot cache directory; `~/` is expanded. Defaults under the app dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub narrative: NarrativeConfig,
}

fn default_refresh_interval_hours() -> u32 {
    24
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: String::new(),
            refresh_interval_hours: default_refresh_interval_hours(),
            cache_dir: None,
            narrative: NarrativeConfig::default(),
        }
    }
}

impl Config {
    /// Parsed feed URL; only http(s) endpoints are accepted.
    pub fn feed_url(&self) -> Result<url::Url, String> {
        if self.feed_url.trim().is_empty() {
            return Err("feedUrl is not set".to_string());
        }
        let parsed = url::Url::parse(self.feed_url.trim())
            .map_err(|e| format!("Invalid feedUrl '{}': {}", self.feed_url, e))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            other => Err(format!("Unsupported feedUrl scheme '{}'", other)),
        }
    }

    pub fn cache_dir(&self) -> Result<PathBuf, String> {
        match self.cache_dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => Ok(expand_home(dir)),
            _ => Ok(app_dir()?.join("cache")),
        }
    }
}

/// Chat-completion endpoint used for the narrative summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    1200
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl NarrativeConfig {
    pub fn is_configured(&self) -> bool {
        self.endpoint
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty())
    }
}

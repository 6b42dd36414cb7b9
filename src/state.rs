use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::types::Config;
use crate::util::{app_dir, atomic_write_str};

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "PORTFOLIO_PULSE_CONFIG";

/// Process-wide configuration holder
pub struct AppState {
    pub config: Mutex<Option<Config>>,
    pub config_path: PathBuf,
}

impl AppState {
    /// Load from the given path, or the default location. A missing or broken
    /// file leaves `config` empty; callers report that when they need it.
    pub fn new(path: Option<PathBuf>) -> Result<Self, String> {
        let config_path = match path {
            Some(p) => p,
            None => config_path()?,
        };
        let config = match load_config_from(&config_path) {
            Ok(c) => Some(c),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        };
        Ok(Self {
            config: Mutex::new(config),
            config_path,
        })
    }

    pub fn config(&self) -> Option<Config> {
        self.config.lock().clone()
    }
}

/// Get the canonical config file path (~/.portfolio-pulse/config.json)
pub fn config_path() -> Result<PathBuf, String> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(app_dir()?.join("config.json"))
}

/// Load configuration from the default location
pub fn load_config() -> Result<Config, String> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &std::path::Path) -> Result<Config, String> {
    if !path.exists() {
        return Err(format!(
            "Config file not found at {}. Create it with: {{ \"feedUrl\": \"https://...\" }}",
            path.display()
        ));
    }

    let content = fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;

    let config: Config =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

    config.feed_url()?;

    Ok(config)
}

/// Create or update the config file atomically.
///
/// Starts from the in-memory config (or serde defaults on first run), applies
/// the mutator, writes the file and refreshes the in-memory copy.
pub fn create_or_update_config(
    state: &AppState,
    mutator: impl FnOnce(&mut Config),
) -> Result<Config, String> {
    let mut guard = state.config.lock();

    let mut config = guard.clone().unwrap_or_default();
    mutator(&mut config);

    let content = serde_json::to_string_pretty(&config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    atomic_write_str(&state.config_path, &content)
        .map_err(|e| format!("Failed to write config: {}", e))?;

    *guard = Some(config.clone());
    Ok(config)
}

/// Reload configuration from disk
pub fn reload_config(state: &AppState) -> Result<Config, String> {
    let config = load_config_from(&state.config_path)?;
    *state.config.lock() = Some(config.clone());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_leaves_config_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Some(dir.path().join("config.json"))).unwrap();
        assert!(state.config().is_none());
    }

    #[test]
    fn explicit_path_is_used_and_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulse.json");
        fs::write(&path, r#"{ "feedUrl": "https://sheets.example.com/exec" }"#).unwrap();

        let state = AppState::new(Some(path.clone())).unwrap();
        assert_eq!(state.config_path, path);
        assert_eq!(
            state.config().unwrap().feed_url,
            "https://sheets.example.com/exec"
        );
    }

    #[test]
    fn create_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(Some(dir.path().join("config.json"))).unwrap();

        let written = create_or_update_config(&state, |c| {
            c.feed_url = "https://sheets.example.com/exec".to_string();
            c.refresh_interval_hours = 6;
        })
        .unwrap();
        assert_eq!(written.refresh_interval_hours, 6);

        let reloaded = reload_config(&state).unwrap();
        assert_eq!(reloaded.feed_url, "https://sheets.example.com/exec");
        assert_eq!(reloaded.refresh_interval_hours, 6);
    }

    #[test]
    fn invalid_feed_url_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "feedUrl": "nope" }"#).unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.contains("Invalid feedUrl"));
    }
}

pub mod types;

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = ".podprof.toml";

/// Get the global config file path (~/.podprof.toml)
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(CONFIG_FILE_NAME))
}

/// Get the local config file path (./.podprof.toml)
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

/// Load configuration from an explicit file, or discover it (local directory
/// first, then global), falling back to defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<types::Config> {
    if let Some(path) = explicit {
        let content = fs::read_to_string(path).map_err(crate::error::ConfigError::Io)?;
        let config = toml::from_str(&content)
            .map_err(|e| crate::error::ConfigError::ParsingFailed(e.to_string()))?;
        return Ok(config);
    }

    // Try local config first
    if let Ok(cwd) = std::env::current_dir() {
        let local = local_config_path(&cwd);
        if local.exists() {
            if let Ok(content) = fs::read_to_string(&local) {
                if let Ok(config) = toml::from_str(&content) {
                    return Ok(config);
                }
            }
        }
    }

    // Try global config
    if let Some(global) = global_config_path() {
        if global.exists() {
            if let Ok(content) = fs::read_to_string(&global) {
                if let Ok(config) = toml::from_str(&content) {
                    return Ok(config);
                }
            }
        }
    }

    Ok(types::Config::default())
}

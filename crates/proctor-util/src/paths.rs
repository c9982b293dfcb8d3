//! Default paths for proctor components
//!
//! Paths are user-writable by default:
//! - Config: `$XDG_CONFIG_HOME/proctor/config.toml` or `~/.config/proctor/config.toml`
//! - Data: `$XDG_DATA_HOME/proctor` or `~/.local/share/proctor`

use std::path::PathBuf;

/// Application subdirectory name
const APP_DIR: &str = "proctor";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$XDG_CONFIG_HOME/proctor/config.toml`
/// 2. `~/.config/proctor/config.toml`
/// 3. `/etc/proctor/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Default data directory.
///
/// The `PROCTOR_DATA_DIR` override is applied by the binary, not here.
pub fn default_data_dir() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

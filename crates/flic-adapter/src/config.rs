//! Settings parser for the flic-bridge config.toml

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use flic_core::prelude::*;

const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "flic-bridge";

/// Bridge settings, loaded from the platform config dir.
///
/// Every field has a default so a missing or partial file still yields
/// a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Bluetooth controller hint passed to flicd (`-h`), e.g. "hci0"
    pub device: Option<String>,
    /// Spawn and supervise flicd; false means an external daemon is
    /// already running on `port`
    pub auto_start_daemon: bool,
    /// Explicit path to the flicd binary; None searches PATH
    pub daemon_binary: Option<PathBuf>,
    /// TCP port of the flicd client socket
    pub port: u16,
    /// Default pairing window length in seconds
    pub pairing_window_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: None,
            auto_start_daemon: true,
            daemon_binary: None,
            port: 5551,
            pairing_window_secs: 60,
        }
    }
}

/// Path of the default config file under the platform config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILENAME))
}

/// Load settings from a config file.
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(config_path: &Path) -> Settings {
    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Save settings to a config file.
///
/// Uses atomic write (temp file + rename) for safety.
pub fn save_settings(config_path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = config_path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::config(format!("Failed to create config dir: {}", e)))?;
        }
    }

    let content = toml::to_string_pretty(settings)
        .map_err(|e| Error::config(format!("Failed to serialize settings: {}", e)))?;

    let temp_path = config_path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &content)
        .map_err(|e| Error::config(format!("Failed to write temp file: {}", e)))?;
    std::fs::rename(&temp_path, config_path)
        .map_err(|e| Error::config(format!("Failed to rename config file: {}", e)))?;

    Ok(())
}

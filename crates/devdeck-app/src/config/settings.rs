//! Settings loading and config directory setup

use std::path::{Path, PathBuf};

use devdeck_core::prelude::*;

use super::types::Settings;

pub const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "devdeck";

/// `<platform config dir>/devdeck`, or `./.devdeck` when the platform has none
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".devdeck"))
}

pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILENAME)
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings Loading
// ─────────────────────────────────────────────────────────────────────────────

/// Load settings from `<config_dir>/config.toml`
///
/// Returns default settings if file doesn't exist or can't be parsed.
pub fn load_settings(config_dir: &Path) -> Settings {
    let config_path = config_file_path(config_dir);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
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

/// Create the config directory with a commented default config.toml
///
/// An existing config.toml is left untouched.
pub fn init_config_dir(config_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(config_dir)
        .map_err(|e| Error::config(format!("Failed to create {:?}: {}", config_dir, e)))?;

    let config_path = config_file_path(config_dir);
    if !config_path.exists() {
        let default_content = r#"# devdeck configuration

[bridge]
program = "adb"           # Device bridge program (name on PATH or full path)
args = []                 # Global bridge arguments, e.g. ["-P", "5038"]
probe_timeout_ms = 10000  # Timeout for each probe command

[shell]
program = ""              # Empty = platform default (sh -c / cmd /C)
args = []

[monitor]
debounce_ms = 1000        # Quiet period after hotplug events before probing
watch_hotplug = true
hotplug_paths = ["/dev/bus/usb"]

[execution]
event_buffer = 256        # Events buffered per run
"#;
        std::fs::write(&config_path, default_content)
            .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
        info!("Created default config at {:?}", config_path);
    }

    Ok(config_path)
}

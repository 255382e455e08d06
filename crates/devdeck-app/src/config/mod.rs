//! Configuration file parsing for devdeck
//!
//! Supports:
//! - `<config dir>/devdeck/config.toml` - Global settings

pub mod settings;
pub mod types;

pub use settings::{
    config_file_path, default_config_dir, init_config_dir, load_settings, CONFIG_FILENAME,
};
pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::HotscriptConfig;

/// Project-level configuration file name
pub const CONFIG_FILE_NAME: &str = "hotscript.toml";

/// Discovers Hotscript configuration by traversing up the directory tree
///
/// Falls back to `~/.config/hotscript/config.toml` when no project file exists.
pub fn discover_config(start_dir: &Path) -> Result<Option<PathBuf>> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            return Ok(Some(config_path));
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    if let Some(home) = dirs::home_dir() {
        let global_config = home.join(".config/hotscript/config.toml");
        if global_config.is_file() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// Loads configuration with auto-discovery support
///
/// If `explicit_path` is provided, loads config from that path.
/// Otherwise, auto-discovers config by traversing up from the current directory.
///
/// Returns the config together with the file it came from; `None` for the
/// path means defaults were used.
pub fn load_config_with_discovery(
    explicit_path: Option<&str>,
) -> Result<(HotscriptConfig, Option<PathBuf>)> {
    if let Some(config_path) = explicit_path {
        let config = HotscriptConfig::from_file(config_path)?;
        return Ok((config, Some(PathBuf::from(config_path))));
    }

    let current_dir =
        std::env::current_dir().context("Failed to get current directory for config discovery")?;

    match discover_config(&current_dir)? {
        Some(discovered_path) => {
            let config = HotscriptConfig::from_file(&discovered_path)?;
            Ok((config, Some(discovered_path)))
        }
        None => Ok((HotscriptConfig::default(), None)),
    }
}

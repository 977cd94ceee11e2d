pub mod call;
pub mod config;
pub mod run;
pub mod serve;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, info};

use hotscript::cache::ScriptCache;
use hotscript::config::HotscriptConfig;
use hotscript::config_discovery::load_config_with_discovery;
use hotscript::logging::{self, LogFormat};
use hotscript::runtime::LuaRuntime;
use hotscript::service::ScriptService;

use crate::cli::CommonConfigArgs;

/// Load config (explicit path or discovery) and apply CLI/env overrides
pub fn load_config(args: &CommonConfigArgs) -> Result<(HotscriptConfig, Option<PathBuf>)> {
    let (mut config, source) = load_config_with_discovery(args.config.as_deref())?;

    if let Some(root) = &args.root {
        config.scripts.root = root.clone();
    }
    if let Some(max_hold) = &args.max_hold {
        config.cache.max_hold = max_hold.clone();
    }
    if let Some(check_delay) = &args.check_delay {
        config.cache.check_delay = check_delay.clone();
    }
    if let Some(trust) = &args.trust {
        config.scripts.trust = trust.clone();
    }
    if let Some(log_level) = &args.log_level {
        config.observability.log_level = log_level.clone();
    }

    config.validate()?;
    Ok((config, source))
}

/// Load the effective config and start logging with it
pub fn prepare(args: &CommonConfigArgs) -> Result<HotscriptConfig> {
    let (config, source) = load_config(args)?;

    logging::init(
        &config.observability.log_level,
        LogFormat::parse(&config.observability.log_format),
    );

    match source {
        Some(path) => info!("Using config: {}", path.display()),
        None => debug!("No configuration file found, using defaults"),
    }

    Ok(config)
}

/// Build the Lua-backed script service described by `config`
///
/// A relative root is resolved against the working directory.
pub fn build_service(config: &HotscriptConfig) -> Result<ScriptService<LuaRuntime>> {
    let settings = config.cache_settings()?;
    let trust = config.trust_level()?;

    let root = PathBuf::from(&config.scripts.root);
    let root = if root.is_absolute() {
        root
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(root)
    };

    debug!(
        root = %root.display(),
        trust = trust.as_str(),
        max_hold_secs = settings.max_hold_secs,
        check_delay_secs = settings.check_delay_secs,
        "script service configured"
    );

    let cache = ScriptCache::new(LuaRuntime::new(trust), settings);
    Ok(ScriptService::new(cache, root).with_extension(&config.scripts.extension))
}

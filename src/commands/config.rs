use anyhow::Result;
use tracing::info;

use hotscript::config::HotscriptConfig;

use crate::cli::{CommonConfigArgs, ConfigCommands};
use crate::commands::load_config;

pub fn run(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { path } => validate(&path),
        ConfigCommands::Generate => generate(),
        ConfigCommands::Show { common } => show(&common),
    }
}

fn validate(path: &str) -> Result<()> {
    info!("Validating config file: {}", path);

    let config = HotscriptConfig::from_file(path)?;
    config.validate()?;
    let settings = config.cache_settings()?;

    println!("✓ Configuration file is valid: {}", path);
    println!("\nSummary:");
    println!("  - Script root: {}", config.scripts.root);
    println!("  - Extension: .{}", config.scripts.extension);
    println!("  - Trust level: {}", config.trust_level()?.as_str());
    println!(
        "  - Max hold: {} ({}s)",
        config.cache.max_hold, settings.max_hold_secs
    );
    println!(
        "  - Check delay: {} ({}s)",
        config.cache.check_delay, settings.check_delay_secs
    );

    Ok(())
}

fn generate() -> Result<()> {
    info!("Generating example config");

    println!("{}", HotscriptConfig::example()?);

    Ok(())
}

fn show(common: &CommonConfigArgs) -> Result<()> {
    info!("Showing effective configuration");

    let (config, source) = load_config(common)?;

    match source {
        Some(path) => println!("Effective Configuration ({}):\n", path.display()),
        None => println!("Effective Configuration (defaults):\n"),
    }
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

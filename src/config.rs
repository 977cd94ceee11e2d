use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::cache::CacheSettings;
use crate::logging::LogFormat;
use crate::runtime::TrustLevel;

/// Complete Hotscript configuration (loaded from TOML file)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HotscriptConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub scripts: ScriptsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Compiled script cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// How long an idle script stays cached (e.g., "10m", "600")
    #[serde(default = "default_max_hold")]
    pub max_hold: String,

    /// Minimum time between eviction sweeps (e.g., "1m")
    #[serde(default = "default_check_delay")]
    pub check_delay: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_hold: default_max_hold(),
            check_delay: default_check_delay(),
        }
    }
}

/// Script location and sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptsConfig {
    /// Application root; relative script paths resolve against it
    #[serde(default = "default_root")]
    pub root: String,

    /// Script file extension (without the dot)
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Lua trust level: basic, file_read, elevated
    #[serde(default = "default_trust")]
    pub trust: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            extension: default_extension(),
            trust: default_trust(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// Default value functions
fn default_max_hold() -> String {
    "10m".to_string()
}

fn default_check_delay() -> String {
    "1m".to_string()
}

fn default_root() -> String {
    "backend".to_string()
}

fn default_extension() -> String {
    "lua".to_string()
}

fn default_trust() -> String {
    "basic".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Parse a duration string (e.g., "7d", "24h", "30m", "45s", "90")
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let duration_str = duration_str.trim().to_lowercase();

    let (num, unit_secs): (&str, u64) = if let Some(num) = duration_str.strip_suffix('d') {
        (num, 24 * 60 * 60)
    } else if let Some(num) = duration_str.strip_suffix('h') {
        (num, 60 * 60)
    } else if let Some(num) = duration_str.strip_suffix('m') {
        (num, 60)
    } else if let Some(num) = duration_str.strip_suffix('s') {
        (num, 1)
    } else {
        // Assume seconds
        (duration_str.as_str(), 1)
    };

    let num: u64 = num.trim().parse().context("Invalid duration number")?;
    let secs = num
        .checked_mul(unit_secs)
        .with_context(|| format!("Duration too large: {}", duration_str))?;

    Ok(Duration::from_secs(secs))
}

impl HotscriptConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: HotscriptConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Cache timing settings
    pub fn cache_settings(&self) -> Result<CacheSettings> {
        let max_hold = parse_duration(&self.cache.max_hold)
            .with_context(|| format!("Invalid cache.max_hold: {}", self.cache.max_hold))?;
        let check_delay = parse_duration(&self.cache.check_delay)
            .with_context(|| format!("Invalid cache.check_delay: {}", self.cache.check_delay))?;

        Ok(CacheSettings::new(max_hold, check_delay))
    }

    pub fn trust_level(&self) -> Result<TrustLevel> {
        self.scripts.trust.parse()
    }

    /// Generate example configuration as TOML string
    pub fn example() -> Result<String> {
        let config = HotscriptConfig {
            cache: CacheConfig {
                max_hold: "10m".to_string(),
                check_delay: "1m".to_string(),
            },
            scripts: ScriptsConfig {
                root: "backend".to_string(),
                extension: "lua".to_string(),
                trust: "basic".to_string(),
            },
            observability: ObservabilityConfig::default(),
        };

        toml::to_string_pretty(&config).context("Failed to serialize example config")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.cache_settings()?;

        if self.scripts.root.trim().is_empty() {
            anyhow::bail!("scripts.root must be set");
        }

        if self.scripts.extension.trim().is_empty() {
            anyhow::bail!("scripts.extension must be set");
        }

        if self.scripts.extension.starts_with('.') {
            anyhow::bail!("scripts.extension must not start with a dot");
        }

        self.trust_level()?;

        if LogFormat::parse(&self.observability.log_format).is_none() {
            anyhow::bail!("observability.log_format must be one of: pretty, compact, json");
        }

        Ok(())
    }
}

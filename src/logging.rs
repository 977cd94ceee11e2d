//! Structured logging utilities for Hotscript
//!
//! All logs use structured fields so cache behaviour (loads, reloads,
//! evictions) can be followed from the log stream alone.
//!
//! # Log Format Conventions
//!
//! - `service`: The emitting component ("script.cache", "script.service")
//! - `operation`: What was being done ("lookup", "load", "reload", "sweep")
//! - `status`: The result ("success", "hit", "stale", "not_found", "error")
//! - `path`: Script file path
//! - `generation`: Load sequence number of the cache entry involved
//!
//! # Examples
//!
//! ```rust
//! use hotscript::logging::{operations, services, status};
//! use tracing::info;
//!
//! let path = std::path::Path::new("/srv/app/orders.lua");
//! info!(
//!     service = services::SCRIPT_CACHE,
//!     operation = operations::RELOAD,
//!     status = status::SUCCESS,
//!     path = %path.display(),
//!     generation = 7u64,
//!     "script loaded"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// Formatter that prints "(hotscript)" instead of the module path
struct HotscriptFormatter {
    with_ansi: bool,
}

impl<S, N> FormatEvent<S, N> for HotscriptFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let meta = event.metadata();

        write!(
            writer,
            "{} ",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f")
        )?;

        if self.with_ansi {
            let level_style = match *meta.level() {
                tracing::Level::ERROR => "\x1b[31m", // Red
                tracing::Level::WARN => "\x1b[33m",  // Yellow
                tracing::Level::INFO => "\x1b[32m",  // Green
                tracing::Level::DEBUG => "\x1b[34m", // Blue
                tracing::Level::TRACE => "\x1b[35m", // Magenta
            };
            write!(
                writer,
                "{}{:5}(hotscript)\x1b[0m: ",
                level_style,
                meta.level()
            )?;
        } else {
            write!(writer, "{:5}(hotscript): ", meta.level())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored
    Pretty,
    /// Same layout without colors (CI/production)
    Compact,
    /// JSON (log aggregation systems)
    Json,
}

impl LogFormat {
    /// Parse a format name; unknown names yield `None`
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }

    /// Read from HOTSCRIPT_LOG_FORMAT, then `configured`
    pub fn from_env(configured: Option<Self>) -> Self {
        std::env::var("HOTSCRIPT_LOG_FORMAT")
            .ok()
            .and_then(|v| Self::parse(&v))
            .or(configured)
            .unwrap_or_else(|| {
                // Default: pretty for dev, compact for CI
                if std::env::var("CI").is_ok() {
                    Self::Compact
                } else {
                    Self::Pretty
                }
            })
    }
}

/// Initialize the global tracing subscriber
///
/// # Environment Variables
///
/// - `RUST_LOG`: Log filter (e.g., "debug", "hotscript=trace"); defaults to `default_level`
/// - `HOTSCRIPT_LOG_FORMAT`: "pretty", "compact" or "json"; overrides `format`
/// - `CI`: If set and no format is given, defaults to compact format
///
/// Logs go to stderr so stdout stays free for command output.
pub fn init(default_level: &str, format: Option<LogFormat>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match LogFormat::from_env(format) {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(HotscriptFormatter { with_ansi: true })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(HotscriptFormatter { with_ansi: false })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false)
                    .with_writer(io::stderr)
                    .json(),
            )
            .try_init(),
    };

    // Already initialized (tests, embedding applications)
    let _ = result;
}

/// Service names
pub mod services {
    pub const SCRIPT_CACHE: &str = "script.cache";
    pub const SCRIPT_SERVICE: &str = "script.service";
    pub const SERVE: &str = "serve";
}

/// Operation names
pub mod operations {
    pub const LOOKUP: &str = "lookup";
    pub const LOAD: &str = "load";
    pub const RELOAD: &str = "reload";
    pub const SWEEP: &str = "sweep";
    pub const EVICT: &str = "evict";
    pub const INVOKE: &str = "invoke";
    pub const CONSTRUCT: &str = "construct";
    pub const DISPATCH: &str = "dispatch";
}

/// Status values
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const HIT: &str = "hit";
    pub const STALE: &str = "stale";
    pub const ERROR: &str = "error";
    pub const NOT_FOUND: &str = "not_found";
}

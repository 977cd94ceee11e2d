use clap::{Args, Parser, Subcommand};

/// Hotscript - Hot-reloading script runner
///
/// Hotscript compiles Lua scripts on first use, keeps them cached, reloads
/// them when the file changes on disk and evicts the ones nobody uses.
#[derive(Parser, Debug)]
#[command(name = "hotscript")]
#[command(author = "Hotscript Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Hot-reloading script runner", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Common configuration arguments shared across commands
#[derive(Args, Debug, Clone, Default)]
pub struct CommonConfigArgs {
    /// Config file path
    #[arg(short = 'c', long, env = "HOTSCRIPT_CONFIG")]
    pub config: Option<String>,

    /// Script root directory
    #[arg(long, env = "HOTSCRIPT_ROOT")]
    pub root: Option<String>,

    /// How long an idle script stays cached (e.g., "10m", "30s")
    #[arg(long, env = "HOTSCRIPT_MAX_HOLD")]
    pub max_hold: Option<String>,

    /// Minimum time between eviction sweeps (e.g., "1m")
    #[arg(long, env = "HOTSCRIPT_CHECK_DELAY")]
    pub check_delay: Option<String>,

    /// Sandbox trust level (basic|file_read|elevated)
    #[arg(long, env = "HOTSCRIPT_TRUST")]
    pub trust: Option<String>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, env = "HOTSCRIPT_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Construct a service and call one of its methods
    Run(RunArgs),

    /// Call a module function of a script file
    Call(CallArgs),

    /// Answer JSON-lines requests from stdin with a shared script cache
    Serve(ServeArgs),

    /// Configuration management utilities
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonConfigArgs,

    /// Dotted service name (e.g., "billing.Invoice")
    pub service: String,

    /// Method to call on the constructed instance
    pub method: String,

    /// JSON input passed to the method
    #[arg(long, default_value = "null")]
    pub input: String,
}

#[derive(Parser, Debug)]
pub struct CallArgs {
    #[command(flatten)]
    pub common: CommonConfigArgs,

    /// Script path, relative to the root (extension optional)
    pub script: String,

    /// Module function to call
    pub function: String,

    /// Arguments, one JSON value each
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub common: CommonConfigArgs,

    /// Maximum number of requests executing at once
    #[arg(long, default_value = "8")]
    pub concurrency: usize,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Validate {
        /// Path to config file
        path: String,
    },
    /// Generate example config file
    Generate,
    /// Show effective configuration (merged from all sources)
    Show {
        #[command(flatten)]
        common: CommonConfigArgs,
    },
}

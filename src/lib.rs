// Library interface for Hotscript
// This allows integration tests and embedding applications to use the cache directly

pub mod cache;
pub mod clock;
pub mod config;
pub mod config_discovery;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod service;

// Re-export commonly used types
pub use cache::{
    CacheEntry, CacheSettings, CacheStatsSnapshot, EntryInfo, ExecutionGuard, Lookup, ScriptCache,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::HotscriptConfig;
pub use config_discovery::{discover_config, load_config_with_discovery};
pub use error::ScriptError;
pub use runtime::{
    FileStat, LuaInstance, LuaRuntime, LuaUnit, RuntimeError, ScriptRuntime, SystemFileStat,
    TrustLevel,
};
pub use service::{BoundMethod, ExecutionReturn, ScriptService};

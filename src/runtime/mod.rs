//! Script runtime collaborators
//!
//! The cache never compiles or executes anything itself. It talks to two
//! collaborators:
//! - [`FileStat`]: reports a script file's modification time
//! - [`ScriptRuntime`]: turns a file into a compiled unit, resolves members
//!   on it and invokes them
//!
//! Values cross the runtime boundary as `serde_json::Value`.

use serde_json::Value;
use std::path::Path;
use std::time::SystemTime;
use thiserror::Error;

pub mod lua;
pub mod sandbox;

pub use lua::{LuaInstance, LuaMember, LuaRuntime, LuaUnit};
pub use sandbox::TrustLevel;

/// Failure reported by a [`ScriptRuntime`]
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RuntimeError {
    message: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<mlua::Error> for RuntimeError {
    fn from(err: mlua::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Modification-time lookup for script files
pub trait FileStat: Send + Sync {
    /// Last modification time, or `None` if the file does not exist
    fn modified(&self, path: &Path) -> Option<SystemTime>;
}

/// [`FileStat`] backed by the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFileStat;

impl FileStat for SystemFileStat {
    fn modified(&self, path: &Path) -> Option<SystemTime> {
        let metadata = std::fs::metadata(path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        metadata.modified().ok()
    }
}

/// Compiles script files and invokes their members
///
/// `Unit` is the compiled, invocable form of one file. The cache owns units
/// and hands out shared borrows, so a unit must tolerate concurrent calls.
pub trait ScriptRuntime: Send + Sync + 'static {
    type Unit: Send + Sync + 'static;
    type Member: Send + Sync;
    type Instance: Send + Sync;

    /// Compile or load the script at `path`
    fn load(&self, path: &Path) -> Result<Self::Unit, RuntimeError>;

    /// Find an invocable member by name
    fn resolve_member(&self, unit: &Self::Unit, name: &str) -> Result<Self::Member, RuntimeError>;

    /// Invoke a member, optionally against an instance
    fn invoke(
        &self,
        member: &Self::Member,
        instance: Option<&Self::Instance>,
        args: &[Value],
    ) -> Result<Value, RuntimeError>;

    /// Run the unit's constructor
    fn invoke_constructor(
        &self,
        unit: &Self::Unit,
        args: &[Value],
    ) -> Result<Self::Instance, RuntimeError>;
}

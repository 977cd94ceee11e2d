//! Lua sandbox restrictions per compiled unit
//!
//! Every unit gets its own VM created with a restricted set of standard
//! libraries. `io`, `os` and `package` are only opened for trusted scripts.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib};
use serde::{Deserialize, Serialize};

/// Controls which Lua standard libraries are available to a script
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// table, string, math, coroutine, utf8 (no I/O or OS access)
    #[default]
    Basic,
    /// Basic + io
    FileRead,
    /// Full safe standard library
    Elevated,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::FileRead => "file_read",
            Self::Elevated => "elevated",
        }
    }

    fn std_libs(&self) -> StdLib {
        let basic =
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE | StdLib::UTF8;
        match self {
            Self::Basic => basic,
            Self::FileRead => basic | StdLib::IO,
            Self::Elevated => basic | StdLib::IO | StdLib::OS | StdLib::PACKAGE,
        }
    }
}

impl std::str::FromStr for TrustLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "file_read" | "file-read" => Ok(Self::FileRead),
            "elevated" => Ok(Self::Elevated),
            _ => anyhow::bail!(
                "Invalid trust level: {}. Must be basic, file_read, or elevated",
                s
            ),
        }
    }
}

/// Creates a new Lua VM with sandbox restrictions applied
pub fn create_sandboxed_vm(trust: TrustLevel) -> LuaResult<Lua> {
    Lua::new_with(trust.std_libs(), LuaOptions::default())
}

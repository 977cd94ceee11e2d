//! Lua implementation of [`ScriptRuntime`]
//!
//! A script is a Lua chunk that returns a table. That table is the module:
//! its function fields are the members callers resolve by name, and `new`
//! (when present) is the constructor.
//!
//! ```lua
//! local Orders = {}
//!
//! function Orders.new(prefix)
//!   return setmetatable({ prefix = prefix or "order" }, { __index = Orders })
//! end
//!
//! function Orders:describe(input)
//!   return { name = self.prefix .. "-" .. input.id }
//! end
//!
//! return Orders
//! ```
//!
//! Each compiled unit owns a dedicated, sandboxed VM. Handles to members and
//! instances keep that VM alive, so a unit dropped from the cache stays
//! usable by whoever still holds one of them.

use mlua::{
    Function, Lua, LuaSerdeExt, MultiValue, Result as LuaResult, SerializeOptions, Table,
    Value as LuaValue,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::sandbox::{create_sandboxed_vm, TrustLevel};
use super::{RuntimeError, ScriptRuntime};

/// Name of the constructor function looked up on a module
pub const CONSTRUCTOR: &str = "new";

struct LuaState {
    // Declared before `lua` so the module reference is released first
    module: Table,
    lua: Lua,
    path: PathBuf,
}

/// Compiled Lua script: a VM plus the module table the chunk returned
#[derive(Clone)]
pub struct LuaUnit {
    state: Arc<LuaState>,
}

impl LuaUnit {
    /// Path the unit was loaded from
    pub fn path(&self) -> &Path {
        &self.state.path
    }

    /// Names of the module's function members, sorted
    pub fn members(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .module
            .pairs::<LuaValue, LuaValue>()
            .filter_map(|pair| match pair {
                Ok((LuaValue::String(key), LuaValue::Function(_))) => {
                    key.to_str().ok().map(|s| s.to_string())
                }
                _ => None,
            })
            .collect();
        names.sort();
        names
    }

    fn same_vm(&self, other: &LuaUnit) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl std::fmt::Debug for LuaUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuaUnit")
            .field("path", &self.state.path)
            .finish()
    }
}

/// Resolved module function
pub struct LuaMember {
    func: Function,
    name: String,
    unit: LuaUnit,
}

impl LuaMember {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Object created by a module's constructor
pub struct LuaInstance {
    table: Table,
    unit: LuaUnit,
}

impl LuaInstance {
    /// Read a field of the instance as JSON
    pub fn field(&self, name: &str) -> Result<Value, RuntimeError> {
        let value: LuaValue = self.table.get(name)?;
        Ok(self.unit.state.lua.from_value(value)?)
    }
}

/// Lua script runtime
#[derive(Debug, Clone, Default)]
pub struct LuaRuntime {
    trust: TrustLevel,
}

impl LuaRuntime {
    pub fn new(trust: TrustLevel) -> Self {
        Self { trust }
    }

    pub fn trust(&self) -> TrustLevel {
        self.trust
    }
}

impl ScriptRuntime for LuaRuntime {
    type Unit = LuaUnit;
    type Member = LuaMember;
    type Instance = LuaInstance;

    fn load(&self, path: &Path) -> Result<LuaUnit, RuntimeError> {
        let source = std::fs::read_to_string(path)?;

        let lua = create_sandboxed_vm(self.trust)?;
        register_log(&lua, path)?;

        let value: LuaValue = lua
            .load(source.as_str())
            .set_name(format!("@{}", path.display()))
            .eval()?;

        let module = match value {
            LuaValue::Table(table) => table,
            other => {
                return Err(RuntimeError::new(format!(
                    "script {} must return a table, got {}",
                    path.display(),
                    other.type_name()
                )))
            }
        };

        Ok(LuaUnit {
            state: Arc::new(LuaState {
                module,
                lua,
                path: path.to_path_buf(),
            }),
        })
    }

    fn resolve_member(&self, unit: &LuaUnit, name: &str) -> Result<LuaMember, RuntimeError> {
        let value: LuaValue = unit.state.module.get(name)?;
        match value {
            LuaValue::Function(func) => Ok(LuaMember {
                func,
                name: name.to_string(),
                unit: unit.clone(),
            }),
            LuaValue::Nil => Err(RuntimeError::new(format!("no member named `{}`", name))),
            other => Err(RuntimeError::new(format!(
                "member `{}` is a {}, not a function",
                name,
                other.type_name()
            ))),
        }
    }

    fn invoke(
        &self,
        member: &LuaMember,
        instance: Option<&LuaInstance>,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let state = &member.unit.state;

        let mut values = Vec::with_capacity(args.len() + 1);
        if let Some(instance) = instance {
            if !instance.unit.same_vm(&member.unit) {
                return Err(RuntimeError::new(format!(
                    "instance of {} cannot be passed to `{}` of {}",
                    instance.unit.path().display(),
                    member.name,
                    member.unit.path().display()
                )));
            }
            values.push(LuaValue::Table(instance.table.clone()));
        }
        values.extend(to_lua_values(&state.lua, args)?);

        let ret: LuaValue = member.func.call(MultiValue::from_vec(values))?;
        Ok(state.lua.from_value(ret)?)
    }

    fn invoke_constructor(&self, unit: &LuaUnit, args: &[Value]) -> Result<LuaInstance, RuntimeError> {
        let state = &unit.state;

        let ctor: LuaValue = state.module.get(CONSTRUCTOR)?;
        let table = match ctor {
            LuaValue::Function(func) => {
                let values = to_lua_values(&state.lua, args)?;
                let ret: LuaValue = func.call(MultiValue::from_vec(values))?;
                match ret {
                    LuaValue::Table(table) => table,
                    other => {
                        return Err(RuntimeError::new(format!(
                            "constructor returned a {}, expected a table",
                            other.type_name()
                        )))
                    }
                }
            }
            // Default constructor: an empty object whose methods come from the module
            LuaValue::Nil => {
                let table = state.lua.create_table()?;
                let metatable = state.lua.create_table()?;
                metatable.set("__index", state.module.clone())?;
                table.set_metatable(Some(metatable));
                table
            }
            other => {
                return Err(RuntimeError::new(format!(
                    "`{}` is a {}, not a function",
                    CONSTRUCTOR,
                    other.type_name()
                )))
            }
        };

        Ok(LuaInstance {
            table,
            unit: unit.clone(),
        })
    }
}

fn to_lua_values(lua: &Lua, args: &[Value]) -> LuaResult<Vec<LuaValue>> {
    // JSON null arrives as Lua nil
    let options = SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false);
    args.iter()
        .map(|arg| lua.to_value_with(arg, options))
        .collect()
}

/// Expose `log.debug/info/warn/error` to the script, routed to tracing
fn register_log(lua: &Lua, path: &Path) -> LuaResult<()> {
    let log_tbl = lua.create_table()?;

    macro_rules! log_fn {
        ($level:ident) => {{
            let script = path.display().to_string();
            lua.create_function(move |_, msg: String| {
                tracing::$level!(script = %script, "{}", msg);
                Ok(())
            })?
        }};
    }

    log_tbl.set("debug", log_fn!(debug))?;
    log_tbl.set("info", log_fn!(info))?;
    log_tbl.set("warn", log_fn!(warn))?;
    log_tbl.set("error", log_fn!(error))?;
    lua.globals().set("log", log_tbl)?;
    Ok(())
}

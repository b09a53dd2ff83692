//! The embedded Lua state.

use mlua::{Function, Lua, LuaOptions, StdLib, Table, Value};

use crate::error::ScriptError;

/// Declared parameter list of a Lua function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub params: usize,
    pub variadic: bool,
}

impl Arity {
    /// Declares exactly `count` named parameters and no `...`
    pub fn is_exactly(&self, count: usize) -> bool {
        !self.variadic && self.params == count
    }
}

/// One Lua state holding every loaded script's globals
pub struct LuaRuntime {
    lua: Lua,
    getinfo: Function,
}

impl LuaRuntime {
    pub fn new() -> Result<Self, ScriptError> {
        // SAFETY: the debug library is loaded only so the host can read
        // function signatures. The global is removed before any script
        // source is evaluated, leaving `getinfo` reachable from Rust only.
        let lua = unsafe { Lua::unsafe_new_with(StdLib::ALL_SAFE | StdLib::DEBUG, LuaOptions::new()) };

        let debug: Table = lua.globals().get("debug")?;
        let getinfo: Function = debug.get("getinfo")?;
        lua.globals().set("debug", Value::Nil)?;

        Ok(Self { lua, getinfo })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Run a script's top-level chunk
    pub fn eval(&self, name: &str, source: &str) -> Result<(), ScriptError> {
        self.lua.load(source).set_name(format!("@{name}")).exec()?;
        Ok(())
    }

    /// Look up a global handler function by name
    pub fn function(&self, name: &str) -> Result<Function, ScriptError> {
        match self.lua.globals().get::<Value>(name)? {
            Value::Function(f) => Ok(f),
            _ => Err(ScriptError::HandlerMissing(name.to_string())),
        }
    }

    pub fn arity(&self, function: &Function) -> Result<Arity, ScriptError> {
        let info: Table = self.getinfo.call((function.clone(), "u"))?;
        Ok(Arity {
            params: info.get("nparams")?,
            variadic: info.get("isvararg")?,
        })
    }
}

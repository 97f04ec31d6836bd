/// `scripting/sandbox.rs`: Lua sandbox restrictions per script
///
/// Every script VM is created with a restricted set of standard libraries.
/// Dangerous libraries (os, io, debug, package) are omitted by default.
/// Scripts can be granted additional trust levels through the configuration.
use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib};
use serde::{Deserialize, Serialize};

/// Controls which Lua standard libraries are available to a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// string, table, math, coroutine, utf8: no I/O or OS
    #[default]
    Basic,
    /// Basic + io (for reading asset manifests and the like)
    FileRead,
    /// Full safe standard library
    Elevated,
}

impl TrustLevel {
    pub fn std_libs(self) -> StdLib {
        let basic = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE | StdLib::UTF8;
        match self {
            TrustLevel::Basic => basic,
            TrustLevel::FileRead => basic | StdLib::IO,
            TrustLevel::Elevated => basic | StdLib::IO | StdLib::OS | StdLib::PACKAGE,
        }
    }

    /// Raw file reads and writes from script code. Asset loaders
    /// (`LoadTexture`, `LoadSound`, ...) read files at every level.
    pub fn allows_file_access(self) -> bool {
        self != TrustLevel::Basic
    }

    pub fn name(self) -> &'static str {
        match self {
            TrustLevel::Basic => "basic",
            TrustLevel::FileRead => "file_read",
            TrustLevel::Elevated => "elevated",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "basic" => Some(TrustLevel::Basic),
            "file_read" => Some(TrustLevel::FileRead),
            "elevated" => Some(TrustLevel::Elevated),
            _ => None,
        }
    }
}

/// Creates a new Lua VM with sandbox restrictions applied.
pub fn create_sandboxed_vm(trust: TrustLevel) -> LuaResult<Lua> {
    let lua = Lua::new_with(trust.std_libs(), LuaOptions::default())?;
    log::debug!("created Lua VM with trust level {trust:?}");
    Ok(lua)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_global(lua: &Lua, name: &str) -> bool {
        !matches!(lua.globals().get::<mlua::Value>(name).unwrap(), mlua::Value::Nil)
    }

    #[test]
    fn basic_vm_has_no_io_or_os() {
        let lua = create_sandboxed_vm(TrustLevel::Basic).unwrap();
        assert!(has_global(&lua, "string"));
        assert!(has_global(&lua, "math"));
        assert!(!has_global(&lua, "io"));
        assert!(!has_global(&lua, "os"));
    }

    #[test]
    fn trust_levels_widen_access() {
        let lua = create_sandboxed_vm(TrustLevel::FileRead).unwrap();
        assert!(has_global(&lua, "io"));
        assert!(!has_global(&lua, "os"));

        let lua = create_sandboxed_vm(TrustLevel::Elevated).unwrap();
        assert!(has_global(&lua, "os"));
        assert!(has_global(&lua, "require"));
    }

    #[test]
    fn trust_level_parses_cli_names() {
        assert_eq!(TrustLevel::parse("file_read"), Some(TrustLevel::FileRead));
        assert_eq!(TrustLevel::parse("root"), None);
    }
}

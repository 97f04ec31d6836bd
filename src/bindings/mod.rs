/// `bindings/`: the Lua-facing API
///
/// A flat namespace of globals named after the native functions. Each area
/// registers its own functions; all of them share one `BindingEnv`.
use std::sync::Arc;

use mlua::{IntoLuaMulti, Lua, Result as LuaResult};

use crate::{
    marshal::{
        args::{bind, Args},
        handle::{self, NativeResource},
        values::Color,
    },
    error::BindError,
    native::{types, NativeLibrary},
    scripting::{sandbox::TrustLevel, trampoline::Trampoline},
};

pub mod audio;
pub mod math;
pub mod models;
pub mod shapes;
pub mod text;
pub mod textures;
pub mod window;

pub use window::{ScriptLog, ScriptLogEntry};

/// What every bound function may reach.
#[derive(Clone)]
pub struct BindingEnv {
    pub library: Arc<NativeLibrary>,
    pub trampoline: Arc<Trampoline>,
    pub log: ScriptLog,
    pub trust: TrustLevel,
}

/// Fail `function` unless `trust` permits raw file access.
pub(crate) fn require_file_access(trust: TrustLevel, function: &'static str) -> Result<(), BindError> {
    if trust.allows_file_access() {
        Ok(())
    } else {
        Err(BindError::NotPermitted { function, required: TrustLevel::FileRead.name() })
    }
}

/// Register the whole API surface on `lua`.
pub fn register_all(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    window::register(lua, env)?;
    shapes::register(lua, env)?;
    math::register(lua)?;
    textures::register(lua, env)?;
    text::register(lua, env)?;
    models::register(lua, env)?;
    audio::register(lua, env)?;
    register_constants(lua)?;
    Ok(())
}

/// Bind `name` to a function that also gets the shared native library.
pub(crate) fn bind_lib<R, F>(lua: &Lua, env: &BindingEnv, name: &'static str, f: F) -> LuaResult<()>
where
    R: IntoLuaMulti,
    F: Fn(&Lua, &NativeLibrary, Args) -> LuaResult<R> + Send + 'static,
{
    let library = Arc::clone(&env.library);
    bind(lua, name, move |lua, args| f(lua, &library, args))
}

/// Bind `name` to the unload call for handles of type `T`.
pub(crate) fn bind_release<T: NativeResource>(lua: &Lua, env: &BindingEnv, name: &'static str) -> LuaResult<()> {
    bind_lib(lua, env, name, |_, lib, args| {
        let cell = args.handle_cell::<T>(1)?;
        handle::release::<T>(lib, &cell)?;
        Ok(())
    })
}

// ── Constants ─────────────────────────────────────────────────────────────────

pub const LOG_ALL: i32 = 0;
pub const LOG_TRACE: i32 = 1;
pub const LOG_DEBUG: i32 = 2;
pub const LOG_INFO: i32 = 3;
pub const LOG_WARNING: i32 = 4;
pub const LOG_ERROR: i32 = 5;
pub const LOG_FATAL: i32 = 6;
pub const LOG_NONE: i32 = 7;

const INT_CONSTANTS: &[(&str, i32)] = &[
    ("LOG_ALL", LOG_ALL),
    ("LOG_TRACE", LOG_TRACE),
    ("LOG_DEBUG", LOG_DEBUG),
    ("LOG_INFO", LOG_INFO),
    ("LOG_WARNING", LOG_WARNING),
    ("LOG_ERROR", LOG_ERROR),
    ("LOG_FATAL", LOG_FATAL),
    ("LOG_NONE", LOG_NONE),
    ("PIXELFORMAT_UNCOMPRESSED_GRAYSCALE", 1),
    ("PIXELFORMAT_UNCOMPRESSED_GRAY_ALPHA", 2),
    ("PIXELFORMAT_UNCOMPRESSED_R5G6B5", 3),
    ("PIXELFORMAT_UNCOMPRESSED_R8G8B8", 4),
    ("PIXELFORMAT_UNCOMPRESSED_R5G5B5A1", 5),
    ("PIXELFORMAT_UNCOMPRESSED_R4G4B4A4", 6),
    ("PIXELFORMAT_UNCOMPRESSED_R8G8B8A8", types::PIXELFORMAT_UNCOMPRESSED_R8G8B8A8),
    ("PIXELFORMAT_UNCOMPRESSED_R32", 8),
    ("PIXELFORMAT_UNCOMPRESSED_R32G32B32", 9),
    ("PIXELFORMAT_UNCOMPRESSED_R32G32B32A32", 10),
    ("CUBEMAP_LAYOUT_AUTO_DETECT", types::CUBEMAP_LAYOUT_AUTO_DETECT),
    ("CUBEMAP_LAYOUT_LINE_VERTICAL", types::CUBEMAP_LAYOUT_LINE_VERTICAL),
    ("CUBEMAP_LAYOUT_LINE_HORIZONTAL", types::CUBEMAP_LAYOUT_LINE_HORIZONTAL),
    ("CUBEMAP_LAYOUT_CROSS_THREE_BY_FOUR", types::CUBEMAP_LAYOUT_CROSS_THREE_BY_FOUR),
    ("CUBEMAP_LAYOUT_CROSS_FOUR_BY_THREE", types::CUBEMAP_LAYOUT_CROSS_FOUR_BY_THREE),
    ("NPATCH_NINE_PATCH", types::NPATCH_NINE_PATCH),
    ("NPATCH_THREE_PATCH_VERTICAL", types::NPATCH_THREE_PATCH_VERTICAL),
    ("NPATCH_THREE_PATCH_HORIZONTAL", types::NPATCH_THREE_PATCH_HORIZONTAL),
];

fn register_constants(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();
    for &(name, value) in INT_CONSTANTS {
        globals.set(name, value)?;
    }
    for &(name, color) in Color::PALETTE.iter() {
        globals.set(name, color)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use mlua::Lua;

    use super::{register_all, BindingEnv};
    use crate::{
        config::{AudioConfig, CallbackNames, HeadlessConfig},
        native::NativeLibrary,
        scripting::{
            sandbox::TrustLevel,
            trampoline::{ScriptContext, ScriptGate, Trampoline},
        },
    };

    /// A Lua state with the full API over a device-less library.
    pub(crate) fn lua_with_api() -> (Lua, BindingEnv) {
        lua_with_trust(TrustLevel::FileRead)
    }

    pub(crate) fn lua_with_trust(trust: TrustLevel) -> (Lua, BindingEnv) {
        let lua = Lua::new();
        let library = Arc::new(NativeLibrary::new(
            HeadlessConfig { frame_limit: Some(3), ..Default::default() },
            AudioConfig { open_device: false, sample_rate: 100, stream_buffer_frames: 8, ..Default::default() },
        ));
        let trampoline = Trampoline::new(CallbackNames::default());
        trampoline.bind(ScriptContext { lua: lua.clone(), gate: ScriptGate::new() });
        let env = BindingEnv { library, trampoline, log: Arc::new(Mutex::new(Vec::new())), trust };
        register_all(&lua, &env).unwrap();
        (lua, env)
    }

    /// Run `src` and return the message of the error it raises.
    pub(crate) fn error_of(lua: &Lua, src: &str) -> String {
        let chunk = format!("local ok, e = pcall(function() {src} end) assert(not ok, 'no error') return tostring(e)");
        lua.load(&chunk).eval::<String>().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::lua_with_api;
    use crate::marshal::values::Color;

    #[test]
    fn constants_are_globals() {
        let (lua, env) = lua_with_api();
        let (fmt, layout, red): (i32, i32, Color) = lua
            .load("return PIXELFORMAT_UNCOMPRESSED_R8G8B8A8, CUBEMAP_LAYOUT_LINE_HORIZONTAL, RED")
            .eval()
            .unwrap();
        assert_eq!((fmt, layout, red), (7, 2, Color::RED));
        env.trampoline.unbind();
    }

    #[test]
    fn red_color_scenario() {
        let (lua, env) = lua_with_api();
        lua.load(
            r#"
            InitWindow(64, 32, "red")
            BeginDrawing()
            ClearBackground({ r = 255, g = 0, b = 0, a = 255 })
            EndDrawing()
            "#,
        )
        .exec()
        .unwrap();
        let frame = env.library.presented_frame();
        assert_eq!(frame, vec![crate::native::DrawCommand::Clear(Color::new(255, 0, 0, 255))]);
        env.trampoline.unbind();
    }
}

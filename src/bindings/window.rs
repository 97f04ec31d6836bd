/// `bindings/window.rs`: window, timing, drawing frame, logging and file I/O
use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc, Mutex,
    },
    time::Instant,
};

use log::{Level, LevelFilter};
use mlua::{LightUserData, Lua, Result as LuaResult, Value, Variadic};
use serde::Serialize;

use super::{bind_lib, require_file_access, BindingEnv, LOG_ALL, LOG_DEBUG, LOG_ERROR, LOG_FATAL, LOG_INFO, LOG_TRACE, LOG_WARNING};
use crate::{
    marshal::{args::bind, values::Color},
    native::lock,
};

/// One line of script output (`TraceLog` or `print`).
#[derive(Debug, Clone, Serialize)]
pub struct ScriptLogEntry {
    pub level: String,
    pub message: String,
    pub timestamp: i64,
}

pub type ScriptLog = Arc<Mutex<Vec<ScriptLogEntry>>>;

fn push_entry(sink: &ScriptLog, level: &str, message: String) {
    lock(sink).push(ScriptLogEntry {
        level: level.to_string(),
        message,
        timestamp: chrono::Utc::now().timestamp(),
    });
}

fn level_name(level: i32) -> &'static str {
    match level {
        LOG_TRACE => "trace",
        LOG_DEBUG => "debug",
        LOG_INFO => "info",
        LOG_WARNING => "warning",
        LOG_ERROR => "error",
        LOG_FATAL => "fatal",
        _ => "other",
    }
}

fn log_level(level: i32) -> Level {
    match level {
        i32::MIN..=LOG_TRACE => Level::Trace,
        LOG_DEBUG => Level::Debug,
        LOG_INFO => Level::Info,
        LOG_WARNING => Level::Warn,
        _ => Level::Error,
    }
}

fn level_filter(level: i32) -> LevelFilter {
    match level {
        i32::MIN..=LOG_TRACE => LevelFilter::Trace,
        LOG_DEBUG => LevelFilter::Debug,
        LOG_INFO => LevelFilter::Info,
        LOG_WARNING => LevelFilter::Warn,
        LOG_ERROR | LOG_FATAL => LevelFilter::Error,
        _ => LevelFilter::Off,
    }
}

pub fn register(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    register_window(lua, env)?;
    register_logging(lua, env)?;
    register_files(lua, env)?;
    Ok(())
}

// ── Window & frame ────────────────────────────────────────────────────────────

fn register_window(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    bind_lib(lua, env, "InitWindow", |_, lib, args| {
        lib.init_window(args.get(1)?, args.get(2)?, &args.string(3)?);
        Ok(())
    })?;
    bind_lib(lua, env, "CloseWindow", |_, lib, _| {
        lib.close_window();
        Ok(())
    })?;
    let trampoline = Arc::clone(&env.trampoline);
    bind_lib(lua, env, "WindowShouldClose", move |_, lib, _| {
        trampoline.serve_pending();
        Ok(lib.window_should_close())
    })?;
    bind_lib(lua, env, "IsWindowReady", |_, lib, _| Ok(lib.is_window_ready()))?;
    bind_lib(lua, env, "GetScreenWidth", |_, lib, _| Ok(lib.screen_width()))?;
    bind_lib(lua, env, "GetScreenHeight", |_, lib, _| Ok(lib.screen_height()))?;
    bind_lib(lua, env, "SetTargetFPS", |_, lib, args| {
        lib.set_target_fps(args.get(1)?);
        Ok(())
    })?;
    bind_lib(lua, env, "GetFrameTime", |_, lib, _| Ok(lib.frame_time()))?;
    bind_lib(lua, env, "GetTime", |_, lib, _| Ok(lib.time()))?;
    bind_lib(lua, env, "BeginDrawing", |_, lib, _| {
        lib.begin_drawing();
        Ok(())
    })?;
    // Audio callbacks posted during the frame run while its budget drains.
    let trampoline = Arc::clone(&env.trampoline);
    bind_lib(lua, env, "EndDrawing", move |_, lib, _| {
        lib.end_drawing_with(|wait| {
            trampoline.serve_until(Instant::now() + wait);
        });
        Ok(())
    })?;
    bind_lib(lua, env, "ClearBackground", |_, lib, args| {
        lib.clear_background(args.get::<Color>(1)?);
        Ok(())
    })?;
    Ok(())
}

// ── Logging ───────────────────────────────────────────────────────────────────

fn register_logging(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    // Messages below this level are dropped, as the native TraceLog does.
    let threshold = Arc::new(AtomicI32::new(LOG_INFO));

    let sink = Arc::clone(&env.log);
    let min = Arc::clone(&threshold);
    bind(lua, "TraceLog", move |_, args| {
        let level: i32 = args.get(1)?;
        let message = args.string(2)?;
        if level < min.load(Ordering::Relaxed) {
            return Ok(());
        }
        log::log!(target: "script", log_level(level), "{message}");
        push_entry(&sink, level_name(level), message.clone());
        if level == LOG_FATAL {
            return Err(mlua::Error::runtime(format!("fatal: {message}")));
        }
        Ok(())
    })?;

    let min = Arc::clone(&threshold);
    bind(lua, "SetTraceLogLevel", move |_, args| {
        let level: i32 = args.get(1)?;
        min.store(level.max(LOG_ALL), Ordering::Relaxed);
        log::set_max_level(level_filter(level));
        Ok(())
    })?;

    // `print` goes to the script log instead of stdout.
    let sink = Arc::clone(&env.log);
    let print = lua.create_function(move |_, values: Variadic<Value>| {
        let parts: Vec<String> = values
            .iter()
            .map(|v| v.to_string().unwrap_or_else(|_| v.type_name().to_string()))
            .collect();
        let line = parts.join("\t");
        log::info!(target: "script", "{line}");
        push_entry(&sink, "print", line);
        Ok(())
    })?;
    lua.globals().set("print", print)?;
    Ok(())
}

// ── Files ─────────────────────────────────────────────────────────────────────

fn register_files(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    let trust = env.trust;
    // Deferred release: the pointer stays valid until UnloadFileData.
    bind_lib(lua, env, "LoadFileData", move |_, lib, args| {
        require_file_access(trust, "LoadFileData")?;
        let data = lib.load_file_data(&args.string(1)?);
        if data.is_empty() {
            return Ok((Value::Nil, 0usize));
        }
        Ok((Value::LightUserData(LightUserData(data.ptr.cast())), data.len))
    })?;
    bind_lib(lua, env, "UnloadFileData", |_, lib, args| {
        lib.unload_file_data(args.light(1)?);
        Ok(())
    })?;
    bind_lib(lua, env, "LoadFileText", move |_, lib, args| {
        require_file_access(trust, "LoadFileText")?;
        Ok(lib.load_file_text(&args.string(1)?))
    })?;
    Ok(())
}

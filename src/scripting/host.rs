/// `scripting/host.rs`: one sandboxed Lua VM with the full API
///
/// The host owns the VM, the native library and the trampoline. Script code
/// runs while the host thread owns `gate`; audio callbacks arriving in the
/// meantime are posted to it and run at the script's yield points.
use std::{
    path::Path,
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use mlua::{Lua, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    sandbox::create_sandboxed_vm,
    trampoline::{ScriptContext, ScriptGate, Trampoline},
};
use crate::{
    bindings::{register_all, BindingEnv, ScriptLog, ScriptLogEntry},
    config::BindingConfig,
    native::{lock, NativeLibrary},
};

/// Entries kept in the host log across runs.
const MAX_LOG_ENTRIES: usize = 200;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("failed to create Lua VM: {0}")]
    Vm(#[source] mlua::Error),
    #[error("API registration failed: {0}")]
    Registration(#[source] mlua::Error),
    #[error("cannot read script {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ── Script run result ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptRunResult {
    pub success: bool,
    pub output: Vec<String>,
    pub error: Option<String>,
    pub error_line: Option<u32>,
}

// ── ScriptHost ────────────────────────────────────────────────────────────────

pub struct ScriptHost {
    lua: Lua,
    gate: Arc<ScriptGate>,
    library: Arc<NativeLibrary>,
    trampoline: Arc<Trampoline>,
    log: ScriptLog,
    /// Frames rendered per pump when no output device drives the mixer.
    pump_frames: usize,
    /// Wall time one pump stands for.
    pump_period: Duration,
}

impl ScriptHost {
    pub fn new(config: &BindingConfig) -> Result<Self, HostError> {
        let lua = create_sandboxed_vm(config.trust).map_err(HostError::Vm)?;
        let library = Arc::new(NativeLibrary::new(config.headless.clone(), config.audio.clone()));
        let trampoline = Trampoline::new(config.callbacks.clone());
        let log: ScriptLog = Arc::new(Mutex::new(Vec::new()));

        let env = BindingEnv {
            library: Arc::clone(&library),
            trampoline: Arc::clone(&trampoline),
            log: Arc::clone(&log),
            trust: config.trust,
        };
        register_all(&lua, &env).map_err(HostError::Registration)?;

        let gate = ScriptGate::new();
        trampoline.bind(ScriptContext { lua: lua.clone(), gate: Arc::clone(&gate) });
        log::debug!("script host ready (trust {:?})", config.trust);

        Ok(Self {
            lua,
            gate,
            library,
            trampoline,
            log,
            pump_frames: config.audio.stream_buffer_frames.max(1) as usize,
            pump_period: Duration::from_secs_f64(
                config.audio.stream_buffer_frames.max(1) as f64 / config.audio.sample_rate.max(1) as f64,
            ),
        })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn library(&self) -> &Arc<NativeLibrary> {
        &self.library
    }

    pub fn trampoline(&self) -> &Arc<Trampoline> {
        &self.trampoline
    }

    pub fn log_entries(&self) -> Vec<ScriptLogEntry> {
        lock(&self.log).clone()
    }

    // ── Script execution ──────────────────────────────────────────────────

    /// Run `source` as a chunk called `name`.
    pub fn run_source(&self, name: &str, source: &str) -> ScriptRunResult {
        let first = lock(&self.log).len();
        let outcome = {
            let _inside = self.gate.enter();
            self.lua.load(source).set_name(format!("@{name}")).exec()
        };
        self.finish(name, first, outcome)
    }

    pub fn run_file(&self, path: impl AsRef<Path>) -> Result<ScriptRunResult, HostError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| HostError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let name = path.file_name().map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        log::info!("running script {}", path.display());
        Ok(self.run_source(&name, &source))
    }

    /// Call the global function `name` with no arguments.
    pub fn call_global(&self, name: &str) -> ScriptRunResult {
        let first = lock(&self.log).len();
        let outcome = {
            let _inside = self.gate.enter();
            match self.lua.globals().get::<Value>(name) {
                Ok(Value::Function(f)) => f.call::<()>(()),
                Ok(_) => Err(mlua::Error::runtime(format!("global function '{name}' not defined"))),
                Err(e) => Err(e),
            }
        };
        self.finish(name, first, outcome)
    }

    fn finish(&self, name: &str, first: usize, outcome: mlua::Result<()>) -> ScriptRunResult {
        let mut entries = lock(&self.log);
        let output: Vec<String> = entries
            .iter()
            .skip(first)
            .map(|e| format!("[{}] {}", e.level, e.message))
            .collect();
        if entries.len() > MAX_LOG_ENTRIES {
            let skip = entries.len() - MAX_LOG_ENTRIES;
            entries.drain(..skip);
        }
        drop(entries);

        match outcome {
            Ok(()) => ScriptRunResult { success: true, output, error: None, error_line: None },
            Err(e) => {
                let error = e.to_string();
                log::error!("script {name} failed: {error}");
                ScriptRunResult { success: false, output, error_line: parse_error_line(&error), error: Some(error) }
            }
        }
    }

    // ── Audio linger ──────────────────────────────────────────────────────

    /// Wait, outside the VM, while voices are still playing. Without an
    /// output device the mixer is pumped here instead, one stream buffer per
    /// period. Streams never end on their own, so a playing stream lasts
    /// until `timeout`. Returns false when `timeout` ran out first.
    pub fn wait_for_audio(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        while self.library.any_audio_playing() {
            if started.elapsed() >= timeout {
                log::warn!("audio still playing after {timeout:?}, giving up");
                return false;
            }
            if self.library.has_audio_output() {
                thread::sleep(Duration::from_millis(20));
            } else {
                self.library.render_audio(self.pump_frames);
                thread::sleep(self.pump_period);
            }
        }
        true
    }
}

impl Drop for ScriptHost {
    fn drop(&mut self) {
        // The VM holds the library and the trampoline holds the VM.
        self.trampoline.unbind();
        if self.library.is_audio_device_ready() {
            self.library.close_audio_device();
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Line number of the first `:<line>:` in a Lua error message
/// (`main.lua:5: attempt to ...`).
fn parse_error_line(err: &str) -> Option<u32> {
    err.split(':')
        .skip(1)
        .zip(err.split(':').skip(2))
        .find_map(|(part, _)| part.parse::<u32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::super::trampoline::CallbackKind;
    use crate::{
        config::{AudioConfig, HeadlessConfig},
        scripting::sandbox::TrustLevel,
    };

    fn host() -> ScriptHost {
        let config = BindingConfig {
            audio: AudioConfig { open_device: false, sample_rate: 100, stream_buffer_frames: 8, ..Default::default() },
            ..Default::default()
        };
        ScriptHost::new(&config).unwrap()
    }

    #[test]
    fn run_captures_output() {
        let host = host();
        let result = host.run_source("main.lua", "print('hello', 2) TraceLog(LOG_WARNING, 'careful')");
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.output, vec!["[print] hello\t2".to_string(), "[warning] careful".to_string()]);
        assert_eq!(host.log_entries().len(), 2);
    }

    #[test]
    fn errors_carry_the_line() {
        let host = host();
        let result = host.run_source("main.lua", "local x = 1\n\nerror('boom')");
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or("").contains("boom"));
        assert_eq!(result.error_line, Some(3));
    }

    #[test]
    fn call_global_reports_missing_functions() {
        let host = host();
        assert!(host.run_source("main.lua", "function Tick() ticks = (ticks or 0) + 1 end").success);
        assert!(host.call_global("Tick").success);
        assert_eq!(host.lua().globals().get::<i64>("ticks").unwrap(), 1);

        let result = host.call_global("Missing");
        assert!(!result.success);
        assert!(result.error.unwrap().contains("'Missing' not defined"));
    }

    #[test]
    fn sandbox_follows_trust_level() {
        let host = host();
        assert!(!host.run_source("main.lua", "io.write('x')").success);

        let config = BindingConfig {
            trust: TrustLevel::FileRead,
            audio: AudioConfig { open_device: false, ..Default::default() },
            ..Default::default()
        };
        let trusted = ScriptHost::new(&config).unwrap();
        assert!(trusted.run_source("main.lua", "assert(io.open ~= nil)").success);
    }

    #[test]
    fn wait_pumps_audio_without_a_device() {
        let host = host();
        let path = std::env::temp_dir().join(format!("raylua-host-{}.wav", std::process::id()));
        crate::audio::decoder::export_wav(&path, &[0.1; 8], 100, 2).unwrap();
        host.lua().globals().set("path", path.to_str().unwrap()).unwrap();
        let result = host.run_source(
            "main.lua",
            r#"
            InitAudioDevice()
            sound = LoadSound(path)
            PlaySound(sound)
            function AudioMixedProcessor(buffer, frames) mixed = (mixed or 0) + frames end
            AttachAudioMixedProcessor()
            "#,
        );
        let _ = std::fs::remove_file(&path);
        assert!(result.success, "{:?}", result.error);
        assert!(host.wait_for_audio(Duration::from_secs(5)));
        assert!(host.lua().globals().get::<i64>("mixed").unwrap() >= 4);
        assert!(host.run_source("main.lua", "assert(not IsSoundPlaying(sound))").success);
    }

    #[test]
    fn audio_callbacks_run_during_a_drawing_loop() {
        let config = BindingConfig {
            audio: AudioConfig { open_device: false, ..Default::default() },
            headless: HeadlessConfig { frame_limit: Some(40), ..Default::default() },
            ..Default::default()
        };
        let host = ScriptHost::new(&config).unwrap();
        assert!(host.run_source("main.lua", "function AudioMixedProcessor() hits = (hits or 0) + 1 end").success);

        let trampoline = Arc::clone(host.trampoline());
        trampoline.register(CallbackKind::MixedProcessor);
        let stop = Arc::new(AtomicBool::new(false));
        let audio = thread::spawn({
            let stop = Arc::clone(&stop);
            move || {
                let mut buf = [0.0f32; 8];
                while !stop.load(Ordering::Relaxed) {
                    trampoline.invoke(CallbackKind::MixedProcessor, &mut buf, 2);
                    thread::sleep(Duration::from_millis(1));
                }
            }
        });

        let result = host.run_source(
            "main.lua",
            r#"
            InitWindow(64, 64, "loop")
            SetTargetFPS(200)
            local before = hits or 0
            while not WindowShouldClose() do
                BeginDrawing()
                EndDrawing()
            end
            during = (hits or 0) - before
            CloseWindow()
            "#,
        );
        stop.store(true, Ordering::Relaxed);
        audio.join().unwrap();

        assert!(result.success, "{:?}", result.error);
        assert!(host.lua().globals().get::<i64>("during").unwrap() > 0);
        assert!(host.trampoline().stats().invoked > 0);
    }

    #[test]
    fn missing_script_file_is_a_read_error() {
        let host = host();
        assert!(matches!(host.run_file("/nonexistent/main.lua"), Err(HostError::Read { .. })));
    }

    #[test]
    fn error_line_parsing() {
        assert_eq!(parse_error_line("runtime error: main.lua:12: boom"), Some(12));
        assert_eq!(parse_error_line("something odd"), None);
    }
}

/// `bindings/audio.rs`: audio device, waves, sounds, music, streams and
/// script-side audio callbacks
///
/// Audio callbacks are not Lua closures: each kind has one trampoline
/// callback object, installed natively and forwarding to a conventionally
/// named global (`AudioStreamProcessor`, `AudioMixedProcessor`,
/// `AudioStreamCallback`). Passing a function when attaching simply assigns
/// that global first.
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use mlua::{Lua, Result as LuaResult};

use super::{bind_lib, bind_release, require_file_access, BindingEnv};
use crate::{
    audio::mixer::AudioCallback,
    error::BindError,
    marshal::{
        args::{bind, Args},
        array::encode_array,
        handle::{self, wrap},
    },
    native::{
        lock,
        types::{AudioStream, Music, Sound, Wave},
        NativeLibrary,
    },
    scripting::trampoline::{read_sample, write_sample, CallbackKind, Trampoline},
};

pub fn register(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    register_device(lua, env)?;
    register_waves(lua, env)?;
    register_sounds(lua, env)?;
    register_music(lua, env)?;
    register_streams(lua, env)?;
    register_callbacks(lua, env)?;
    Ok(())
}

fn register_device(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    bind_lib(lua, env, "InitAudioDevice", |_, lib, _| {
        lib.init_audio_device();
        Ok(())
    })?;
    bind_lib(lua, env, "CloseAudioDevice", |_, lib, _| {
        lib.close_audio_device();
        Ok(())
    })?;
    bind_lib(lua, env, "IsAudioDeviceReady", |_, lib, _| Ok(lib.is_audio_device_ready()))?;
    bind_lib(lua, env, "SetMasterVolume", |_, lib, args| {
        lib.set_master_volume(args.get(1)?);
        Ok(())
    })?;
    bind_lib(lua, env, "GetMasterVolume", |_, lib, _| Ok(lib.get_master_volume()))?;
    Ok(())
}

// ── Waves ─────────────────────────────────────────────────────────────────────

/// File bytes given either as a Lua string or as the `(pointer, size)` pair
/// returned by `LoadFileData`.
fn file_bytes(lib: &NativeLibrary, args: &Args, position: usize) -> Result<Vec<u8>, BindError> {
    if let Ok(bytes) = args.bytes(position) {
        return Ok(bytes);
    }
    let ptr = args.light(position)?;
    let size: u32 = args.get(position + 1)?;
    lib.file_data_bytes(ptr, size as usize).ok_or(BindError::ArgumentType {
        function: args.function(),
        position,
        expected: "file data from LoadFileData",
        got: "unknown pointer".to_string(),
    })
}

fn register_waves(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    bind_lib(lua, env, "LoadWave", |lua, lib, args| wrap(lua, lib.load_wave(&args.string(1)?)))?;
    bind_lib(lua, env, "LoadWaveFromMemory", |lua, lib, args| {
        let file_type = args.string(1)?;
        let bytes = file_bytes(lib, &args, 2)?;
        wrap(lua, lib.load_wave_from_memory(&file_type, &bytes))
    })?;
    bind_lib(lua, env, "IsWaveValid", |_, lib, args| Ok(lib.is_wave_valid(&args.handle(1)?)))?;
    bind_lib(lua, env, "WaveCopy", |lua, lib, args| {
        let wave: Wave = args.handle(1)?;
        wrap(lua, lib.wave_copy(&wave))
    })?;
    bind_lib(lua, env, "WaveCrop", |_, lib, args| {
        let cell = args.handle_cell::<Wave>(1)?;
        let (init, last) = (args.get(2)?, args.get(3)?);
        handle::with_handle(&cell, |wave: &mut Wave| lib.wave_crop(wave, init, last))?;
        Ok(())
    })?;
    // Copy-out: the sample array is released before returning.
    bind_lib(lua, env, "LoadWaveSamples", |lua, lib, args| {
        let wave: Wave = args.handle(1)?;
        let samples = lib.load_wave_samples(&wave);
        // SAFETY: `samples` holds `len` library-owned floats until the unload below.
        let table = unsafe { encode_array(lua, samples.ptr, samples.len) };
        lib.unload_wave_samples(samples);
        table
    })?;
    let trust = env.trust;
    bind_lib(lua, env, "ExportWave", move |_, lib, args| {
        require_file_access(trust, "ExportWave")?;
        let wave: Wave = args.handle(1)?;
        Ok(lib.export_wave(&wave, &args.string(2)?))
    })?;
    bind_release::<Wave>(lua, env, "UnloadWave")?;
    Ok(())
}

// ── Sounds ────────────────────────────────────────────────────────────────────

fn register_sounds(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    bind_lib(lua, env, "LoadSound", |lua, lib, args| wrap(lua, lib.load_sound(&args.string(1)?)))?;
    bind_lib(lua, env, "LoadSoundFromWave", |lua, lib, args| {
        let wave: Wave = args.handle(1)?;
        wrap(lua, lib.load_sound_from_wave(&wave))
    })?;
    bind_lib(lua, env, "IsSoundValid", |_, lib, args| Ok(lib.is_sound_valid(&args.handle(1)?)))?;
    bind_lib(lua, env, "PlaySound", |_, lib, args| {
        lib.play_sound(&args.handle(1)?);
        Ok(())
    })?;
    bind_lib(lua, env, "StopSound", |_, lib, args| {
        lib.stop_sound(&args.handle(1)?);
        Ok(())
    })?;
    bind_lib(lua, env, "PauseSound", |_, lib, args| {
        lib.pause_sound(&args.handle(1)?);
        Ok(())
    })?;
    bind_lib(lua, env, "ResumeSound", |_, lib, args| {
        lib.resume_sound(&args.handle(1)?);
        Ok(())
    })?;
    bind_lib(lua, env, "IsSoundPlaying", |_, lib, args| Ok(lib.is_sound_playing(&args.handle(1)?)))?;
    bind_lib(lua, env, "SetSoundVolume", |_, lib, args| {
        let sound: Sound = args.handle(1)?;
        lib.set_sound_volume(&sound, args.get(2)?);
        Ok(())
    })?;
    bind_release::<Sound>(lua, env, "UnloadSound")?;
    Ok(())
}

// ── Music ─────────────────────────────────────────────────────────────────────

fn register_music(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    bind_lib(lua, env, "LoadMusicStream", |lua, lib, args| wrap(lua, lib.load_music_stream(&args.string(1)?)))?;
    bind_lib(lua, env, "PlayMusicStream", |_, lib, args| {
        lib.play_music_stream(&args.handle(1)?);
        Ok(())
    })?;
    bind_lib(lua, env, "StopMusicStream", |_, lib, args| {
        lib.stop_music_stream(&args.handle(1)?);
        Ok(())
    })?;
    bind_lib(lua, env, "PauseMusicStream", |_, lib, args| {
        lib.pause_music_stream(&args.handle(1)?);
        Ok(())
    })?;
    bind_lib(lua, env, "ResumeMusicStream", |_, lib, args| {
        lib.resume_music_stream(&args.handle(1)?);
        Ok(())
    })?;
    let trampoline = Arc::clone(&env.trampoline);
    bind_lib(lua, env, "UpdateMusicStream", move |_, lib, args| {
        trampoline.serve_pending();
        lib.update_music_stream(&args.handle(1)?);
        Ok(())
    })?;
    bind_lib(lua, env, "IsMusicStreamPlaying", |_, lib, args| {
        Ok(lib.is_music_stream_playing(&args.handle(1)?))
    })?;
    bind_lib(lua, env, "GetMusicTimeLength", |_, lib, args| {
        let music: Music = args.handle(1)?;
        Ok(lib.get_music_time_length(&music))
    })?;
    bind_release::<Music>(lua, env, "UnloadMusicStream")?;
    Ok(())
}

// ── Raw streams ───────────────────────────────────────────────────────────────

fn register_streams(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    bind_lib(lua, env, "LoadAudioStream", |lua, lib, args| {
        wrap(lua, lib.load_audio_stream(args.get(1)?, args.get(2)?, args.get(3)?))
    })?;
    bind_lib(lua, env, "IsAudioStreamValid", |_, lib, args| Ok(lib.is_audio_stream_valid(&args.handle(1)?)))?;
    bind_lib(lua, env, "PlayAudioStream", |_, lib, args| {
        lib.play_audio_stream(&args.handle(1)?);
        Ok(())
    })?;
    bind_lib(lua, env, "StopAudioStream", |_, lib, args| {
        lib.stop_audio_stream(&args.handle(1)?);
        Ok(())
    })?;
    bind_lib(lua, env, "IsAudioStreamPlaying", |_, lib, args| {
        Ok(lib.is_audio_stream_playing(&args.handle(1)?))
    })?;
    bind_lib(lua, env, "IsAudioStreamProcessed", |_, lib, args| {
        Ok(lib.is_audio_stream_processed(&args.handle(1)?))
    })?;
    bind_lib(lua, env, "UpdateAudioStream", |_, lib, args| {
        let stream: AudioStream = args.handle(1)?;
        let samples = args.array::<f32>(2)?;
        let frames = match args.opt::<u32>(3)? {
            Some(frames) => frames as usize,
            None => samples.len() / stream.channels.max(1) as usize,
        };
        lib.update_audio_stream(&stream, samples.as_slice(), frames);
        Ok(())
    })?;
    Ok(())
}

// ── Callbacks ─────────────────────────────────────────────────────────────────

/// Installed callbacks, per kind. A kind stays registered with the
/// trampoline while anything still uses it.
struct Installed {
    trampoline: Arc<Trampoline>,
    stream_processors: Mutex<HashSet<u32>>,
    stream_callbacks: Mutex<HashSet<u32>>,
    mixed: Mutex<bool>,
    processor: AudioCallback,
    mixed_processor: AudioCallback,
    stream_callback: AudioCallback,
}

impl Installed {
    fn new(trampoline: Arc<Trampoline>) -> Self {
        Self {
            processor: trampoline.callback(CallbackKind::StreamProcessor),
            mixed_processor: trampoline.callback(CallbackKind::MixedProcessor),
            stream_callback: trampoline.callback(CallbackKind::StreamCallback),
            trampoline,
            stream_processors: Mutex::new(HashSet::new()),
            stream_callbacks: Mutex::new(HashSet::new()),
            mixed: Mutex::new(false),
        }
    }

    fn sync(&self, kind: CallbackKind, in_use: bool) {
        if in_use {
            self.trampoline.register(kind);
        } else {
            self.trampoline.unregister(kind);
        }
    }

    /// Assign an optional handler argument to the kind's global.
    fn assign_handler(&self, lua: &Lua, args: &Args, position: usize, kind: CallbackKind) -> LuaResult<()> {
        if args.len() >= position {
            let handler = args.function_arg(position)?;
            lua.globals().set(self.trampoline.global_name(kind), handler)?;
        }
        Ok(())
    }

    fn forget_stream(&self, id: u32) {
        let mut processors = lock(&self.stream_processors);
        processors.remove(&id);
        self.sync(CallbackKind::StreamProcessor, !processors.is_empty());
        drop(processors);
        let mut callbacks = lock(&self.stream_callbacks);
        callbacks.remove(&id);
        self.sync(CallbackKind::StreamCallback, !callbacks.is_empty());
    }
}

fn register_callbacks(lua: &Lua, env: &BindingEnv) -> LuaResult<()> {
    let installed = Arc::new(Installed::new(Arc::clone(&env.trampoline)));

    let inst = Arc::clone(&installed);
    bind_lib(lua, env, "SetAudioStreamCallback", move |lua, lib, args| {
        let stream: AudioStream = args.handle(1)?;
        let mut streams = lock(&inst.stream_callbacks);
        match args.opt::<bool>(2) {
            // `false` removes the callback.
            Ok(Some(false)) => {
                lib.set_audio_stream_callback(&stream, None);
                streams.remove(&stream.buffer);
            }
            Ok(_) => {
                lib.set_audio_stream_callback(&stream, Some(Arc::clone(&inst.stream_callback)));
                streams.insert(stream.buffer);
            }
            Err(_) => {
                inst.assign_handler(lua, &args, 2, CallbackKind::StreamCallback)?;
                lib.set_audio_stream_callback(&stream, Some(Arc::clone(&inst.stream_callback)));
                streams.insert(stream.buffer);
            }
        }
        inst.sync(CallbackKind::StreamCallback, !streams.is_empty());
        Ok(())
    })?;

    let inst = Arc::clone(&installed);
    bind_lib(lua, env, "AttachAudioStreamProcessor", move |lua, lib, args| {
        let stream: AudioStream = args.handle(1)?;
        inst.assign_handler(lua, &args, 2, CallbackKind::StreamProcessor)?;
        let mut streams = lock(&inst.stream_processors);
        if streams.insert(stream.buffer) {
            lib.attach_audio_stream_processor(&stream, Arc::clone(&inst.processor));
        }
        inst.sync(CallbackKind::StreamProcessor, true);
        Ok(())
    })?;

    let inst = Arc::clone(&installed);
    bind_lib(lua, env, "DetachAudioStreamProcessor", move |_, lib, args| {
        let stream: AudioStream = args.handle(1)?;
        let mut streams = lock(&inst.stream_processors);
        if streams.remove(&stream.buffer) {
            lib.detach_audio_stream_processor(&stream, Arc::clone(&inst.processor));
        }
        inst.sync(CallbackKind::StreamProcessor, !streams.is_empty());
        Ok(())
    })?;

    let inst = Arc::clone(&installed);
    bind_lib(lua, env, "AttachAudioMixedProcessor", move |lua, lib, args| {
        inst.assign_handler(lua, &args, 1, CallbackKind::MixedProcessor)?;
        let mut attached = lock(&inst.mixed);
        if !*attached {
            lib.attach_audio_mixed_processor(Arc::clone(&inst.mixed_processor));
            *attached = true;
        }
        inst.sync(CallbackKind::MixedProcessor, true);
        Ok(())
    })?;

    let inst = Arc::clone(&installed);
    bind_lib(lua, env, "DetachAudioMixedProcessor", move |_, lib, _| {
        let mut attached = lock(&inst.mixed);
        if *attached {
            lib.detach_audio_mixed_processor(Arc::clone(&inst.mixed_processor));
            *attached = false;
        }
        inst.sync(CallbackKind::MixedProcessor, false);
        Ok(())
    })?;

    // Unloading a stream drops whatever was installed on it.
    let inst = Arc::clone(&installed);
    bind_lib(lua, env, "UnloadAudioStream", move |_, lib, args| {
        let cell = args.handle_cell::<AudioStream>(1)?;
        let stream: AudioStream = handle::unwrap(&cell)?;
        handle::release::<AudioStream>(lib, &cell)?;
        inst.forget_stream(stream.buffer);
        Ok(())
    })?;

    // Sample access for the handler running on this thread. Indices are
    // 0-based interleaved sample positions, as in the native buffer.
    bind(lua, "AudioBufferGet", |_, args| {
        let ptr = args.light(1)?;
        let index: u32 = args.get(2)?;
        read_sample(ptr, index as usize).map_err(mlua::Error::external)
    })?;
    bind(lua, "AudioBufferSet", |_, args| {
        let ptr = args.light(1)?;
        let index: u32 = args.get(2)?;
        let value: f32 = args.get(3)?;
        write_sample(ptr, index as usize, value).map_err(mlua::Error::external)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{error_of, lua_with_api, lua_with_trust};
    use crate::scripting::{sandbox::TrustLevel, trampoline::CallbackKind};

    #[test]
    fn export_wave_needs_file_trust() {
        let (lua, env) = lua_with_trust(TrustLevel::Basic);
        assert!(error_of(&lua, "ExportWave(nil, 'out.wav')").contains("'ExportWave' needs trust level file_read"));
        env.trampoline.unbind();
    }

    #[test]
    fn wave_samples_copy_out_and_crop() {
        let (lua, env) = lua_with_api();
        let path = std::env::temp_dir().join(format!("raylua-bind-wave-{}.wav", std::process::id()));
        crate::audio::decoder::export_wav(&path, &[0.0, 0.25, 0.5, 0.75], 100, 1).unwrap();
        lua.globals().set("path", path.to_str().unwrap()).unwrap();
        let (count, second, valid): (i64, f32, bool) = lua
            .load(
                r#"
                local data, size = LoadFileData(path)
                local wave = LoadWaveFromMemory(".wav", data, size)
                UnloadFileData(data)
                WaveCrop(wave, 1, 3)
                local samples = LoadWaveSamples(wave)
                local valid = IsWaveValid(wave)
                UnloadWave(wave)
                return #samples, samples[2], valid
                "#,
            )
            .eval()
            .unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!((count, second, valid), (2, 0.5, true));
        assert_eq!(env.library.live_buffers(), 0);
        env.trampoline.unbind();
    }

    #[test]
    fn mixed_processor_edits_the_final_mix() {
        let (lua, env) = lua_with_api();
        lua.load(
            r#"
            InitAudioDevice()
            stream = LoadAudioStream(100, 32, 2)
            UpdateAudioStream(stream, { 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5 }, 4)
            PlayAudioStream(stream)
            AttachAudioMixedProcessor(function(buffer, frames)
                calls = (calls or 0) + 1
                saved = buffer
                for i = 0, frames * 2 - 1 do
                    AudioBufferSet(buffer, i, AudioBufferGet(buffer, i) * 2)
                end
            end)
            "#,
        )
        .exec()
        .unwrap();
        assert!(env.trampoline.is_active(CallbackKind::MixedProcessor));

        let out = env.library.render_audio(2);
        assert_eq!(out, vec![1.0; 4]);
        assert_eq!(lua.globals().get::<i64>("calls").unwrap(), 1);

        // The buffer is only reachable while the handler runs.
        let msg = error_of(&lua, "AudioBufferGet(saved, 0)");
        assert!(msg.contains("no audio buffer is active"), "{msg}");

        lua.load("DetachAudioMixedProcessor() UnloadAudioStream(stream)").exec().unwrap();
        assert!(!env.trampoline.is_active(CallbackKind::MixedProcessor));
        env.library.render_audio(2);
        assert_eq!(lua.globals().get::<i64>("calls").unwrap(), 1);
        env.trampoline.unbind();
    }

    #[test]
    fn stream_processor_without_handler_is_harmless() {
        let (lua, env) = lua_with_api();
        lua.load(
            r#"
            InitAudioDevice()
            stream = LoadAudioStream(100, 32, 1)
            AttachAudioStreamProcessor(stream)
            UpdateAudioStream(stream, { 0.25, 0.25, 0.25, 0.25, 0.25, 0.25 })
            PlayAudioStream(stream)
            "#,
        )
        .exec()
        .unwrap();
        let out = env.library.render_audio(2);
        assert_eq!(out, vec![0.25; 4]);
        assert!(env.trampoline.stats().missing >= 1);

        lua.load("DetachAudioStreamProcessor(stream)").exec().unwrap();
        assert!(!env.trampoline.is_active(CallbackKind::StreamProcessor));
        env.trampoline.unbind();
    }

    #[test]
    fn unloading_a_stream_unregisters_its_callbacks() {
        let (lua, env) = lua_with_api();
        lua.load(
            r#"
            stream = LoadAudioStream(100, 32, 2)
            SetAudioStreamCallback(stream, function(buffer, frames) end)
            AttachAudioStreamProcessor(stream, function(buffer, frames) end)
            "#,
        )
        .exec()
        .unwrap();
        assert!(env.trampoline.is_active(CallbackKind::StreamCallback));
        assert!(env.trampoline.is_active(CallbackKind::StreamProcessor));

        lua.load("UnloadAudioStream(stream)").exec().unwrap();
        assert!(!env.trampoline.is_active(CallbackKind::StreamCallback));
        assert!(!env.trampoline.is_active(CallbackKind::StreamProcessor));
        env.trampoline.unbind();
    }

    #[test]
    fn buffer_access_needs_a_pointer() {
        let (lua, env) = lua_with_api();
        let msg = error_of(&lua, "AudioBufferGet(nil, 0)");
        assert!(msg.contains("light userdata expected"), "{msg}");
        env.trampoline.unbind();
    }
}

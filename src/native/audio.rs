/// `native/audio.rs`: waves, sounds, music and raw audio streams
///
/// Waves are decoded PCM in ledger blocks (always 32-bit float). Sounds,
/// music and streams are mixer voices; their `AudioStream::buffer` field
/// carries the voice id.
use std::{ffi::c_void, path::Path};

use super::{
    types::{AudioStream, Music, RawBuffer, Sound, Wave},
    NativeLibrary,
};
use crate::audio::{
    decoder::{self, DecodedPcm},
    mixer::AudioCallback,
};

const FLOAT_SAMPLE_SIZE: u32 = 32;

/// Music context types, by container.
const MUSIC_AUDIO_WAV: i32 = 1;
const MUSIC_AUDIO_OGG: i32 = 2;
const MUSIC_AUDIO_FLAC: i32 = 3;
const MUSIC_AUDIO_MP3: i32 = 4;

fn music_ctx_type(path: &Path) -> i32 {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "wav" => MUSIC_AUDIO_WAV,
        "ogg" => MUSIC_AUDIO_OGG,
        "flac" => MUSIC_AUDIO_FLAC,
        "mp3" => MUSIC_AUDIO_MP3,
        _ => 0,
    }
}

impl NativeLibrary {
    // ── Device ────────────────────────────────────────────────────────────

    pub fn init_audio_device(&self) {
        self.audio().init_device();
    }

    pub fn close_audio_device(&self) {
        self.audio().close_device();
    }

    pub fn is_audio_device_ready(&self) -> bool {
        self.audio().is_ready()
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.audio().set_master_volume(volume);
    }

    pub fn get_master_volume(&self) -> f32 {
        self.audio().master_volume()
    }

    // ── Waves ─────────────────────────────────────────────────────────────

    fn wave_from_pcm(&self, pcm: DecodedPcm) -> Wave {
        let frame_count = pcm.frame_count();
        let (sample_rate, channels) = (pcm.sample_rate, pcm.channels);
        Wave {
            frame_count,
            sample_rate,
            sample_size: FLOAT_SAMPLE_SIZE,
            channels,
            data: self.ledger().insert(pcm.samples) as *mut c_void,
        }
    }

    /// Copy of the PCM behind `wave`, cut to its declared frame count.
    pub(crate) fn wave_pcm(&self, wave: &Wave) -> Option<DecodedPcm> {
        let count = wave.sample_count();
        let samples = self.ledger().with(wave.data as *const f32, |s| s[..count.min(s.len())].to_vec())?;
        Some(DecodedPcm { samples, sample_rate: wave.sample_rate, channels: wave.channels })
    }

    pub fn load_wave(&self, file_name: &str) -> Wave {
        match decoder::decode_file(Path::new(file_name)) {
            Ok(pcm) => {
                log::info!(
                    "WAVE: [{file_name}] Data loaded successfully ({} Hz, {} ch, {} frames)",
                    pcm.sample_rate,
                    pcm.channels,
                    pcm.frame_count()
                );
                self.wave_from_pcm(pcm)
            }
            Err(e) => {
                log::warn!("WAVE: [{file_name}] Failed to load wave data: {e}");
                Wave::default()
            }
        }
    }

    /// `file_type` is an extension including the dot, e.g. `".wav"`.
    pub fn load_wave_from_memory(&self, file_type: &str, data: &[u8]) -> Wave {
        match decoder::decode_memory(file_type, data.to_vec()) {
            Ok(pcm) => self.wave_from_pcm(pcm),
            Err(e) => {
                log::warn!("WAVE: Failed to load {file_type} wave from memory: {e}");
                Wave::default()
            }
        }
    }

    pub fn is_wave_valid(&self, wave: &Wave) -> bool {
        !wave.data.is_null()
            && wave.frame_count > 0
            && wave.sample_rate > 0
            && wave.sample_size > 0
            && wave.channels > 0
    }

    pub fn wave_copy(&self, wave: &Wave) -> Wave {
        match self.wave_pcm(wave) {
            Some(pcm) => self.wave_from_pcm(pcm),
            None => Wave::default(),
        }
    }

    /// Keep frames `init_frame..final_frame`.
    pub fn wave_crop(&self, wave: &mut Wave, init_frame: i32, final_frame: i32) {
        let valid = init_frame >= 0 && init_frame < final_frame && final_frame as u32 <= wave.frame_count;
        if !valid {
            log::warn!("WAVE: Crop range out of bounds");
            return;
        }
        let Some(pcm) = self.wave_pcm(wave) else { return };
        let channels = wave.channels as usize;
        let samples = pcm.samples[init_frame as usize * channels..final_frame as usize * channels].to_vec();
        self.ledger().take(wave.data as *const f32);
        *wave = self.wave_from_pcm(DecodedPcm { samples, ..pcm });
    }

    /// Interleaved samples in a library-owned array.
    pub fn load_wave_samples(&self, wave: &Wave) -> RawBuffer<f32> {
        match self.wave_pcm(wave) {
            Some(pcm) => {
                let len = pcm.samples.len();
                RawBuffer { ptr: self.ledger().insert(pcm.samples), len }
            }
            None => RawBuffer::empty(),
        }
    }

    pub fn unload_wave_samples(&self, samples: RawBuffer<f32>) {
        self.ledger().take(samples.ptr as *const f32);
    }

    pub fn export_wave(&self, wave: &Wave, file_name: &str) -> bool {
        let Some(pcm) = self.wave_pcm(wave) else {
            log::warn!("FILEIO: [{file_name}] Failed to export invalid wave");
            return false;
        };
        match decoder::export_wav(Path::new(file_name), &pcm.samples, pcm.sample_rate, pcm.channels) {
            Ok(()) => {
                log::info!("FILEIO: [{file_name}] Wave data exported successfully");
                true
            }
            Err(e) => {
                log::warn!("FILEIO: [{file_name}] Failed to export wave data: {e}");
                false
            }
        }
    }

    pub fn unload_wave(&self, wave: Wave) {
        if self.ledger().take(wave.data as *const f32).is_some() {
            log::debug!("WAVE: Unloaded wave data from RAM");
        }
    }

    // ── Sounds ────────────────────────────────────────────────────────────

    pub fn load_sound(&self, file_name: &str) -> Sound {
        let wave = self.load_wave(file_name);
        let sound = self.load_sound_from_wave(&wave);
        self.unload_wave(wave);
        sound
    }

    pub fn load_sound_from_wave(&self, wave: &Wave) -> Sound {
        let Some(pcm) = self.wave_pcm(wave).filter(|p| p.frame_count() > 0) else {
            log::warn!("SOUND: Failed to load sound from invalid wave");
            return Sound::default();
        };
        let buffer = self.audio().load_buffer(&pcm);
        Sound {
            stream: AudioStream {
                buffer,
                sample_rate: pcm.sample_rate,
                sample_size: FLOAT_SAMPLE_SIZE,
                channels: pcm.channels,
            },
            frame_count: pcm.frame_count(),
        }
    }

    pub fn is_sound_valid(&self, sound: &Sound) -> bool {
        sound.frame_count > 0 && self.is_audio_stream_valid(&sound.stream)
    }

    pub fn play_sound(&self, sound: &Sound) {
        self.audio().play(sound.stream.buffer);
    }

    pub fn stop_sound(&self, sound: &Sound) {
        self.audio().stop(sound.stream.buffer);
    }

    pub fn pause_sound(&self, sound: &Sound) {
        self.audio().pause(sound.stream.buffer);
    }

    pub fn resume_sound(&self, sound: &Sound) {
        self.audio().resume(sound.stream.buffer);
    }

    pub fn is_sound_playing(&self, sound: &Sound) -> bool {
        self.audio().is_playing(sound.stream.buffer)
    }

    pub fn set_sound_volume(&self, sound: &Sound, volume: f32) {
        self.audio().set_volume(sound.stream.buffer, volume);
    }

    pub fn unload_sound(&self, sound: Sound) {
        if sound.stream.buffer != 0 {
            self.audio().unload(sound.stream.buffer);
            log::debug!("SOUND: Unloaded sound data from RAM");
        }
    }

    // ── Music ─────────────────────────────────────────────────────────────

    /// Streamed from disk by a decoder thread while playing. Loops by default.
    pub fn load_music_stream(&self, file_name: &str) -> Music {
        let path = Path::new(file_name);
        let info = match decoder::probe_metadata(path) {
            Ok(info) => info,
            Err(e) => {
                log::warn!("STREAM: [{file_name}] Music file could not be opened: {e}");
                return Music::default();
            }
        };
        let buffer = self.audio().load_music(path.to_path_buf(), info.sample_rate, true);
        log::info!(
            "FILEIO: [{file_name}] Music file loaded successfully ({} Hz, {} ch, {} frames)",
            info.sample_rate,
            info.channels,
            info.total_frames
        );
        Music {
            stream: AudioStream { buffer, sample_rate: info.sample_rate, sample_size: FLOAT_SAMPLE_SIZE, channels: 2 },
            frame_count: u32::try_from(info.total_frames).unwrap_or(u32::MAX),
            looping: true,
            ctx_type: music_ctx_type(path),
        }
    }

    pub fn play_music_stream(&self, music: &Music) {
        self.audio().play(music.stream.buffer);
    }

    pub fn stop_music_stream(&self, music: &Music) {
        self.audio().stop(music.stream.buffer);
    }

    pub fn pause_music_stream(&self, music: &Music) {
        self.audio().pause(music.stream.buffer);
    }

    pub fn resume_music_stream(&self, music: &Music) {
        self.audio().resume(music.stream.buffer);
    }

    pub fn update_music_stream(&self, music: &Music) {
        self.audio().update_music(music.stream.buffer);
    }

    pub fn is_music_stream_playing(&self, music: &Music) -> bool {
        self.audio().is_playing(music.stream.buffer)
    }

    /// Length in seconds; 0 when the container gives no frame count.
    pub fn get_music_time_length(&self, music: &Music) -> f32 {
        if music.stream.sample_rate == 0 {
            return 0.0;
        }
        music.frame_count as f32 / music.stream.sample_rate as f32
    }

    pub fn unload_music_stream(&self, music: Music) {
        if music.stream.buffer != 0 {
            self.audio().unload(music.stream.buffer);
        }
    }

    // ── Raw streams ───────────────────────────────────────────────────────

    /// Only 32-bit float samples are mixed; other sizes are stored as given
    /// and converted by the caller.
    pub fn load_audio_stream(&self, sample_rate: u32, sample_size: u32, channels: u32) -> AudioStream {
        if sample_rate == 0 || channels == 0 {
            log::warn!("STREAM: Invalid audio stream format {sample_rate} Hz, {channels} ch");
            return AudioStream::default();
        }
        let buffer = self.audio().load_stream(sample_rate, channels);
        log::info!("STREAM: Initialized successfully ({sample_rate} Hz, {sample_size} bit, {channels} ch)");
        AudioStream { buffer, sample_rate, sample_size, channels }
    }

    pub fn is_audio_stream_valid(&self, stream: &AudioStream) -> bool {
        stream.buffer != 0 && stream.sample_rate > 0 && stream.sample_size > 0 && stream.channels > 0
    }

    pub fn unload_audio_stream(&self, stream: AudioStream) {
        if stream.buffer != 0 {
            self.audio().unload(stream.buffer);
            log::info!("STREAM: Unloaded audio stream data from RAM");
        }
    }

    pub fn play_audio_stream(&self, stream: &AudioStream) {
        self.audio().play(stream.buffer);
    }

    pub fn stop_audio_stream(&self, stream: &AudioStream) {
        self.audio().stop(stream.buffer);
    }

    pub fn is_audio_stream_playing(&self, stream: &AudioStream) -> bool {
        self.audio().is_playing(stream.buffer)
    }

    pub fn is_audio_stream_processed(&self, stream: &AudioStream) -> bool {
        self.audio().is_stream_processed(stream.buffer)
    }

    /// Queue `frame_count` interleaved frames from `data`.
    pub fn update_audio_stream(&self, stream: &AudioStream, data: &[f32], frame_count: usize) {
        let samples = (frame_count * stream.channels as usize).min(data.len());
        self.audio().update_stream(stream.buffer, &data[..samples]);
    }

    // ── Callbacks ─────────────────────────────────────────────────────────

    pub fn set_audio_stream_callback(&self, stream: &AudioStream, callback: Option<AudioCallback>) {
        self.audio().set_stream_callback(stream.buffer, callback);
    }

    pub fn attach_audio_stream_processor(&self, stream: &AudioStream, processor: AudioCallback) {
        self.audio().attach_processor(stream.buffer, processor);
    }

    pub fn detach_audio_stream_processor(&self, stream: &AudioStream, processor: AudioCallback) {
        self.audio().detach_processor(stream.buffer, processor);
    }

    pub fn attach_audio_mixed_processor(&self, processor: AudioCallback) {
        self.audio().attach_mixed_processor(processor);
    }

    pub fn detach_audio_mixed_processor(&self, processor: AudioCallback) {
        self.audio().detach_mixed_processor(processor);
    }

    // ── Headless pumping ──────────────────────────────────────────────────

    /// Mix `frames` frames on this thread, without an output device.
    pub fn render_audio(&self, frames: usize) -> Vec<f32> {
        let renderer = self.audio().renderer();
        renderer.render(frames)
    }

    pub fn any_audio_playing(&self) -> bool {
        self.audio().any_playing()
    }

    pub fn has_audio_output(&self) -> bool {
        self.audio().has_device()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::config::{AudioConfig, HeadlessConfig};

    fn lib() -> NativeLibrary {
        let lib = NativeLibrary::new(
            HeadlessConfig::default(),
            AudioConfig { open_device: false, sample_rate: 100, stream_buffer_frames: 8, ..Default::default() },
        );
        lib.init_audio_device();
        lib
    }

    fn wave(lib: &NativeLibrary, frames: usize) -> Wave {
        let samples: Vec<f32> = (0..frames * 2).map(|i| i as f32 / 100.0).collect();
        lib.wave_from_pcm(DecodedPcm { samples, sample_rate: 100, channels: 2 })
    }

    #[test]
    fn wave_crop_and_samples() {
        let lib = lib();
        let mut w = wave(&lib, 10);
        assert!(lib.is_wave_valid(&w));
        lib.wave_crop(&mut w, 2, 5);
        assert_eq!(w.frame_count, 3);
        let samples = lib.load_wave_samples(&w);
        assert_eq!(samples.len, 6);
        let first = lib.ledger().with(samples.ptr as *const f32, |s| s[0]);
        assert_eq!(first, Some(0.04));
        lib.unload_wave_samples(samples);

        lib.wave_crop(&mut w, 2, 99);
        assert_eq!(w.frame_count, 3);

        let copy = lib.wave_copy(&w);
        assert_eq!(lib.wave_pcm(&copy), lib.wave_pcm(&w));
        lib.unload_wave(copy);
        lib.unload_wave(w);
        assert_eq!(lib.live_buffers(), 0);
    }

    #[test]
    fn exported_wave_loads_back() {
        let lib = lib();
        let w = wave(&lib, 16);
        let path = std::env::temp_dir().join(format!("raylua-wave-{}.wav", std::process::id()));
        let path = path.to_str().unwrap().to_string();
        assert!(lib.export_wave(&w, &path));
        let back = lib.load_wave(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!((back.frame_count, back.channels, back.sample_rate), (16, 2, 100));
        lib.unload_wave(back);
        lib.unload_wave(w);
        assert!(!lib.is_wave_valid(&lib.load_wave("/nonexistent/raylua.wav")));
    }

    #[test]
    fn sound_from_wave_plays() {
        let lib = lib();
        let w = wave(&lib, 4);
        let sound = lib.load_sound_from_wave(&w);
        lib.unload_wave(w);
        assert!(lib.is_sound_valid(&sound));
        lib.play_sound(&sound);
        assert!(lib.is_sound_playing(&sound));
        lib.render_audio(8);
        assert!(!lib.is_sound_playing(&sound));
        lib.unload_sound(sound);

        assert!(!lib.is_sound_valid(&lib.load_sound_from_wave(&Wave::default())));
    }

    #[test]
    fn stream_processor_sees_rendered_frames() {
        let lib = lib();
        let stream = lib.load_audio_stream(100, 32, 2);
        assert!(lib.is_audio_stream_valid(&stream));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let processor: AudioCallback = Arc::new(move |buf: &mut [f32], channels: u32| {
            counter.fetch_add(buf.len() / channels as usize, Ordering::Relaxed);
        });
        lib.attach_audio_stream_processor(&stream, Arc::clone(&processor));
        lib.update_audio_stream(&stream, &[0.25; 16], 8);
        lib.play_audio_stream(&stream);
        lib.render_audio(4);
        assert_eq!(seen.load(Ordering::Relaxed), 4);

        lib.detach_audio_stream_processor(&stream, processor);
        lib.render_audio(4);
        assert_eq!(seen.load(Ordering::Relaxed), 4);
        lib.unload_audio_stream(stream);
    }

    #[test]
    fn music_time_length() {
        let lib = lib();
        let music = Music {
            stream: AudioStream { buffer: 0, sample_rate: 100, sample_size: 32, channels: 2 },
            frame_count: 250,
            ..Default::default()
        };
        assert_eq!(lib.get_music_time_length(&music), 2.5);
        assert_eq!(lib.load_music_stream("/nonexistent/raylua.ogg"), Music::default());
    }
}

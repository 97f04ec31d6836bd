/// `audio/system.rs`: main-thread side of the audio engine
///
/// Owns the command producer, the optional output device and the
/// main-thread view of every voice. All voice state changes travel to the
/// mixer through the command queue; the main thread only reads the atomics
/// the mixer publishes.
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use ringbuf::{
    traits::{Observer as _, Producer as _, Split},
    HeapRb,
};

use super::{
    decoder::{self, DecodedPcm},
    device::OutputDevice,
    mixer::{AudioCallback, Mixer, MixerCmd, Source, Voice},
};
use crate::config::AudioConfig;

struct StreamFeed {
    producer: ringbuf::HeapProd<f32>,
    channels: u32,
    buffer_frames: usize,
}

struct MusicState {
    path: PathBuf,
    looping: bool,
    /// The script asked for playback and has not stopped it.
    wanted: bool,
}

struct VoiceState {
    active: Arc<AtomicBool>,
    music: Option<MusicState>,
}

pub struct AudioSystem {
    config: AudioConfig,
    mixer: Arc<Mutex<Mixer>>,
    commands: ringbuf::HeapProd<MixerCmd>,
    device: Option<OutputDevice>,
    ready: bool,
    voices: HashMap<u32, VoiceState>,
    streams: HashMap<u32, StreamFeed>,
    next_voice: u32,
    master_volume: f32,
}

impl AudioSystem {
    pub fn new(config: AudioConfig) -> Self {
        let (commands, rx) = HeapRb::<MixerCmd>::new(config.command_queue.max(1)).split();
        let mixer = Arc::new(Mutex::new(Mixer::new(config.sample_rate, rx)));
        Self {
            config,
            mixer,
            commands,
            device: None,
            ready: false,
            voices: HashMap::new(),
            streams: HashMap::new(),
            next_voice: 1,
            master_volume: 1.0,
        }
    }

    // ── Device ────────────────────────────────────────────────────────────

    pub fn init_device(&mut self) {
        if self.ready {
            log::warn!("AUDIO: Device already initialized");
            return;
        }
        if !self.config.open_device {
            log::info!("AUDIO: Running without an output device ({} Hz)", self.config.sample_rate);
            self.ready = true;
            return;
        }
        match OutputDevice::open(Arc::clone(&self.mixer)) {
            Ok(device) => {
                log::info!("AUDIO: Device initialized successfully ({})", device.name);
                self.device = Some(device);
                self.ready = true;
            }
            Err(e) => log::warn!("AUDIO: Failed to initialize playback device: {e}"),
        }
    }

    pub fn close_device(&mut self) {
        if !self.ready {
            log::warn!("AUDIO: Device could not be closed, not currently initialized");
            return;
        }
        self.device = None;
        self.ready = false;
        log::info!("AUDIO: Device closed successfully");
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn sample_rate(&self) -> u32 {
        self.device.as_ref().map_or(self.config.sample_rate, |d| d.sample_rate)
    }

    pub fn output_channels(&self) -> usize {
        self.device.as_ref().map_or(self.config.channels as usize, |d| d.channels)
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume;
        self.send(MixerCmd::SetMasterVolume(volume));
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    // ── Voices ────────────────────────────────────────────────────────────

    fn add_voice(&mut self, source: Source, channels: u32, sample_rate: u32, music: Option<MusicState>) -> u32 {
        let id = self.next_voice;
        self.next_voice = self.next_voice.wrapping_add(1).max(1);
        let active = Arc::new(AtomicBool::new(false));
        let voice = Voice::new(source, channels, sample_rate, Arc::clone(&active));
        self.voices.insert(id, VoiceState { active, music });
        self.send(MixerCmd::AddVoice(id, Box::new(voice)));
        id
    }

    /// A voice playing a copy of `pcm`. Returns the voice id.
    pub fn load_buffer(&mut self, pcm: &DecodedPcm) -> u32 {
        let samples: Arc<[f32]> = pcm.samples.as_slice().into();
        self.add_voice(Source::Buffer { samples, cursor: 0 }, pcm.channels, pcm.sample_rate, None)
    }

    pub fn load_music(&mut self, path: PathBuf, sample_rate: u32, looping: bool) -> u32 {
        let music = MusicState { path, looping, wanted: false };
        self.add_voice(Source::Music { decoder: None }, 2, sample_rate, Some(music))
    }

    pub fn load_stream(&mut self, sample_rate: u32, channels: u32) -> u32 {
        let buffer_frames = self.config.stream_buffer_frames.max(1) as usize;
        // Two sub-buffers, as the native double-buffered stream does.
        let capacity = buffer_frames * channels.max(1) as usize * 2;
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let id = self.add_voice(Source::Stream { consumer }, channels, sample_rate, None);
        self.streams.insert(id, StreamFeed { producer, channels: channels.max(1), buffer_frames });
        id
    }

    pub fn unload(&mut self, id: u32) {
        if self.voices.remove(&id).is_none() {
            log::warn!("AUDIO: Unload of unknown voice {id}");
            return;
        }
        self.streams.remove(&id);
        self.send(MixerCmd::RemoveVoice(id));
    }

    pub fn play(&mut self, id: u32) {
        let Some(state) = self.voices.get_mut(&id) else { return };
        if let Some(music) = &mut state.music {
            music.wanted = true;
            let path = music.path.clone();
            match decoder::spawn_decoder(path) {
                Ok(dec) => {
                    state.active.store(true, Ordering::Relaxed);
                    self.send(MixerCmd::PlayMusic(id, Box::new(dec)));
                }
                Err(e) => log::warn!("STREAM: Failed to start music: {e}"),
            }
            return;
        }
        state.active.store(true, Ordering::Relaxed);
        self.send(MixerCmd::Play(id));
    }

    pub fn stop(&mut self, id: u32) {
        let Some(state) = self.voices.get_mut(&id) else { return };
        if let Some(music) = &mut state.music {
            music.wanted = false;
        }
        state.active.store(false, Ordering::Relaxed);
        self.send(MixerCmd::Stop(id));
    }

    pub fn pause(&mut self, id: u32) {
        let Some(state) = self.voices.get(&id) else { return };
        state.active.store(false, Ordering::Relaxed);
        self.send(MixerCmd::Pause(id));
    }

    pub fn resume(&mut self, id: u32) {
        if self.voices.contains_key(&id) {
            self.send(MixerCmd::Resume(id));
        }
    }

    pub fn set_volume(&mut self, id: u32, volume: f32) {
        self.send(MixerCmd::SetVolume(id, volume));
    }

    pub fn is_playing(&self, id: u32) -> bool {
        self.voices.get(&id).is_some_and(|s| s.active.load(Ordering::Relaxed))
    }

    /// Restart looping music that reached its end.
    pub fn update_music(&mut self, id: u32) {
        let restart = match self.voices.get(&id) {
            Some(VoiceState { active, music: Some(m) }) => {
                m.wanted && m.looping && !active.load(Ordering::Relaxed)
            }
            _ => false,
        };
        if restart {
            log::debug!("STREAM: Looping music voice {id}");
            self.play(id);
        }
    }

    pub fn any_playing(&self) -> bool {
        self.voices.values().any(|s| s.active.load(Ordering::Relaxed))
    }

    // ── Streams ───────────────────────────────────────────────────────────

    /// Queue interleaved samples. Returns how many frames were accepted.
    pub fn update_stream(&mut self, id: u32, samples: &[f32]) -> usize {
        let Some(feed) = self.streams.get_mut(&id) else {
            log::warn!("STREAM: Update of unknown audio stream {id}");
            return 0;
        };
        let channels = feed.channels as usize;
        let room = feed.producer.vacant_len() / channels * channels;
        let take = room.min(samples.len() / channels * channels);
        if take < samples.len() {
            log::warn!(
                "STREAM: Buffer full, {} of {} frames dropped",
                (samples.len() - take) / channels,
                samples.len() / channels
            );
        }
        feed.producer.push_slice(&samples[..take]);
        take / channels
    }

    /// True when at least one sub-buffer is free for new data.
    pub fn is_stream_processed(&self, id: u32) -> bool {
        self.streams
            .get(&id)
            .is_some_and(|f| f.producer.vacant_len() >= f.buffer_frames * f.channels as usize)
    }

    // ── Callbacks ─────────────────────────────────────────────────────────

    pub fn set_stream_callback(&mut self, id: u32, callback: Option<AudioCallback>) {
        self.send(MixerCmd::SetCallback(id, callback));
    }

    pub fn attach_processor(&mut self, id: u32, processor: AudioCallback) {
        self.send(MixerCmd::AttachProcessor(id, processor));
    }

    pub fn detach_processor(&mut self, id: u32, processor: AudioCallback) {
        self.send(MixerCmd::DetachProcessor(id, processor));
    }

    pub fn attach_mixed_processor(&mut self, processor: AudioCallback) {
        self.send(MixerCmd::AttachMixed(processor));
    }

    pub fn detach_mixed_processor(&mut self, processor: AudioCallback) {
        self.send(MixerCmd::DetachMixed(processor));
    }

    // ── Plumbing ──────────────────────────────────────────────────────────

    fn send(&mut self, cmd: MixerCmd) {
        if self.commands.try_push(cmd).is_err() {
            log::warn!("AUDIO: Command queue full, command dropped");
        }
        // Nothing drains the queue without a device; apply right away unless
        // someone is rendering at this very moment.
        if self.device.is_none() {
            if let Ok(mut mixer) = self.mixer.try_lock() {
                mixer.drain_commands();
            }
        }
    }

    /// Render `frames` frames on the calling thread. Used when no device
    /// is open to drive processors and callbacks headlessly.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        self.renderer().render(frames)
    }

    /// A detached handle for rendering without holding the system.
    ///
    /// Processors may re-enter the script, which may call back into the
    /// audio system, so headless pumping must not keep it locked.
    pub fn renderer(&self) -> Renderer {
        Renderer { mixer: Arc::clone(&self.mixer), channels: self.output_channels() }
    }
}

pub struct Renderer {
    mixer: Arc<Mutex<Mixer>>,
    channels: usize,
}

impl Renderer {
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * self.channels];
        match self.mixer.lock() {
            Ok(mut m) => m.render(&mut out, self.channels),
            Err(poisoned) => poisoned.into_inner().render(&mut out, self.channels),
        }
        out
    }
}

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use ringbuf::traits::{Consumer as _, Observer as _};

use super::decoder::DecoderHandle;

/// Native-side audio callback: interleaved f32 samples plus the channel
/// count of the buffer.
pub type AudioCallback = Arc<dyn Fn(&mut [f32], u32) + Send + Sync>;

/// Where a voice pulls its frames from.
pub enum Source {
    /// Fully decoded samples shared with the owning `Sound`.
    Buffer { samples: Arc<[f32]>, cursor: usize },
    /// Streaming decoder; always stereo. `None` until the first play.
    Music { decoder: Option<DecoderHandle> },
    /// Samples queued by `UpdateAudioStream`, or produced on demand by the
    /// stream callback when one is set.
    Stream { consumer: ringbuf::HeapCons<f32> },
}

enum Pull {
    Frame([f32; 2]),
    Starved,
    Ended,
}

/// One playing (or idle) buffer inside the mixer.
pub struct Voice {
    source: Source,
    channels: u32,
    sample_rate: u32,
    volume: f32,
    playing: bool,
    paused: bool,
    /// Mirrors `playing && !paused` for the main thread.
    active: Arc<AtomicBool>,
    processors: Vec<AudioCallback>,
    callback: Option<AudioCallback>,
    callback_frames: usize,
    pending: Vec<f32>,
    pending_pos: usize,
    // Linear resampler state, stereo.
    cur: [f32; 2],
    next: Option<[f32; 2]>,
    frac: f64,
    primed: bool,
    ended: bool,
    scratch: Vec<f32>,
}

impl Voice {
    pub fn new(source: Source, channels: u32, sample_rate: u32, active: Arc<AtomicBool>) -> Self {
        Self {
            source,
            channels: channels.max(1),
            sample_rate: sample_rate.max(1),
            volume: 1.0,
            playing: false,
            paused: false,
            active,
            processors: Vec::new(),
            callback: None,
            callback_frames: 1024,
            pending: Vec::new(),
            pending_pos: 0,
            cur: [0.0; 2],
            next: None,
            frac: 0.0,
            primed: false,
            ended: false,
            scratch: Vec::new(),
        }
    }

    fn publish(&self) {
        self.active.store(self.playing && !self.paused, Ordering::Relaxed);
    }

    fn rewind(&mut self) {
        if let Source::Buffer { cursor, .. } = &mut self.source {
            *cursor = 0;
        }
        self.primed = false;
        self.frac = 0.0;
    }

    fn pull_source(&mut self) -> Pull {
        let channels = self.channels as usize;
        if let Some(callback) = &self.callback {
            if self.pending_pos >= self.pending.len() {
                self.pending.clear();
                self.pending.resize(self.callback_frames * channels, 0.0);
                callback(&mut self.pending, self.channels);
                self.pending_pos = 0;
            }
            let frame = &self.pending[self.pending_pos..self.pending_pos + channels];
            self.pending_pos += channels;
            return Pull::Frame(to_stereo(frame));
        }

        match &mut self.source {
            Source::Buffer { samples, cursor } => {
                let start = *cursor * channels;
                if start + channels > samples.len() {
                    return Pull::Ended;
                }
                *cursor += 1;
                Pull::Frame(to_stereo(&samples[start..start + channels]))
            }
            Source::Music { decoder } => {
                let Some(dec) = decoder else { return Pull::Ended };
                if dec.consumer.occupied_len() >= 2 {
                    let l = dec.consumer.try_pop().unwrap_or(0.0);
                    let r = dec.consumer.try_pop().unwrap_or(0.0);
                    Pull::Frame([l, r])
                } else if dec.decode_done.load(Ordering::Relaxed) {
                    Pull::Ended
                } else {
                    Pull::Starved
                }
            }
            Source::Stream { consumer } => {
                if consumer.occupied_len() >= channels {
                    let mut frame = [0.0f32; 8];
                    let n = channels.min(frame.len());
                    for slot in frame.iter_mut().take(n) {
                        *slot = consumer.try_pop().unwrap_or(0.0);
                    }
                    for _ in n..channels {
                        let _ = consumer.try_pop();
                    }
                    Pull::Frame(to_stereo(&frame[..n]))
                } else {
                    Pull::Starved
                }
            }
        }
    }

    /// Next output frame at the mixer rate; `None` once the source ended.
    fn next_frame(&mut self, step: f64) -> Option<[f32; 2]> {
        if !self.primed {
            match self.pull_source() {
                Pull::Frame(f) => self.cur = f,
                Pull::Starved => return Some([0.0; 2]),
                Pull::Ended => return None,
            }
            self.next = None;
            self.ended = false;
            self.primed = true;
        }
        while self.frac >= 1.0 {
            if !self.fill_next() {
                return Some([0.0; 2]);
            }
            // Past the last frame of an ended source.
            let next = self.next.take()?;
            self.cur = next;
            self.frac -= 1.0;
        }
        self.fill_next();
        let next = self.next.unwrap_or(self.cur);
        let t = self.frac as f32;
        let out = [
            self.cur[0] + (next[0] - self.cur[0]) * t,
            self.cur[1] + (next[1] - self.cur[1]) * t,
        ];
        self.frac += step;
        Some(out)
    }

    /// Make sure `next` holds the following source frame. Returns false
    /// only when the source is starved.
    fn fill_next(&mut self) -> bool {
        if self.next.is_some() || self.ended {
            return true;
        }
        match self.pull_source() {
            Pull::Frame(f) => self.next = Some(f),
            Pull::Starved => return false,
            Pull::Ended => self.ended = true,
        }
        true
    }

    /// Fill `scratch` with `frames` frames in the output layout and run the
    /// attached processors over it.
    fn render(&mut self, frames: usize, out_channels: usize, out_rate: u32) {
        self.scratch.clear();
        self.scratch.resize(frames * out_channels, 0.0);
        let step = self.sample_rate as f64 / out_rate.max(1) as f64;
        self.callback_frames = ((frames as f64 * step).ceil() as usize).max(1);

        for i in 0..frames {
            match self.next_frame(step) {
                Some(frame) => write_frame(&mut self.scratch[i * out_channels..(i + 1) * out_channels], frame),
                None => {
                    self.playing = false;
                    self.rewind();
                    self.publish();
                    break;
                }
            }
        }

        for processor in &self.processors {
            processor(&mut self.scratch, out_channels as u32);
        }
    }
}

fn to_stereo(frame: &[f32]) -> [f32; 2] {
    match frame {
        [] => [0.0; 2],
        [mono] => [*mono, *mono],
        [l, r, ..] => [*l, *r],
    }
}

fn write_frame(out: &mut [f32], frame: [f32; 2]) {
    match out.len() {
        0 => {}
        1 => out[0] = (frame[0] + frame[1]) * 0.5,
        _ => {
            out[0] = frame[0];
            out[1] = frame[1];
        }
    }
}

/// Commands sent from the main thread → real-time thread via a lock-free channel.
pub enum MixerCmd {
    AddVoice(u32, Box<Voice>),
    RemoveVoice(u32),
    Play(u32),
    /// Restart a music voice with a fresh decoder.
    PlayMusic(u32, Box<DecoderHandle>),
    Stop(u32),
    Pause(u32),
    Resume(u32),
    SetVolume(u32, f32),
    SetMasterVolume(f32),
    AttachProcessor(u32, AudioCallback),
    DetachProcessor(u32, AudioCallback),
    SetCallback(u32, Option<AudioCallback>),
    AttachMixed(AudioCallback),
    DetachMixed(AudioCallback),
}

/// Voice table plus master bus. Lives behind `Arc<Mutex<Mixer>>`; the
/// device callback only ever `try_lock`s it.
pub struct Mixer {
    voices: HashMap<u32, Voice>,
    mixed: Vec<AudioCallback>,
    master_volume: f32,
    sample_rate: u32,
    commands: ringbuf::HeapCons<MixerCmd>,
}

impl Mixer {
    pub fn new(sample_rate: u32, commands: ringbuf::HeapCons<MixerCmd>) -> Self {
        Self { voices: HashMap::new(), mixed: Vec::new(), master_volume: 1.0, sample_rate, commands }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Drain pending commands from the ring buffer and apply them.
    pub fn drain_commands(&mut self) {
        while let Some(cmd) = self.commands.try_pop() {
            self.apply(cmd);
        }
    }

    fn apply(&mut self, cmd: MixerCmd) {
        match cmd {
            MixerCmd::AddVoice(id, voice) => {
                self.voices.insert(id, *voice);
            }
            MixerCmd::RemoveVoice(id) => {
                if let Some(v) = self.voices.remove(&id) {
                    v.active.store(false, Ordering::Relaxed);
                }
            }
            MixerCmd::Play(id) => {
                if let Some(v) = self.voices.get_mut(&id) {
                    v.rewind();
                    v.playing = true;
                    v.paused = false;
                    v.publish();
                }
            }
            MixerCmd::PlayMusic(id, decoder) => {
                if let Some(v) = self.voices.get_mut(&id) {
                    v.source = Source::Music { decoder: Some(*decoder) };
                    v.rewind();
                    v.playing = true;
                    v.paused = false;
                    v.publish();
                }
            }
            MixerCmd::Stop(id) => {
                if let Some(v) = self.voices.get_mut(&id) {
                    v.playing = false;
                    v.paused = false;
                    v.rewind();
                    if let Source::Music { decoder } = &mut v.source {
                        *decoder = None;
                    }
                    v.publish();
                }
            }
            MixerCmd::Pause(id) => {
                if let Some(v) = self.voices.get_mut(&id) {
                    v.paused = true;
                    v.publish();
                }
            }
            MixerCmd::Resume(id) => {
                if let Some(v) = self.voices.get_mut(&id) {
                    v.paused = false;
                    v.publish();
                }
            }
            MixerCmd::SetVolume(id, volume) => {
                if let Some(v) = self.voices.get_mut(&id) {
                    v.volume = volume;
                }
            }
            MixerCmd::SetMasterVolume(volume) => self.master_volume = volume,
            MixerCmd::AttachProcessor(id, cb) => {
                if let Some(v) = self.voices.get_mut(&id) {
                    v.processors.push(cb);
                }
            }
            MixerCmd::DetachProcessor(id, cb) => {
                if let Some(v) = self.voices.get_mut(&id) {
                    remove_callback(&mut v.processors, &cb);
                }
            }
            MixerCmd::SetCallback(id, cb) => {
                if let Some(v) = self.voices.get_mut(&id) {
                    v.callback = cb;
                    v.pending.clear();
                    v.pending_pos = 0;
                }
            }
            MixerCmd::AttachMixed(cb) => self.mixed.push(cb),
            MixerCmd::DetachMixed(cb) => remove_callback(&mut self.mixed, &cb),
        }
    }

    /// Mix every active voice into `output` (interleaved, `out_channels`
    /// wide), then apply master volume and the mixed processors.
    ///
    /// **Called on the real-time audio thread.**
    pub fn render(&mut self, output: &mut [f32], out_channels: usize) {
        self.drain_commands();
        output.fill(0.0);
        let out_channels = out_channels.max(1);
        let frames = output.len() / out_channels;

        for voice in self.voices.values_mut() {
            if !voice.playing || voice.paused {
                continue;
            }
            voice.render(frames, out_channels, self.sample_rate);
            let gain = voice.volume;
            for (d, &s) in output.iter_mut().zip(voice.scratch.iter()) {
                *d += s * gain;
            }
        }

        // Apply master gain
        if (self.master_volume - 1.0).abs() > 1e-6 {
            for s in output.iter_mut() {
                *s *= self.master_volume;
            }
        }

        for processor in &self.mixed {
            processor(output, out_channels as u32);
        }
    }
}

/// Remove the first entry that is the same callback object, the way the
/// native API matches callbacks by identity.
fn remove_callback(list: &mut Vec<AudioCallback>, cb: &AudioCallback) {
    if let Some(pos) = list.iter().position(|c| Arc::ptr_eq(c, cb)) {
        list.remove(pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::{
        traits::{Producer as _, Split},
        HeapRb,
    };

    fn mixer(rate: u32) -> (Mixer, ringbuf::HeapProd<MixerCmd>) {
        let (tx, rx) = HeapRb::<MixerCmd>::new(16).split();
        (Mixer::new(rate, rx), tx)
    }

    fn buffer_voice(samples: Vec<f32>, channels: u32, rate: u32) -> (Box<Voice>, Arc<AtomicBool>) {
        let active = Arc::new(AtomicBool::new(false));
        let source = Source::Buffer { samples: samples.into(), cursor: 0 };
        (Box::new(Voice::new(source, channels, rate, Arc::clone(&active))), active)
    }

    fn push(tx: &mut ringbuf::HeapProd<MixerCmd>, cmd: MixerCmd) {
        assert!(tx.try_push(cmd).is_ok());
    }

    #[test]
    fn mono_buffer_plays_to_both_channels_then_stops() {
        let (mut m, mut tx) = mixer(100);
        let (voice, active) = buffer_voice(vec![0.5, 0.25], 1, 100);
        push(&mut tx, MixerCmd::AddVoice(1, voice));
        push(&mut tx, MixerCmd::Play(1));

        let mut out = vec![0.0; 8];
        m.render(&mut out, 2);
        assert_eq!(&out[..4], &[0.5, 0.5, 0.25, 0.25]);
        assert_eq!(&out[4..], &[0.0; 4]);
        assert!(!active.load(Ordering::Relaxed));
    }

    #[test]
    fn volume_and_master_volume_scale() {
        let (mut m, mut tx) = mixer(10);
        let (voice, active) = buffer_voice(vec![1.0, 1.0, 1.0, 1.0], 2, 10);
        push(&mut tx, MixerCmd::AddVoice(3, voice));
        push(&mut tx, MixerCmd::SetVolume(3, 0.5));
        push(&mut tx, MixerCmd::SetMasterVolume(0.5));
        push(&mut tx, MixerCmd::Play(3));

        let mut out = vec![0.0; 2];
        m.render(&mut out, 2);
        assert_eq!(out, vec![0.25, 0.25]);
        assert!(active.load(Ordering::Relaxed));
    }

    #[test]
    fn processors_see_the_voice_buffer_and_detach_by_identity() {
        let (mut m, mut tx) = mixer(10);
        let (voice, _active) = buffer_voice(vec![0.2; 20], 2, 10);
        let invert: AudioCallback = Arc::new(|buf: &mut [f32], _channels| {
            for s in buf.iter_mut() {
                *s = -*s;
            }
        });
        push(&mut tx, MixerCmd::AddVoice(1, voice));
        push(&mut tx, MixerCmd::AttachProcessor(1, Arc::clone(&invert)));
        push(&mut tx, MixerCmd::Play(1));

        let mut out = vec![0.0; 4];
        m.render(&mut out, 2);
        assert_eq!(out, vec![-0.2; 4]);

        push(&mut tx, MixerCmd::DetachProcessor(1, invert));
        m.render(&mut out, 2);
        assert_eq!(out, vec![0.2; 4]);
    }

    #[test]
    fn stream_callback_feeds_the_voice() {
        let (mut m, mut tx) = mixer(10);
        let (_prod, cons) = HeapRb::<f32>::new(8).split();
        let active = Arc::new(AtomicBool::new(false));
        let voice = Voice::new(Source::Stream { consumer: cons }, 1, 10, active);
        let fill: AudioCallback = Arc::new(|buf: &mut [f32], channels| {
            assert_eq!(channels, 1);
            buf.fill(0.75);
        });
        push(&mut tx, MixerCmd::AddVoice(9, Box::new(voice)));
        push(&mut tx, MixerCmd::SetCallback(9, Some(fill)));
        push(&mut tx, MixerCmd::Play(9));

        let mut out = vec![0.0; 6];
        m.render(&mut out, 2);
        assert_eq!(out, vec![0.75; 6]);
    }

    #[test]
    fn starved_stream_outputs_silence_and_keeps_playing() {
        let (mut m, mut tx) = mixer(10);
        let (mut prod, cons) = HeapRb::<f32>::new(8).split();
        let active = Arc::new(AtomicBool::new(false));
        let voice = Voice::new(Source::Stream { consumer: cons }, 2, 10, Arc::clone(&active));
        push(&mut tx, MixerCmd::AddVoice(2, Box::new(voice)));
        push(&mut tx, MixerCmd::Play(2));

        let mut out = vec![1.0; 4];
        m.render(&mut out, 2);
        assert_eq!(out, vec![0.0; 4]);
        assert!(active.load(Ordering::Relaxed));

        prod.push_slice(&[0.1, 0.2, 0.1, 0.2, 0.1, 0.2]);
        m.render(&mut out, 2);
        assert_eq!(out, vec![0.1, 0.2, 0.1, 0.2]);
    }

    #[test]
    fn mixed_processor_runs_on_the_master_bus() {
        let (mut m, mut tx) = mixer(10);
        let seen = Arc::new(AtomicBool::new(false));
        let seen_cb = Arc::clone(&seen);
        let cb: AudioCallback = Arc::new(move |buf: &mut [f32], channels| {
            assert_eq!(channels, 2);
            assert_eq!(buf.len(), 8);
            seen_cb.store(true, Ordering::Relaxed);
        });
        push(&mut tx, MixerCmd::AttachMixed(cb));
        let mut out = vec![0.0; 8];
        m.render(&mut out, 2);
        assert!(seen.load(Ordering::Relaxed));
    }

    #[test]
    fn half_rate_source_is_interpolated() {
        let (mut m, mut tx) = mixer(20);
        let (voice, _) = buffer_voice(vec![0.0, 1.0, 1.0], 1, 10);
        push(&mut tx, MixerCmd::AddVoice(1, voice));
        push(&mut tx, MixerCmd::Play(1));
        let mut out = vec![0.0; 3];
        m.render(&mut out, 1);
        assert_eq!(out, vec![0.0, 0.5, 1.0]);
    }
}

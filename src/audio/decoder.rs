use std::{
    fs::File,
    io::Cursor,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use ringbuf::{
    traits::{Observer as _, Producer as _, Split},
    HeapRb,
};
use symphonia::core::{
    audio::{AudioBufferRef, SampleBuffer, Signal},
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader},
    io::{MediaSource, MediaSourceStream},
    meta::MetadataOptions,
    probe::Hint,
};

/// Stereo f32 samples buffered ahead of the playback thread (~3 s at 44.1 kHz)
const RING_CAPACITY: usize = 44100 * 2 * 3;

/// Fully decoded PCM, interleaved f32 in the file's channel layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedPcm {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u32,
}

impl DecodedPcm {
    pub fn frame_count(&self) -> u32 {
        if self.channels == 0 {
            return 0;
        }
        (self.samples.len() / self.channels as usize) as u32
    }
}

// ── Whole-file decode (waves, sounds) ─────────────────────────────────────────

/// Decode every packet of the first audio track in `path`.
pub fn decode_file(path: &Path) -> Result<DecodedPcm, String> {
    let file = File::open(path).map_err(|e| format!("Cannot open {}: {e}", path.display()))?;
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    decode_source(Box::new(file), hint)
}

/// Decode an in-memory file. `file_type` is an extension such as `".wav"`.
pub fn decode_memory(file_type: &str, bytes: Vec<u8>) -> Result<DecodedPcm, String> {
    let mut hint = Hint::new();
    hint.with_extension(file_type.trim_start_matches('.'));
    decode_source(Box::new(Cursor::new(bytes)), hint)
}

fn open_format(source: Box<dyn MediaSource>, hint: &Hint) -> Result<Box<dyn FormatReader>, String> {
    let mss = MediaSourceStream::new(source, Default::default());
    let probed = symphonia::default::get_probe()
        .format(hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| format!("Probe failed: {e}"))?;
    Ok(probed.format)
}

fn decode_source(source: Box<dyn MediaSource>, hint: Hint) -> Result<DecodedPcm, String> {
    let mut format = open_format(source, &hint)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or("No audio track found")?
        .clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("Codec init: {e}"))?;

    let mut pcm = DecodedPcm {
        samples: Vec::new(),
        sample_rate: track.codec_params.sample_rate.unwrap_or(44100),
        channels: track.codec_params.channels.map(|c| c.count() as u32).unwrap_or(2),
    };
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(format!("Format read: {e}")),
        };
        if packet.track_id() != track.id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Decode error (skip): {e}");
                continue;
            }
            Err(e) => return Err(format!("Fatal decode: {e}")),
        };

        let spec = *decoded.spec();
        let buf = sample_buf.get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
        if buf.capacity() < decoded.capacity() * spec.channels.count() {
            *buf = SampleBuffer::new(decoded.capacity() as u64, spec);
        }
        buf.copy_interleaved_ref(decoded);
        pcm.samples.extend_from_slice(buf.samples());
    }

    Ok(pcm)
}

/// Write interleaved f32 samples as a 32-bit float WAV file.
pub fn export_wav(path: &Path, samples: &[f32], sample_rate: u32, channels: u32) -> Result<(), String> {
    let spec = hound::WavSpec {
        channels: channels as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| format!("Cannot create {}: {e}", path.display()))?;
    for &s in samples {
        writer.write_sample(s).map_err(|e| format!("Write failed: {e}"))?;
    }
    writer.finalize().map_err(|e| format!("Finalize failed: {e}"))
}

// ── Streaming decode (music) ──────────────────────────────────────────────────

/// Consumer-side handle owned by the audio render thread.
pub struct DecoderHandle {
    pub consumer: ringbuf::HeapCons<f32>,
    pub stop_flag: Arc<AtomicBool>,
    /// Set true when decode thread reaches terminal end (EOF or fatal error).
    pub decode_done: Arc<AtomicBool>,
    /// Total frames written by decoder (used for position estimates)
    pub frames_written: Arc<AtomicU64>,
}

impl Drop for DecoderHandle {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}

/// Stream facts gathered without decoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u32,
    /// 0 when the container does not say.
    pub total_frames: u64,
}

pub fn probe_metadata(path: &Path) -> Result<StreamInfo, String> {
    let file = File::open(path).map_err(|e| format!("Cannot open {}: {e}", path.display()))?;
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let format = open_format(Box::new(file), &hint)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or("No audio track found")?;
    Ok(StreamInfo {
        sample_rate: track.codec_params.sample_rate.unwrap_or(44100),
        channels: track.codec_params.channels.map(|c| c.count() as u32).unwrap_or(2),
        total_frames: track.codec_params.n_frames.unwrap_or(0),
    })
}

/// Spawn a background Symphonia decode thread for `path`.
/// Returns a `DecoderHandle` the audio thread uses to pull stereo PCM.
pub fn spawn_decoder(path: PathBuf) -> Result<DecoderHandle, String> {
    let rb = HeapRb::<f32>::new(RING_CAPACITY);
    let (mut producer, consumer) = rb.split();

    let stop_flag = Arc::new(AtomicBool::new(false));
    let decode_done = Arc::new(AtomicBool::new(false));
    let frames_written = Arc::new(AtomicU64::new(0));

    let handle = DecoderHandle {
        consumer,
        stop_flag: Arc::clone(&stop_flag),
        decode_done: Arc::clone(&decode_done),
        frames_written: Arc::clone(&frames_written),
    };

    thread::Builder::new()
        .name(format!("dec:{}", path.file_name().unwrap_or_default().to_string_lossy()))
        .spawn(move || {
            if let Err(e) = decode_loop(&path, &mut producer, &stop_flag, &frames_written) {
                log::warn!("Decoder exited: {e}");
            }
            decode_done.store(true, Ordering::Relaxed);
        })
        .map_err(|e| format!("Failed to spawn decoder thread: {e}"))?;

    Ok(handle)
}

fn decode_loop(
    path: &Path,
    producer: &mut ringbuf::HeapProd<f32>,
    stop_flag: &AtomicBool,
    frames_written: &AtomicU64,
) -> Result<(), String> {
    let file = File::open(path).map_err(|e| format!("Cannot open {}: {e}", path.display()))?;
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let mut format = open_format(Box::new(file), &hint)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or("No audio track found")?
        .clone();
    let track_id = track.id;
    let n_channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("Codec init: {e}"))?;

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => {
                log::warn!("Format read: {e}");
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Decode error (skip): {e}");
                continue;
            }
            Err(e) => {
                log::warn!("Fatal decode: {e}");
                break;
            }
        };
        let n = push_decoded(decoded, n_channels, producer, stop_flag);
        frames_written.fetch_add(n as u64, Ordering::Relaxed);
    }
    Ok(())
}

/// Push one stereo frame, waiting for room for both samples so the
/// interleaving never breaks. Returns false when asked to stop.
fn push_frame(producer: &mut ringbuf::HeapProd<f32>, l: f32, r: f32, stop_flag: &AtomicBool) -> bool {
    loop {
        if stop_flag.load(Ordering::Relaxed) {
            return false;
        }
        if producer.vacant_len() >= 2 {
            let _ = producer.try_push(l);
            let _ = producer.try_push(r);
            return true;
        }
        thread::yield_now();
    }
}

/// Convert `AudioBufferRef` to interleaved f32 stereo, pushing into the ring buffer.
/// Returns number of frames pushed.
fn push_decoded(
    buf: AudioBufferRef<'_>,
    n_channels: usize,
    producer: &mut ringbuf::HeapProd<f32>,
    stop_flag: &AtomicBool,
) -> usize {
    let frames = buf.frames();
    let mut written = 0;

    macro_rules! push_frames {
        ($b:expr, $conv:expr) => {{
            let chan0 = $b.chan(0);
            let chan1 = if n_channels > 1 { $b.chan(1) } else { $b.chan(0) };
            for i in 0..frames {
                if !push_frame(producer, $conv(chan0[i]), $conv(chan1[i]), stop_flag) {
                    return written;
                }
                written += 1;
            }
        }};
    }

    match buf {
        AudioBufferRef::F32(b) => push_frames!(b, |s: f32| s),
        AudioBufferRef::F64(b) => push_frames!(b, |s: f64| s as f32),
        AudioBufferRef::S32(b) => push_frames!(b, |s: i32| s as f32 / i32::MAX as f32),
        AudioBufferRef::S16(b) => push_frames!(b, |s: i16| s as f32 / i16::MAX as f32),
        // U8 is unsigned 0-255 centred at 128
        AudioBufferRef::U8(b) => push_frames!(b, |s: u8| (s as f32 - 128.0) / 128.0),
        _ => {
            // Unsupported format: push silence
            for _ in 0..frames {
                if !push_frame(producer, 0.0, 0.0, stop_flag) {
                    return written;
                }
                written += 1;
            }
        }
    }

    written
}

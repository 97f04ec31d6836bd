use std::sync::{Arc, Mutex};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, Stream, StreamConfig,
};

use super::mixer::Mixer;

/// The default output device, rendering the shared mixer on the CPAL thread.
pub struct OutputDevice {
    _stream: Stream,
    pub sample_rate: u32,
    pub channels: usize,
    pub name: String,
}

impl OutputDevice {
    /// Open the default output device and start pulling from `mixer`.
    ///
    /// The mixer's sample rate is switched to the device rate before the
    /// stream starts.
    pub fn open(mixer: Arc<Mutex<Mixer>>) -> Result<Self, String> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or("No default audio output device found")?;

        let config = device
            .default_output_config()
            .map_err(|e| format!("Default config error: {e}"))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        let name = device.name().unwrap_or_default();

        log::info!("Audio device: {name} | sample rate: {sample_rate} | channels: {channels}");

        match mixer.lock() {
            Ok(mut m) => m.set_sample_rate(sample_rate),
            Err(poisoned) => poisoned.into_inner().set_sample_rate(sample_rate),
        }

        let stream = Self::build_stream(&device, &config.into(), mixer, channels)?;
        stream.play().map_err(|e| format!("Stream play error: {e}"))?;

        Ok(Self { _stream: stream, sample_rate, channels, name })
    }

    fn build_stream(
        device: &Device,
        config: &StreamConfig,
        mixer: Arc<Mutex<Mixer>>,
        channels: usize,
    ) -> Result<Stream, String> {
        let err_fn = |e| log::error!("CPAL stream error: {e}");

        device
            .build_output_stream(
                config,
                move |output: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    audio_callback(output, &mixer, channels);
                },
                err_fn,
                None,
            )
            .map_err(|e| format!("Build stream error: {e}"))
    }
}

// SAFETY: OutputDevice holds a cpal::Stream which is !Send on some platforms.
// It is created, used and dropped on the thread that owns the native library
// (the script thread); only the mixer it points at is shared.
unsafe impl Send for OutputDevice {}

// ── Real-time audio callback ─────────────────────────────────────────────────
//
// Runs on the CPAL real-time thread. Never blocks: if the main thread holds
// the mixer, this period is silence.
fn audio_callback(output: &mut [f32], mixer: &Mutex<Mixer>, channels: usize) {
    let mut mixer = match mixer.try_lock() {
        Ok(g) => g,
        Err(_) => {
            output.fill(0.0);
            return;
        }
    };
    mixer.render(output, channels);
}

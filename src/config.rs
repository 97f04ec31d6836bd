/// `config.rs`: binding configuration loaded from JSON
///
/// Every section has defaults, so an empty object (or no file at all) is a
/// valid configuration.
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scripting::sandbox::TrustLevel;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    pub trust: TrustLevel,
    pub callbacks: CallbackNames,
    pub audio: AudioConfig,
    pub headless: HeadlessConfig,
    /// Default `env_logger` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            trust: TrustLevel::default(),
            callbacks: CallbackNames::default(),
            audio: AudioConfig::default(),
            headless: HeadlessConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl BindingConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Names of the script globals the audio callbacks dispatch to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackNames {
    pub stream_processor: String,
    pub mixed_processor: String,
    pub stream_callback: String,
}

impl Default for CallbackNames {
    fn default() -> Self {
        Self {
            stream_processor: "AudioStreamProcessor".to_string(),
            mixed_processor: "AudioMixedProcessor".to_string(),
            stream_callback: "AudioStreamCallback".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Open a real output device on `InitAudioDevice`. When false the mixer
    /// only runs when pumped explicitly.
    pub open_device: bool,
    /// Capacity of the main -> audio thread command queue.
    pub command_queue: usize,
    /// Frames per sub-buffer of an `AudioStream`.
    pub stream_buffer_frames: u32,
    /// Output format used when no device is open.
    pub sample_rate: u32,
    pub channels: u16,
    /// Upper bound on how long a finished script waits for playing voices.
    pub linger_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            open_device: true,
            command_queue: 256,
            stream_buffer_frames: 4096,
            sample_rate: 44100,
            channels: 2,
            linger_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadlessConfig {
    pub screen_width: i32,
    pub screen_height: i32,
    /// Frames after which `WindowShouldClose` reports true; `None` never closes.
    pub frame_limit: Option<u64>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self { screen_width: 800, screen_height: 450, frame_limit: Some(600) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_takes_defaults() {
        let config = BindingConfig::from_json("{}").unwrap();
        assert_eq!(config.trust, TrustLevel::Basic);
        assert_eq!(config.callbacks.stream_processor, "AudioStreamProcessor");
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.headless.frame_limit, Some(600));
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = BindingConfig::from_json(
            r#"{ "trust": "file_read",
                 "audio": { "open_device": false },
                 "headless": { "frame_limit": null },
                 "callbacks": { "mixed_processor": "OnMix" } }"#,
        )
        .unwrap();
        assert_eq!(config.trust, TrustLevel::FileRead);
        assert!(!config.audio.open_device);
        assert_eq!(config.audio.command_queue, 256);
        assert_eq!(config.headless.frame_limit, None);
        assert_eq!(config.headless.screen_width, 800);
        assert_eq!(config.callbacks.mixed_processor, "OnMix");
        assert_eq!(config.callbacks.stream_callback, "AudioStreamCallback");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = BindingConfig::load("/nonexistent/raylua.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

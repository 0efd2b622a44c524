//! Engine configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::broadcast::DEFAULT_WRITE_TIMEOUT;
use crate::media::{DEFAULT_FALLBACK_BITRATE, DEFAULT_PROBE_TIMEOUT, DEFAULT_SOX_BINARY};
use crate::registry::DEFAULT_LISTENER_BUFFER;

/// Engine configuration options
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Program asset played by `start`
    pub program_path: PathBuf,

    /// Directory searched for effects
    pub effects_dir: PathBuf,

    /// Bitrate used when probing fails (bits/sec)
    pub fallback_bitrate: u64,

    /// Bits per byte of pacing rate
    pub bitrate_divisor: u64,

    /// Bound on a bitrate probe
    pub probe_timeout: Duration,

    /// Container/codec name handed to the mixer for every input and the output
    pub media_type: String,

    /// Volume multiplier of the program in an overlay mix
    pub program_volume: f32,

    /// Volume multiplier of the effect in an overlay mix
    pub effect_volume: f32,

    /// Chunks buffered per listener
    pub listener_buffer: usize,

    /// Time a listener gets to accept a chunk before it is dropped
    pub write_timeout: Duration,

    /// Time the mixer gets to produce its first bytes
    pub mix_start_timeout: Duration,

    /// SoX executable
    pub sox_binary: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program_path: PathBuf::from("audio/songs/conversation.mp3"),
            effects_dir: PathBuf::from("audio/fx"),
            fallback_bitrate: DEFAULT_FALLBACK_BITRATE,
            bitrate_divisor: 8,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            media_type: "mp3".to_string(),
            program_volume: 0.99,
            effect_volume: 0.1,
            listener_buffer: DEFAULT_LISTENER_BUFFER,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            mix_start_timeout: Duration::from_secs(5),
            sox_binary: PathBuf::from(DEFAULT_SOX_BINARY),
        }
    }
}

impl EngineConfig {
    /// Create a config for a program and effects directory
    pub fn new(program_path: impl Into<PathBuf>, effects_dir: impl Into<PathBuf>) -> Self {
        Self {
            program_path: program_path.into(),
            effects_dir: effects_dir.into(),
            ..Default::default()
        }
    }

    /// Set the program asset
    pub fn program(mut self, path: impl Into<PathBuf>) -> Self {
        self.program_path = path.into();
        self
    }

    /// Set the effects directory
    pub fn effects_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.effects_dir = dir.into();
        self
    }

    /// Set the fallback bitrate (bits/sec)
    pub fn fallback_bitrate(mut self, bits_per_sec: u64) -> Self {
        self.fallback_bitrate = bits_per_sec;
        self
    }

    /// Set the probe timeout
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the media type handed to the mixer
    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    /// Set program and effect volumes for overlays
    pub fn volumes(mut self, program: f32, effect: f32) -> Self {
        self.program_volume = program;
        self.effect_volume = effect;
        self
    }

    /// Set the per-listener buffer in chunks
    pub fn listener_buffer(mut self, chunks: usize) -> Self {
        self.listener_buffer = chunks.max(1);
        self
    }

    /// Set the listener write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the mixer start timeout
    pub fn mix_start_timeout(mut self, timeout: Duration) -> Self {
        self.mix_start_timeout = timeout;
        self
    }

    /// Set the SoX executable
    pub fn sox_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.sox_binary = binary.into();
        self
    }

    /// Pacing rate in bytes/sec for a probed bitrate
    pub fn bytes_per_sec(&self, bits_per_sec: u64) -> u64 {
        (bits_per_sec / self.bitrate_divisor.max(1)).max(1)
    }
}

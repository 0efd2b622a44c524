//! Bitrate discovery
//!
//! Asks the audio tool for an asset's encoded bitrate. Any failure is
//! absorbed: the probe logs it and answers with the configured fallback, so
//! playback can always start.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::tool::{AudioTool, ProbeOutput};

/// Default bitrate used when probing fails (bits/sec)
pub const DEFAULT_FALLBACK_BITRATE: u64 = 128_000;

/// Default bound on a probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a probe did not produce a bitrate
#[derive(Debug)]
pub enum ProbeError {
    /// The tool could not be run
    Spawn(std::io::Error),
    /// The tool did not answer in time
    Timeout(Duration),
    /// The tool reported an error
    Reported(String),
    /// The tool's answer was not a bitrate
    Malformed(String),
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::Spawn(e) => write!(f, "failed to run audio tool: {}", e),
            ProbeError::Timeout(after) => write!(f, "audio tool timed out after {:?}", after),
            ProbeError::Reported(msg) => write!(f, "audio tool reported: {}", msg),
            ProbeError::Malformed(out) => write!(f, "unrecognized bitrate output: {:?}", out),
        }
    }
}

impl std::error::Error for ProbeError {}

/// Bitrate probe with a bounded wait and a fallback
pub struct BitrateProbe<T: AudioTool> {
    tool: Arc<T>,
    fallback: u64,
    timeout: Duration,
}

impl<T: AudioTool> BitrateProbe<T> {
    /// Create a probe with the default fallback and timeout
    pub fn new(tool: Arc<T>) -> Self {
        Self {
            tool,
            fallback: DEFAULT_FALLBACK_BITRATE,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Set the fallback bitrate (bits/sec)
    pub fn fallback(mut self, bits_per_sec: u64) -> Self {
        self.fallback = bits_per_sec;
        self
    }

    /// Set the probe timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probe an asset, reporting failures
    pub async fn try_probe(&self, asset: &Path) -> Result<u64, ProbeError> {
        let output = tokio::time::timeout(self.timeout, self.tool.query_bitrate(asset))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))?
            .map_err(ProbeError::Spawn)?;

        match output {
            ProbeOutput::Failed(msg) => Err(ProbeError::Reported(msg)),
            ProbeOutput::Reported(text) => {
                parse_bitrate(&text).ok_or(ProbeError::Malformed(text))
            }
        }
    }

    /// Probe an asset, answering the fallback on any failure
    pub async fn probe(&self, asset: &Path) -> u64 {
        match self.try_probe(asset).await {
            Ok(bitrate) => {
                tracing::debug!(asset = %asset.display(), bitrate = bitrate, "Bitrate probed");
                bitrate
            }
            Err(e) => {
                tracing::warn!(
                    asset = %asset.display(),
                    error = %e,
                    fallback = self.fallback,
                    "Bitrate probe failed, using fallback"
                );
                self.fallback
            }
        }
    }
}

/// Parse a bitrate summary such as `128k`, `1.41M` or `96000` into bits/sec
pub fn parse_bitrate(text: &str) -> Option<u64> {
    let token = text.split_whitespace().next()?;

    let (number, multiplier) = match token.char_indices().last()? {
        (i, 'k') | (i, 'K') => (&token[..i], 1_000.0),
        (i, 'M') => (&token[..i], 1_000_000.0),
        _ => (token, 1.0),
    };

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value <= 0.0 {
        return None;
    }

    let bits = (value * multiplier).round() as u64;
    (bits > 0).then_some(bits)
}

//! Audio tool integration
//!
//! This module provides:
//! - The [`AudioTool`] seam to the external audio processor
//! - A SoX implementation of it
//! - Bitrate probing with a bounded wait and a fallback
//! - The owned byte source type the pipeline moves around

pub mod probe;
pub mod source;
pub mod sox;
pub mod tool;

#[cfg(test)]
pub(crate) mod fake;

pub use probe::{
    parse_bitrate, BitrateProbe, ProbeError, DEFAULT_FALLBACK_BITRATE, DEFAULT_PROBE_TIMEOUT,
};
pub use source::{ByteSource, SourceKind};
pub use sox::{Sox, DEFAULT_SOX_BINARY};
pub use tool::{AudioTool, Feeder, MixError, MixInput, MixSource, MixedStream, ProbeOutput};

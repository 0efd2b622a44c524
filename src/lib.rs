//! Live audio broadcast engine
//!
//! Plays one program to any number of listeners in real time and mixes
//! sound effects into it on demand without dropping anyone.
//!
//! # Architecture
//!
//! ```text
//!   program.mp3 ──┐
//!                 ├─► [SoX mix] ──► RateLimiter ──► BroadcastFanout ──► listeners
//!   effect.mp3 ───┘    (overlay)    (bytes/sec)     (Bytes, shared)
//! ```
//!
//! - [`registry`]: connected listeners, each a bounded channel
//! - [`broadcast`]: writes each chunk to every listener, pruning dead ones
//! - [`pacing`]: forwards an upstream at the program's byte rate
//! - [`media`]: the audio tool seam, SoX, and bitrate probing
//! - [`engine`]: start, stop, and overlay
//!
//! # Example
//!
//! ```no_run
//! use airwave::{Engine, EngineConfig};
//!
//! # async fn run() -> airwave::Result<()> {
//! let engine = Engine::new(EngineConfig::new("audio/songs/conversation.mp3", "audio/fx"));
//! let (_id, mut listener) = engine.connect_listener().await;
//!
//! engine.start().await?;
//! engine.overlay("applause").await?;
//!
//! while let Some(chunk) = listener.recv().await {
//!     // write chunk to the socket
//! #   let _ = chunk;
//! }
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod engine;
pub mod error;
pub mod media;
pub mod pacing;
pub mod registry;
pub mod stats;

pub use broadcast::BroadcastFanout;
pub use engine::{Command, Engine, EngineConfig, EnginePhase, EngineStatus};
pub use error::{Error, Result};
pub use media::{AudioTool, BitrateProbe, Sox};
pub use pacing::RateLimiter;
pub use registry::{ClientId, ClientRegistry, ClientStream};
pub use stats::FanoutStats;

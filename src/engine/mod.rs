//! Broadcast engine
//!
//! Wires the pieces of the live pipeline together and exposes the operator
//! commands.
//!
//! # Architecture
//!
//! ```text
//!   operator ──► Command ──► Engine ──┬──► BitrateProbe ──► AudioTool
//!                                     │
//!                                     ▼
//!                           ProgramState (Mutex)
//!                                     │
//!                      source ──► RateLimiter ──► BroadcastFanout
//!                                                       │
//!                                                       ▼
//!                                                ClientRegistry
//! ```
//!
//! The state lock is held for the whole of `start` and `stop`. An overlay
//! marks the pipeline as splicing and releases the lock while the mixer
//! starts, so other commands see the splice in progress and are rejected.

pub mod command;
pub mod config;
pub mod effects;
pub mod orchestrator;
pub mod state;

pub use command::Command;
pub use config::EngineConfig;
pub use effects::resolve_effect;
pub use orchestrator::Engine;
pub use state::{ActivePair, EnginePhase, EngineStatus, ProgramState};

//! Pipeline orchestrator
//!
//! The [`Engine`] owns the one playback pipeline and rewires it in response
//! to operator commands.
//!
//! # Overlay splice
//!
//! ```text
//!  before:   file ──► limiter A ──► fanout ──► listeners
//!
//!  1. spawn limiter B in front of the fanout (no upstream yet)
//!  2. A.detach()  ──► remainder of the program
//!  3. mixer(remainder @ program volume, effect @ effect volume)
//!  4. first merged bytes arrive ──► B.attach(merged), A.end()
//!
//!  after:    file ──► mixer ──► limiter B ──► fanout ──► listeners
//! ```
//!
//! Listeners stay registered throughout; only the bytes change. Between
//! steps 2 and 4 nothing is forwarded, so listeners hear a gap as long as
//! the mixer's startup, bounded by `mix_start_timeout`. If the mixer cannot
//! start, B is ended and the unconsumed remainder goes back to A.
//!
//! Steps 1 to 4 and the final state update run on a spawned task, so a
//! caller that gives up on `overlay` cannot leave the pipeline half-wired.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

use super::command::Command;
use super::config::EngineConfig;
use super::effects::resolve_effect;
use super::state::{ActivePair, EnginePhase, EngineStatus, ProgramState};
use crate::broadcast::BroadcastFanout;
use crate::error::{Error, Result};
use crate::media::{
    source, AudioTool, BitrateProbe, ByteSource, MixError, MixInput, MixedStream, Sox, SourceKind,
};
use crate::pacing::RateLimiter;
use crate::registry::{ClientId, ClientRegistry, ClientStream};
use crate::stats::FanoutStats;

/// Bytes read from the mixer to confirm it is producing output
const PRIME_SIZE: usize = 4096;

/// Overlay that did not complete
struct SpliceFailure {
    /// Pair to keep playing, if the old one could be resumed
    restored: Option<ActivePair>,
    error: Error,
}

/// Live broadcast engine
///
/// Construct once and share behind an `Arc` with the listener transport and
/// the control surface.
pub struct Engine<T: AudioTool = Sox> {
    config: Arc<EngineConfig>,
    tool: Arc<T>,
    registry: Arc<ClientRegistry>,
    fanout: Arc<BroadcastFanout>,
    probe: BitrateProbe<T>,
    state: Arc<Mutex<ProgramState>>,
}

impl Engine<Sox> {
    /// Create an engine driving SoX
    pub fn new(config: EngineConfig) -> Self {
        let sox = Sox::with_binary(config.sox_binary.clone());
        Self::with_tool(config, sox)
    }
}

impl<T: AudioTool> Engine<T> {
    /// Create an engine with a custom audio tool
    pub fn with_tool(config: EngineConfig, tool: T) -> Self {
        let tool = Arc::new(tool);
        let registry = Arc::new(ClientRegistry::with_listener_buffer(config.listener_buffer));
        let fanout = Arc::new(BroadcastFanout::with_write_timeout(
            Arc::clone(&registry),
            config.write_timeout,
        ));
        let probe = BitrateProbe::new(Arc::clone(&tool))
            .fallback(config.fallback_bitrate)
            .timeout(config.probe_timeout);
        let state = Arc::new(Mutex::new(ProgramState::new(config.program_path.clone())));

        Self {
            config: Arc::new(config),
            tool,
            registry,
            fanout,
            probe,
            state,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Listener registry
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Register a new listener
    ///
    /// Dropping the returned stream disconnects it; the fan-out prunes it on
    /// its next write.
    pub async fn connect_listener(&self) -> (ClientId, ClientStream) {
        self.registry.connect().await
    }

    /// Remove a listener
    pub async fn disconnect_listener(&self, id: ClientId) {
        self.registry.unregister(id).await;
    }

    /// Current phase
    pub async fn phase(&self) -> EnginePhase {
        self.state.lock().await.phase
    }

    /// Point-in-time status
    pub async fn status(&self) -> EngineStatus {
        let listeners = self.registry.len().await;
        self.state.lock().await.status(listeners)
    }

    /// Broadcast statistics
    pub fn fanout_stats(&self) -> FanoutStats {
        self.fanout.stats()
    }

    /// Run an operator command
    pub async fn execute(&self, command: Command) -> Result<()> {
        tracing::debug!(command = %command, "Executing command");
        match command {
            Command::Start => self.start().await,
            Command::Stop => self.stop().await,
            Command::Overlay(effect) => self.overlay(&effect).await,
        }
    }

    /// Start playing the program
    ///
    /// Only valid while idle. The bitrate is probed without holding the state
    /// lock, so status queries stay responsive during a slow probe.
    pub async fn start(&self) -> Result<()> {
        let program = {
            let state = self.state.lock().await;
            if state.phase != EnginePhase::Idle {
                return Err(Error::InvalidStateTransition {
                    operation: "start",
                    phase: state.phase,
                });
            }
            state.program.clone()
        };

        let bits_per_sec = self.probe.probe(&program).await;
        let bytes_per_sec = self.config.bytes_per_sec(bits_per_sec);

        let mut state = self.state.lock().await;
        // Another command may have run while probing
        if state.phase != EnginePhase::Idle {
            return Err(Error::InvalidStateTransition {
                operation: "start",
                phase: state.phase,
            });
        }

        let file = tokio::fs::File::open(&program).await.map_err(|e| {
            tracing::warn!(program = %program.display(), error = %e, "Cannot open program");
            Error::AssetNotFound(program.display().to_string())
        })?;

        let limiter = RateLimiter::spawn(bytes_per_sec, Arc::clone(&self.fanout));
        if limiter.attach(Box::new(file)).await.is_err() {
            limiter.end().await;
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "rate limiter stopped before start",
            )));
        }

        tracing::info!(
            program = %program.display(),
            bitrate = bits_per_sec,
            bytes_per_sec = bytes_per_sec,
            limiter = limiter.id(),
            "Playback started"
        );

        state.play(
            bytes_per_sec,
            ActivePair {
                limiter,
                source: SourceKind::Program,
            },
        );
        Ok(())
    }

    /// Stop playback
    ///
    /// No-op while idle. Once this returns no more bytes reach listeners.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.phase {
            EnginePhase::Idle => return Ok(()),
            EnginePhase::Splicing => {
                return Err(Error::InvalidStateTransition {
                    operation: "stop",
                    phase: state.phase,
                })
            }
            EnginePhase::Playing => {}
        }

        if let Some(pair) = state.idle() {
            let forwarded = pair.limiter.bytes_forwarded();
            pair.limiter.end().await;
            tracing::info!(forwarded = forwarded, "Playback stopped");
        }
        Ok(())
    }

    /// Mix an effect into the live program
    ///
    /// Only valid while playing. Fails without touching the pipeline if the
    /// effect cannot be resolved; fails and resumes the unmixed program if
    /// the mixer cannot start.
    ///
    /// The splice runs on its own task. Dropping the returned future does not
    /// interrupt it; the pipeline still ends up playing or idle.
    pub async fn overlay(&self, effect: &str) -> Result<()> {
        let splice = {
            let mut state = self.state.lock().await;
            if state.phase != EnginePhase::Playing {
                return Err(Error::InvalidStateTransition {
                    operation: "overlay",
                    phase: state.phase,
                });
            }

            let effect_path = resolve_effect(&self.config.effects_dir, effect).await?;

            let Some(old) = state.begin_splice() else {
                state.idle();
                return Err(Error::InvalidStateTransition {
                    operation: "overlay",
                    phase: EnginePhase::Idle,
                });
            };

            // No await between taking the pair and handing it to the task
            let splice = Splice {
                config: Arc::clone(&self.config),
                tool: Arc::clone(&self.tool),
                fanout: Arc::clone(&self.fanout),
                state: Arc::clone(&self.state),
            };
            tokio::spawn(splice.run(old, state.bytes_per_sec, effect_path))
        };

        match splice.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Splice task failed, playback stopped");
                let mut state = self.state.lock().await;
                if state.phase == EnginePhase::Splicing {
                    state.idle();
                }
                Err(Error::Mixing(e.to_string()))
            }
        }
    }
}

/// An overlay in progress, detached from the caller's task
struct Splice<T: AudioTool> {
    config: Arc<EngineConfig>,
    tool: Arc<T>,
    fanout: Arc<BroadcastFanout>,
    state: Arc<Mutex<ProgramState>>,
}

impl<T: AudioTool> Splice<T> {
    /// Replace `old` with the mixed pair and commit the outcome
    async fn run(self, old: ActivePair, bytes_per_sec: u64, effect_path: PathBuf) -> Result<()> {
        tracing::info!(effect = %effect_path.display(), "Splicing effect into program");

        let result = self.splice(old, bytes_per_sec, &effect_path).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(pair) => {
                tracing::info!(
                    effect = %effect_path.display(),
                    limiter = pair.limiter.id(),
                    "Overlay on air"
                );
                state.finish_splice(pair);
                Ok(())
            }
            Err(SpliceFailure {
                restored: Some(pair),
                error,
            }) => {
                tracing::warn!(error = %error, "Overlay failed, program resumed");
                state.finish_splice(pair);
                Err(error)
            }
            Err(SpliceFailure {
                restored: None,
                error,
            }) => {
                tracing::error!(error = %error, "Overlay failed, playback stopped");
                state.idle();
                Err(error)
            }
        }
    }

    async fn splice(
        &self,
        old: ActivePair,
        bytes_per_sec: u64,
        effect_path: &Path,
    ) -> std::result::Result<ActivePair, SpliceFailure> {
        // Next limiter is linked to the fanout before the old one lets go
        let next = RateLimiter::spawn(bytes_per_sec, Arc::clone(&self.fanout));

        let remainder = match old.limiter.detach().await {
            Some(remainder) => remainder,
            None => {
                tracing::debug!("Program already finished, mixing effect alone");
                source::empty()
            }
        };

        let inputs = vec![
            MixInput::feed(remainder, self.config.program_volume),
            MixInput::file(effect_path, self.config.effect_volume),
        ];

        let mixed = match self.tool.mix(inputs, &self.config.media_type) {
            Ok(mixed) => mixed,
            Err(MixError { error, feed }) => {
                return Err(restore(old, next, feed, error.to_string()).await);
            }
        };

        // Listeners hear nothing from here until the mixer's first bytes
        // arrive, at most `mix_start_timeout`
        let merged = match prime(mixed, self.config.mix_start_timeout).await {
            Ok(merged) => merged,
            Err((mixed, reason)) => {
                let feed = mixed.abandon().await;
                return Err(restore(old, next, feed, reason).await);
            }
        };

        if next.attach(merged).await.is_err() {
            // Merged stream is gone with the failed attach
            return Err(restore(old, next, None, "rate limiter stopped".into()).await);
        }

        old.limiter.end().await;

        Ok(ActivePair {
            limiter: next,
            source: SourceKind::Overlay {
                effect: effect_label(effect_path),
            },
        })
    }
}

/// Wait for the mixer's first bytes and put them back in front of the stream
async fn prime(
    mut mixed: MixedStream,
    timeout: Duration,
) -> std::result::Result<ByteSource, (MixedStream, String)> {
    let mut first = vec![0u8; PRIME_SIZE];
    match tokio::time::timeout(timeout, mixed.read(&mut first)).await {
        Ok(Ok(n)) if n > 0 => {
            first.truncate(n);
            Ok(Box::new(Cursor::new(first).chain(mixed)))
        }
        Ok(Ok(_)) => Err((mixed, "mixer produced no output".into())),
        Ok(Err(e)) => Err((mixed, e.to_string())),
        Err(_) => Err((mixed, format!("mixer produced no output within {:?}", timeout))),
    }
}

/// Undo a splice: drop the new limiter and resume the old one if possible
///
/// Program bytes already written into the mixer's stdin are not recovered.
async fn restore(
    old: ActivePair,
    next: RateLimiter,
    feed: Option<ByteSource>,
    reason: String,
) -> SpliceFailure {
    next.end().await;
    let error = Error::Mixing(reason);

    let Some(feed) = feed else {
        old.limiter.end().await;
        return SpliceFailure {
            restored: None,
            error,
        };
    };

    match old.limiter.attach(feed).await {
        Ok(()) => SpliceFailure {
            restored: Some(old),
            error,
        },
        Err(_) => {
            old.limiter.end().await;
            SpliceFailure {
                restored: None,
                error,
            }
        }
    }
}

fn effect_label(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

//! Program state machine
//!
//! Tracks the single playback pipeline from idle through playing and the
//! transient splicing phase of an overlay.

use std::path::PathBuf;

use crate::media::SourceKind;
use crate::pacing::RateLimiter;

/// Pipeline lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// No pipeline
    Idle,
    /// One source → limiter pair feeds the fan-out
    Playing,
    /// An overlay is replacing the active pair
    Splicing,
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnginePhase::Idle => write!(f, "idle"),
            EnginePhase::Playing => write!(f, "playing"),
            EnginePhase::Splicing => write!(f, "splicing"),
        }
    }
}

/// The live source → limiter pair
pub struct ActivePair {
    /// Limiter feeding the fan-out; owns the upstream
    pub limiter: RateLimiter,
    /// What the upstream is
    pub source: SourceKind,
}

/// State of the one playback pipeline
pub struct ProgramState {
    /// Current phase
    pub phase: EnginePhase,

    /// Program asset
    pub program: PathBuf,

    /// Pacing rate for the next limiter in bytes/sec (0 while idle)
    pub bytes_per_sec: u64,

    /// Active pair; `None` while idle and while splicing
    pub active: Option<ActivePair>,
}

impl ProgramState {
    /// Create an idle state for a program
    pub fn new(program: PathBuf) -> Self {
        Self {
            phase: EnginePhase::Idle,
            program,
            bytes_per_sec: 0,
            active: None,
        }
    }

    /// Enter playing with a new active pair
    pub fn play(&mut self, bytes_per_sec: u64, pair: ActivePair) {
        self.phase = EnginePhase::Playing;
        self.bytes_per_sec = bytes_per_sec;
        self.active = Some(pair);
    }

    /// Take the active pair out for replacement
    pub fn begin_splice(&mut self) -> Option<ActivePair> {
        self.phase = EnginePhase::Splicing;
        self.active.take()
    }

    /// Return to playing with `pair` after a splice
    pub fn finish_splice(&mut self, pair: ActivePair) {
        self.phase = EnginePhase::Playing;
        self.active = Some(pair);
    }

    /// Drop to idle, handing back the active pair for release
    pub fn idle(&mut self) -> Option<ActivePair> {
        self.phase = EnginePhase::Idle;
        self.bytes_per_sec = 0;
        self.active.take()
    }

    /// Snapshot for reporting
    pub fn status(&self, listeners: usize) -> EngineStatus {
        let active = self.active.as_ref();
        EngineStatus {
            phase: self.phase,
            program: self.program.clone(),
            source: active.map(|pair| pair.source.clone()),
            bytes_per_sec: active
                .map(|pair| pair.limiter.bytes_per_sec())
                .unwrap_or(self.bytes_per_sec),
            listeners,
            upstream_exhausted: active.map(|pair| pair.limiter.is_exhausted()).unwrap_or(false),
        }
    }
}

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub phase: EnginePhase,
    pub program: PathBuf,
    pub source: Option<SourceKind>,
    /// Rate of the live limiter
    pub bytes_per_sec: u64,
    pub listeners: usize,
    /// The active upstream has run out (program finished)
    pub upstream_exhausted: bool,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::broadcast::BroadcastFanout;
    use crate::registry::ClientRegistry;

    fn pair(source: SourceKind) -> ActivePair {
        let fanout = Arc::new(BroadcastFanout::new(Arc::new(ClientRegistry::new())));
        ActivePair {
            limiter: RateLimiter::spawn(16_000, fanout),
            source,
        }
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let mut state = ProgramState::new(PathBuf::from("song.mp3"));
        assert_eq!(state.phase, EnginePhase::Idle);
        assert!(state.active.is_none());

        state.play(16_000, pair(SourceKind::Program));
        assert_eq!(state.phase, EnginePhase::Playing);

        let old = state.begin_splice().expect("active pair");
        assert_eq!(state.phase, EnginePhase::Splicing);
        assert!(state.active.is_none());

        state.finish_splice(pair(SourceKind::Overlay {
            effect: "applause".into(),
        }));
        assert_eq!(state.phase, EnginePhase::Playing);
        old.limiter.end().await;

        let status = state.status(3);
        assert_eq!(status.listeners, 3);
        assert_eq!(status.bytes_per_sec, 16_000);
        assert_eq!(
            status.source,
            Some(SourceKind::Overlay {
                effect: "applause".into()
            })
        );

        let last = state.idle().expect("active pair");
        last.limiter.end().await;
        assert_eq!(state.phase, EnginePhase::Idle);
        assert_eq!(state.status(0).source, None);
    }

    #[tokio::test]
    async fn test_status_reports_live_limiter_rate() {
        let fanout = Arc::new(BroadcastFanout::new(Arc::new(ClientRegistry::new())));
        let mut state = ProgramState::new(PathBuf::from("song.mp3"));
        state.play(
            16_000,
            ActivePair {
                limiter: RateLimiter::spawn(8_000, fanout),
                source: SourceKind::Program,
            },
        );
        assert_eq!(state.status(0).bytes_per_sec, 8_000);

        let old = state.begin_splice().expect("active pair");
        assert_eq!(state.status(0).bytes_per_sec, 16_000);
        old.limiter.end().await;
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(EnginePhase::Idle.to_string(), "idle");
        assert_eq!(EnginePhase::Playing.to_string(), "playing");
        assert_eq!(EnginePhase::Splicing.to_string(), "splicing");
    }
}

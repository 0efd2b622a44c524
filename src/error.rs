//! Error types
//!
//! Failures that are surfaced to the caller of an engine operation. Probe and
//! per-listener write failures are absorbed where they happen and have their
//! own types ([`ProbeError`](crate::media::ProbeError),
//! [`SinkError`](crate::registry::SinkError)).

use crate::engine::EnginePhase;

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for engine operations
#[derive(Debug)]
pub enum Error {
    /// No asset matched the request
    AssetNotFound(String),
    /// More than one effect matched the request
    AmbiguousAsset {
        name: String,
        candidates: Vec<String>,
    },
    /// The external mixer failed to produce a merged stream
    Mixing(String),
    /// Operation is not allowed in the current phase
    InvalidStateTransition {
        operation: &'static str,
        phase: EnginePhase,
    },
    /// Command text could not be parsed
    InvalidCommand(String),
    /// I/O error
    Io(std::io::Error),
}

impl Error {
    /// Whether this error belongs to the asset-not-found class
    pub fn is_asset_error(&self) -> bool {
        matches!(self, Error::AssetNotFound(_) | Error::AmbiguousAsset { .. })
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::AssetNotFound(name) => write!(f, "Asset not found: {}", name),
            Error::AmbiguousAsset { name, candidates } => write!(
                f,
                "Asset name '{}' is ambiguous: {}",
                name,
                candidates.join(", ")
            ),
            Error::Mixing(msg) => write!(f, "Mixing failed: {}", msg),
            Error::InvalidStateTransition { operation, phase } => {
                write!(f, "Cannot {} while {}", operation, phase)
            }
            Error::InvalidCommand(cmd) => write!(f, "Invalid command: {:?}", cmd),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::InvalidStateTransition {
            operation: "overlay",
            phase: EnginePhase::Idle,
        };
        assert_eq!(err.to_string(), "Cannot overlay while idle");

        let err = Error::AmbiguousAsset {
            name: "clap".into(),
            candidates: vec!["Clap1.mp3".into(), "clap2.mp3".into()],
        };
        assert_eq!(
            err.to_string(),
            "Asset name 'clap' is ambiguous: Clap1.mp3, clap2.mp3"
        );
    }

    #[test]
    fn test_asset_class() {
        assert!(Error::AssetNotFound("x".into()).is_asset_error());
        assert!(Error::AmbiguousAsset {
            name: "x".into(),
            candidates: vec![]
        }
        .is_asset_error());
        assert!(!Error::Mixing("boom".into()).is_asset_error());
    }

    #[test]
    fn test_io_source() {
        use std::error::Error as _;

        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(err.source().is_some());
    }
}

//! Upstream byte sources

use tokio::io::AsyncRead;

/// An owned upstream byte source: a program file, a merged overlay stream, or
/// the unconsumed remainder of either.
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// What the active upstream is, for status reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Raw program asset
    Program,
    /// Program mixed with the named effect
    Overlay { effect: String },
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Program => write!(f, "program"),
            SourceKind::Overlay { effect } => write!(f, "program+{}", effect),
        }
    }
}

/// A source that is already at end of stream
pub fn empty() -> ByteSource {
    Box::new(tokio::io::empty())
}

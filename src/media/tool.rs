//! External audio tool interface
//!
//! All signal processing (bitrate inspection, decoding, volume, mixing,
//! transcoding) happens in an external program. The engine only moves bytes
//! in and out of it through [`AudioTool`].

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::source::ByteSource;

/// Read size when pumping a fed input into the mixer
const FEED_CHUNK_SIZE: usize = 16 * 1024;

/// What the tool printed for a bitrate query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutput {
    /// Text on the success channel (stdout)
    Reported(String),
    /// Text on the failure channel (stderr)
    Failed(String),
}

/// Where a mix input's bytes come from
pub enum MixSource {
    /// An asset on disk
    File(PathBuf),
    /// Bytes fed from the caller (at most one per mix)
    Feed(ByteSource),
}

impl std::fmt::Debug for MixSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MixSource::File(path) => f.debug_tuple("File").field(path).finish(),
            MixSource::Feed(_) => f.write_str("Feed(..)"),
        }
    }
}

/// One input of a mix with its volume multiplier
#[derive(Debug)]
pub struct MixInput {
    pub source: MixSource,
    pub volume: f32,
}

impl MixInput {
    /// An asset on disk
    pub fn file(path: impl Into<PathBuf>, volume: f32) -> Self {
        Self {
            source: MixSource::File(path.into()),
            volume,
        }
    }

    /// Bytes fed by the caller
    pub fn feed(source: ByteSource, volume: f32) -> Self {
        Self {
            source: MixSource::Feed(source),
            volume,
        }
    }
}

/// A mix that could not be started
///
/// Carries back the fed input, untouched, so the caller can resume it.
pub struct MixError {
    pub error: io::Error,
    pub feed: Option<ByteSource>,
}

impl MixError {
    pub fn new(error: io::Error, feed: Option<ByteSource>) -> Self {
        Self { error, feed }
    }
}

impl std::fmt::Debug for MixError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixError")
            .field("error", &self.error)
            .field("feed_recovered", &self.feed.is_some())
            .finish()
    }
}

impl std::fmt::Display for MixError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for MixError {}

/// Task pumping a fed input into a mixer's stdin
pub struct Feeder {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<Option<ByteSource>>,
}

impl Feeder {
    /// Start copying `source` into `sink`
    pub fn spawn<W>(mut source: ByteSource, mut sink: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (cancel, mut cancelled) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; FEED_CHUNK_SIZE];
            loop {
                let n = tokio::select! {
                    biased;
                    _ = &mut cancelled => return Some(source),
                    read = source.read(&mut buf) => match read {
                        Ok(0) => {
                            let _ = sink.shutdown().await;
                            return None;
                        }
                        Ok(n) => n,
                        Err(e) => {
                            tracing::warn!(error = %e, "Mixer feed read failed");
                            return None;
                        }
                    },
                };

                tokio::select! {
                    biased;
                    _ = &mut cancelled => return Some(source),
                    written = sink.write_all(&buf[..n]) => {
                        if let Err(e) = written {
                            tracing::debug!(error = %e, "Mixer stopped accepting input");
                            return Some(source);
                        }
                    }
                }
            }
        });

        Self {
            cancel: Some(cancel),
            task,
        }
    }

    /// Stop feeding and take back the unconsumed input
    pub async fn stop(mut self) -> Option<ByteSource> {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        (&mut self.task).await.ok().flatten()
    }
}

impl Drop for Feeder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Merged output of a running mix
///
/// Owns everything the mix keeps alive: the child process (killed on drop)
/// and the feeder copying the fed input into it. Dropping the stream releases
/// all of it.
pub struct MixedStream {
    output: ByteSource,
    child: Option<Child>,
    feeder: Option<Feeder>,
}

impl MixedStream {
    /// Wrap an already merged reader
    pub fn from_reader(output: ByteSource) -> Self {
        Self {
            output,
            child: None,
            feeder: None,
        }
    }

    /// Wrap a running mixer process and the feeder writing to its stdin
    pub fn from_process(output: ByteSource, child: Child, feeder: Option<Feeder>) -> Self {
        Self {
            output,
            child: Some(child),
            feeder,
        }
    }

    /// Attach a feeder whose lifetime is bound to this stream
    pub fn with_feeder(mut self, feeder: Feeder) -> Self {
        self.feeder = Some(feeder);
        self
    }

    /// Tear the mix down and recover the unconsumed fed input, if any
    ///
    /// Bytes already handed to the mixer are lost.
    pub async fn abandon(mut self) -> Option<ByteSource> {
        let remainder = match self.feeder.take() {
            Some(feeder) => feeder.stop().await,
            None => None,
        };
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        remainder
    }
}

impl std::fmt::Debug for MixedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixedStream")
            .field("pid", &self.child.as_ref().and_then(|c| c.id()))
            .field("feeding", &self.feeder.is_some())
            .finish()
    }
}

impl AsyncRead for MixedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.output).poll_read(cx, buf)
    }
}

/// External audio-processing collaborator
pub trait AudioTool: Send + Sync + 'static {
    /// Ask for the encoded bitrate of an asset
    fn query_bitrate(&self, path: &Path)
        -> impl Future<Output = io::Result<ProbeOutput>> + Send;

    /// Start mixing `inputs` into one stream encoded as `format`
    ///
    /// Input is consumed and output produced incrementally.
    fn mix(&self, inputs: Vec<MixInput>, format: &str) -> Result<MixedStream, MixError>;
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn test_feeder_copies_everything() {
        let (writer, mut reader) = tokio::io::duplex(1024);
        let source: ByteSource = Box::new(Cursor::new(vec![7u8; 40_000]));

        let feeder = Feeder::spawn(source, writer);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), 40_000);

        // Fully consumed, nothing to give back
        assert!(feeder.stop().await.is_none());
    }

    #[tokio::test]
    async fn test_feeder_stop_returns_remainder() {
        let total = 100_000usize;
        let (writer, mut reader) = tokio::io::duplex(4096);
        let source: ByteSource = Box::new(Cursor::new(vec![1u8; total]));

        let feeder = Feeder::spawn(source, writer);

        // Mixer reads a little, then stalls
        let mut head = vec![0u8; 4096];
        reader.read_exact(&mut head).await.unwrap();

        let mut remainder = feeder.stop().await.expect("remainder");
        let mut rest = Vec::new();
        remainder.read_to_end(&mut rest).await.unwrap();

        assert!(!rest.is_empty());
        assert!(rest.len() < total - 4096);
    }

    #[tokio::test]
    async fn test_mixed_stream_reads_output() {
        let mut mixed = MixedStream::from_reader(Box::new(Cursor::new(b"merged".to_vec())));

        let mut out = String::new();
        mixed.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "merged");
        assert!(mixed.abandon().await.is_none());
    }

    #[tokio::test]
    async fn test_mixed_stream_abandon_recovers_feed() {
        let (writer, _reader) = tokio::io::duplex(16);
        let feeder = Feeder::spawn(Box::new(Cursor::new(vec![3u8; 1000])), writer);
        let mixed = MixedStream::from_reader(crate::media::source::empty()).with_feeder(feeder);

        let mut remainder = mixed.abandon().await.expect("remainder");
        let mut rest = Vec::new();
        remainder.read_to_end(&mut rest).await.unwrap();
        assert!(rest.len() <= 1000);
    }

    #[test]
    fn test_mix_input_debug() {
        let input = MixInput::file("fx/applause.mp3", 0.1);
        assert!(format!("{:?}", input).contains("applause.mp3"));

        let input = MixInput::feed(crate::media::source::empty(), 0.99);
        assert!(format!("{:?}", input).contains("Feed(..)"));
    }
}

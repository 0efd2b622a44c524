//! In-process audio tool for tests

use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

use super::source::ByteSource;
use super::tool::{AudioTool, Feeder, MixError, MixInput, MixSource, MixedStream, ProbeOutput};

/// How the fake answers a bitrate query
#[derive(Debug, Clone)]
pub(crate) enum FakeProbe {
    Reply(ProbeOutput),
    SpawnError,
    Hang,
}

/// How the fake answers a mix
#[derive(Debug, Clone)]
pub(crate) enum FakeMix {
    /// Merged output is `len` copies of `byte`; the feed is drained
    Produce { byte: u8, len: usize },
    /// Refuses to start and hands the feed back
    FailKeepFeed,
    /// Refuses to start and loses the feed
    FailLoseFeed,
    /// Starts, never produces output, and stops accepting input
    Stall,
}

/// Record of one mix request
#[derive(Debug, Clone)]
pub(crate) struct MixCall {
    pub files: Vec<PathBuf>,
    pub volumes: Vec<f32>,
    pub had_feed: bool,
    pub format: String,
}

pub(crate) struct FakeTool {
    probe: FakeProbe,
    mix: Mutex<FakeMix>,
    calls: Mutex<Vec<MixCall>>,
}

impl FakeTool {
    pub fn new(probe: FakeProbe, mix: FakeMix) -> Self {
        Self {
            probe,
            mix: Mutex::new(mix),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_probe(probe: FakeProbe) -> Self {
        Self::new(probe, FakeMix::Produce { byte: b'M', len: 1 << 20 })
    }

    pub fn set_mix(&self, mix: FakeMix) {
        *self.mix.lock().unwrap() = mix;
    }

    pub fn calls(&self) -> Vec<MixCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl AudioTool for FakeTool {
    async fn query_bitrate(&self, _path: &Path) -> io::Result<ProbeOutput> {
        match &self.probe {
            FakeProbe::Reply(output) => Ok(output.clone()),
            FakeProbe::SpawnError => Err(io::Error::new(io::ErrorKind::NotFound, "no tool")),
            FakeProbe::Hang => std::future::pending().await,
        }
    }

    fn mix(&self, inputs: Vec<MixInput>, format: &str) -> Result<MixedStream, MixError> {
        let mut call = MixCall {
            files: Vec::new(),
            volumes: Vec::new(),
            had_feed: false,
            format: format.to_string(),
        };
        let mut feed: Option<ByteSource> = None;
        for input in inputs {
            call.volumes.push(input.volume);
            match input.source {
                MixSource::File(path) => call.files.push(path),
                MixSource::Feed(source) => {
                    call.had_feed = true;
                    feed = Some(source);
                }
            }
        }
        self.calls.lock().unwrap().push(call);

        let behaviour = self.mix.lock().unwrap().clone();
        match behaviour {
            FakeMix::Produce { byte, len } => {
                let mixed = MixedStream::from_reader(Box::new(Cursor::new(vec![byte; len])));
                Ok(match feed {
                    Some(feed) => mixed.with_feeder(Feeder::spawn(feed, tokio::io::sink())),
                    None => mixed,
                })
            }
            FakeMix::FailKeepFeed => Err(MixError::new(
                io::Error::new(io::ErrorKind::NotFound, "mixer missing"),
                feed,
            )),
            FakeMix::FailLoseFeed => Err(MixError::new(
                io::Error::new(io::ErrorKind::Other, "mixer crashed"),
                None,
            )),
            FakeMix::Stall => {
                let mixed = MixedStream::from_reader(Box::new(Stalled));
                Ok(match feed {
                    Some(feed) => {
                        // Mixer end of the pipe is gone; the feeder gives up at once
                        let (writer, _gone) = tokio::io::duplex(64);
                        mixed.with_feeder(Feeder::spawn(feed, writer))
                    }
                    None => mixed,
                })
            }
        }
    }
}

/// Reader that never yields
struct Stalled;

impl AsyncRead for Stalled {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

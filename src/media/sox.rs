//! SoX-backed audio tool
//!
//! Bitrate query: `sox --i -B <file>` prints e.g. `128k`.
//!
//! Mix: `sox -m -t mp3 -v 0.99 - -t mp3 -v 0.1 fx.mp3 -t mp3 -` merges the
//! program fed on stdin with an effect file and writes the result to stdout.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::source::ByteSource;
use super::tool::{AudioTool, Feeder, MixError, MixInput, MixSource, MixedStream, ProbeOutput};

/// Default SoX executable name
pub const DEFAULT_SOX_BINARY: &str = "sox";

/// Audio tool driving the `sox` command line
#[derive(Debug, Clone)]
pub struct Sox {
    binary: PathBuf,
}

impl Sox {
    /// Use `sox` from `PATH`
    pub fn new() -> Self {
        Self::with_binary(DEFAULT_SOX_BINARY)
    }

    /// Use a specific executable
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Executable this tool runs
    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Default for Sox {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioTool for Sox {
    async fn query_bitrate(&self, path: &Path) -> io::Result<ProbeOutput> {
        let output = Command::new(&self.binary)
            .arg("--i")
            .arg("-B")
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !stderr.is_empty() {
            return Ok(ProbeOutput::Failed(stderr));
        }
        if !output.status.success() {
            return Ok(ProbeOutput::Failed(format!("sox exited with {}", output.status)));
        }
        Ok(ProbeOutput::Reported(stdout))
    }

    fn mix(&self, mut inputs: Vec<MixInput>, format: &str) -> Result<MixedStream, MixError> {
        let args = mix_args(&inputs, format);

        let mut feed: Option<ByteSource> = None;
        for input in inputs.iter_mut() {
            if let MixSource::Feed(source) = &mut input.source {
                let source = std::mem::replace(source, super::source::empty());
                if feed.is_some() {
                    return Err(MixError::new(
                        io::Error::new(io::ErrorKind::InvalidInput, "sox accepts one stdin input"),
                        feed,
                    ));
                }
                feed = Some(source);
            }
        }

        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .stdin(if feed.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return Err(MixError::new(e, feed)),
        };

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                return Err(MixError::new(
                    io::Error::new(io::ErrorKind::BrokenPipe, "sox stdout unavailable"),
                    feed,
                ))
            }
        };

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(line = %line, "sox");
                }
            });
        }

        let feeder = match (feed, child.stdin.take()) {
            (Some(source), Some(stdin)) => Some(Feeder::spawn(source, stdin)),
            (Some(source), None) => {
                return Err(MixError::new(
                    io::Error::new(io::ErrorKind::BrokenPipe, "sox stdin unavailable"),
                    Some(source),
                ))
            }
            (None, _) => None,
        };

        tracing::debug!(pid = ?child.id(), args = ?args, "Mixer started");

        Ok(MixedStream::from_process(Box::new(stdout), child, feeder))
    }
}

/// Build the SoX argument list for a mix
///
/// Fed inputs read from stdin (`-`); output goes to stdout.
pub fn mix_args(inputs: &[MixInput], format: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-m".into()];

    for input in inputs {
        args.push("-t".into());
        args.push(format.into());
        args.push("-v".into());
        args.push(input.volume.to_string().into());
        match &input.source {
            MixSource::File(path) => args.push(path.clone().into_os_string()),
            MixSource::Feed(_) => args.push("-".into()),
        }
    }

    args.push("-t".into());
    args.push(format.into());
    args.push("-".into());
    args
}

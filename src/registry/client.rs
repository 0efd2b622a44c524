//! Listener sink and stream types
//!
//! A listener is a bounded channel: the registry holds the sending half
//! ([`ClientSink`]) and the transport drains the receiving half
//! ([`ClientStream`]). Dropping the stream closes the sink, which is how a
//! disconnect becomes visible to the fan-out.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Unique identifier for a connected listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Why a write to a listener failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// The listener went away
    Closed,
    /// The listener did not drain within the write timeout
    Timeout,
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Closed => write!(f, "listener closed"),
            SinkError::Timeout => write!(f, "listener write timed out"),
        }
    }
}

impl std::error::Error for SinkError {}

/// Writing half of a listener connection
///
/// Cheap to clone; all clones feed the same listener.
#[derive(Debug, Clone)]
pub struct ClientSink {
    tx: mpsc::Sender<Bytes>,
}

impl ClientSink {
    /// Create a sink/stream pair buffering up to `capacity` chunks
    pub fn channel(capacity: usize) -> (ClientSink, ClientStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (ClientSink { tx }, ClientStream { rx })
    }

    /// Whether the receiving side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Write a chunk, waiting up to `timeout` for the listener to drain
    pub async fn write(&self, chunk: Bytes, timeout: Duration) -> Result<(), SinkError> {
        match tokio::time::timeout(timeout, self.tx.send(chunk)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SinkError::Closed),
            Err(_) => Err(SinkError::Timeout),
        }
    }
}

/// Reading half of a listener connection
#[derive(Debug)]
pub struct ClientStream {
    rx: mpsc::Receiver<Bytes>,
}

impl ClientStream {
    /// Receive the next chunk
    ///
    /// Returns `None` once the listener has been removed from the registry
    /// and every buffered chunk has been read.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Receive a chunk if one is already buffered
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently buffered, returning the byte count
    pub fn drain(&mut self) -> usize {
        let mut total = 0;
        while let Some(chunk) = self.try_recv() {
            total += chunk.len();
        }
        total
    }

    /// Stop receiving; the sink reports closed from now on
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_recv() {
        let (sink, mut stream) = ClientSink::channel(4);

        sink.write(Bytes::from_static(b"abc"), Duration::from_millis(50))
            .await
            .unwrap();

        assert_eq!(stream.recv().await.unwrap(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn test_closed_after_drop() {
        let (sink, stream) = ClientSink::channel(4);
        assert!(!sink.is_closed());

        drop(stream);

        assert!(sink.is_closed());
        let result = sink
            .write(Bytes::from_static(b"x"), Duration::from_millis(50))
            .await;
        assert_eq!(result, Err(SinkError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_listener_times_out() {
        let (sink, mut stream) = ClientSink::channel(1);

        sink.write(Bytes::from_static(b"1"), Duration::from_millis(50))
            .await
            .unwrap();
        let result = sink
            .write(Bytes::from_static(b"2"), Duration::from_millis(50))
            .await;
        assert_eq!(result, Err(SinkError::Timeout));

        assert_eq!(stream.drain(), 1);
    }
}

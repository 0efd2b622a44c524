//! Real-time pacing
//!
//! A [`RateLimiter`] is a spawned task that reads its upstream in chunks of
//! one tenth of a second and forwards them to the fan-out no faster than the
//! target rate. The upstream can be attached, detached and re-attached while
//! the task keeps its place in front of the fan-out.
//!
//! ```text
//!   attach(src) ──► [ read chunk ] ──► fanout.write() ──► sleep_until(deadline)
//!                        ▲                                        │
//!                        └────────────────────────────────────────┘
//!   detach() / end() are served between chunks and during the sleep
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::broadcast::BroadcastFanout;
use crate::media::ByteSource;

/// Largest chunk forwarded at once
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;

/// How far behind schedule the limiter may fall before it re-bases
const MAX_LAG: Duration = Duration::from_secs(1);

static NEXT_LIMITER_ID: AtomicU64 = AtomicU64::new(1);

/// Chunk size for a rate: one tenth of a second of data
pub fn chunk_size_for(bytes_per_sec: u64) -> usize {
    ((bytes_per_sec / 10) as usize).clamp(1, MAX_CHUNK_SIZE)
}

enum Control {
    Attach(ByteSource),
    Detach(oneshot::Sender<Option<ByteSource>>),
}

enum Step {
    Control(Option<Control>),
    Read(io::Result<usize>),
    Resume,
}

#[derive(Default)]
struct Shared {
    forwarded: AtomicU64,
    exhausted: AtomicBool,
    attached: AtomicBool,
}

/// Pacing window: `sent` bytes since `started`
struct Window {
    bytes_per_sec: u64,
    started: Instant,
    sent: u64,
}

impl Window {
    fn new(bytes_per_sec: u64) -> Self {
        Self {
            bytes_per_sec: bytes_per_sec.max(1),
            started: Instant::now(),
            sent: 0,
        }
    }

    fn reset(&mut self) {
        self.started = Instant::now();
        self.sent = 0;
    }

    fn deadline(&self) -> Instant {
        self.started + Duration::from_secs_f64(self.sent as f64 / self.bytes_per_sec as f64)
    }

    fn advance(&mut self, n: usize) {
        self.sent += n as u64;
        if Instant::now() > self.deadline() + MAX_LAG {
            // Downstream stalled; don't burst to catch up
            self.reset();
        }
    }
}

/// Paces an upstream byte source into the fan-out
pub struct RateLimiter {
    id: u64,
    bytes_per_sec: u64,
    control: mpsc::Sender<Control>,
    task: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl RateLimiter {
    /// Spawn a limiter at `bytes_per_sec` in front of `downstream`
    ///
    /// The limiter starts without upstream and forwards nothing until
    /// [`attach`](Self::attach) is called.
    pub fn spawn(bytes_per_sec: u64, downstream: Arc<BroadcastFanout>) -> Self {
        let id = NEXT_LIMITER_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(4);
        let shared = Arc::new(Shared::default());

        let task = tokio::spawn(run(
            id,
            bytes_per_sec,
            downstream,
            rx,
            Arc::clone(&shared),
        ));

        tracing::debug!(limiter = id, bytes_per_sec = bytes_per_sec, "Rate limiter spawned");

        Self {
            id,
            bytes_per_sec,
            control: tx,
            task: Some(task),
            shared,
        }
    }

    /// Limiter ID used in logs
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Target rate in bytes per second
    pub fn bytes_per_sec(&self) -> u64 {
        self.bytes_per_sec
    }

    /// Bytes forwarded downstream so far
    pub fn bytes_forwarded(&self) -> u64 {
        self.shared.forwarded.load(Ordering::Relaxed)
    }

    /// Whether the last attached upstream reached its end
    pub fn is_exhausted(&self) -> bool {
        self.shared.exhausted.load(Ordering::Relaxed)
    }

    /// Whether an upstream is currently attached
    pub fn is_attached(&self) -> bool {
        self.shared.attached.load(Ordering::Relaxed)
    }

    /// Start consuming `source`, replacing any current upstream
    ///
    /// Hands the source back if the limiter has already ended.
    pub async fn attach(&self, source: ByteSource) -> Result<(), ByteSource> {
        if let Err(mpsc::error::SendError(Control::Attach(source))) =
            self.control.send(Control::Attach(source)).await
        {
            return Err(source);
        }
        Ok(())
    }

    /// Stop consuming upstream and take back what is left of it
    ///
    /// Resolves once the limiter has let go of the source. Downstream stays
    /// linked; nothing more is forwarded until the next attach.
    pub async fn detach(&self) -> Option<ByteSource> {
        let (reply, ack) = oneshot::channel();
        self.control.send(Control::Detach(reply)).await.ok()?;
        ack.await.ok().flatten()
    }

    /// Stop pacing and release upstream and downstream
    ///
    /// Does not wait for an in-flight pacing delay. Once this returns, the
    /// limiter forwards nothing more.
    pub async fn end(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        self.shared.attached.store(false, Ordering::Relaxed);
        tracing::debug!(
            limiter = self.id,
            forwarded = self.bytes_forwarded(),
            "Rate limiter ended"
        );
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    id: u64,
    bytes_per_sec: u64,
    downstream: Arc<BroadcastFanout>,
    mut control: mpsc::Receiver<Control>,
    shared: Arc<Shared>,
) {
    let chunk_size = chunk_size_for(bytes_per_sec);
    let mut buf = BytesMut::with_capacity(chunk_size);
    let mut window = Window::new(bytes_per_sec);
    let mut source: Option<ByteSource> = None;

    loop {
        let step = match source.as_mut() {
            None => Step::Control(control.recv().await),
            Some(upstream) => {
                let deadline = window.deadline();
                if Instant::now() < deadline {
                    tokio::select! {
                        biased;
                        cmd = control.recv() => Step::Control(cmd),
                        _ = tokio::time::sleep_until(deadline) => Step::Resume,
                    }
                } else {
                    // Each chunk is split off into its own `Bytes`; the
                    // buffer is empty here
                    buf.reserve(chunk_size);
                    let mut limited = (&mut buf).limit(chunk_size);
                    tokio::select! {
                        biased;
                        cmd = control.recv() => Step::Control(cmd),
                        read = upstream.read_buf(&mut limited) => Step::Read(read),
                    }
                }
            }
        };

        match step {
            Step::Resume => {}
            Step::Control(None) => return,
            Step::Control(Some(Control::Attach(next))) => {
                if source.replace(next).is_some() {
                    tracing::debug!(limiter = id, "Replacing attached upstream");
                }
                window.reset();
                shared.exhausted.store(false, Ordering::Relaxed);
                shared.attached.store(true, Ordering::Relaxed);
            }
            Step::Control(Some(Control::Detach(reply))) => {
                shared.attached.store(false, Ordering::Relaxed);
                let detached = source.take();
                tracing::debug!(
                    limiter = id,
                    had_upstream = detached.is_some(),
                    "Upstream detached"
                );
                if let Err(Some(_unclaimed)) = reply.send(detached) {
                    tracing::debug!(limiter = id, "Detached upstream was not claimed");
                }
            }
            Step::Read(Ok(0)) => {
                tracing::info!(limiter = id, "Upstream reached end of stream");
                source = None;
                shared.attached.store(false, Ordering::Relaxed);
                shared.exhausted.store(true, Ordering::Relaxed);
            }
            Step::Read(Ok(n)) => {
                let chunk = buf.split().freeze();
                downstream.write(chunk).await;
                shared.forwarded.fetch_add(n as u64, Ordering::Relaxed);
                window.advance(n);
            }
            Step::Read(Err(e)) => {
                tracing::warn!(limiter = id, error = %e, "Upstream read failed");
                source = None;
                shared.attached.store(false, Ordering::Relaxed);
                shared.exhausted.store(true, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::Bytes;
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::registry::ClientRegistry;

    fn pipeline() -> (Arc<ClientRegistry>, Arc<BroadcastFanout>) {
        let registry = Arc::new(ClientRegistry::new());
        let fanout = Arc::new(BroadcastFanout::new(Arc::clone(&registry)));
        (registry, fanout)
    }

    fn source(len: usize) -> ByteSource {
        Box::new(Cursor::new(vec![0xAA; len]))
    }

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_size_for(16_000), 1_600);
        assert_eq!(chunk_size_for(5), 1);
        assert_eq!(chunk_size_for(10_000_000), MAX_CHUNK_SIZE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paces_to_rate() {
        let (registry, fanout) = pipeline();
        let (_id, mut listener) = registry.connect().await;

        let limiter = RateLimiter::spawn(1_000, fanout);
        assert!(limiter.attach(source(10_000)).await.is_ok());

        tokio::time::sleep(Duration::from_millis(450)).await;
        let received = listener.drain();

        // One 100-byte chunk every 100ms, the first immediately
        assert!((400..=600).contains(&received), "received {}", received);

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let more = listener.drain();
        assert!((900..=1_100).contains(&more), "received {}", more);

        limiter.end().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_bounded_by_chunk_size() {
        let (registry, fanout) = pipeline();
        let (_id, mut listener) = registry.connect().await;

        let limiter = RateLimiter::spawn(1_000, fanout);
        assert!(limiter.attach(source(350)).await.is_ok());
        tokio::time::sleep(Duration::from_millis(500)).await;

        let mut sizes = Vec::new();
        while let Some(chunk) = listener.try_recv() {
            sizes.push(chunk.len());
        }
        assert_eq!(sizes, vec![100, 100, 100, 50]);
        assert!(limiter.is_exhausted());

        limiter.end().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_keeps_remainder() {
        let (registry, fanout) = pipeline();
        let (_id, mut listener) = registry.connect().await;

        let limiter = RateLimiter::spawn(1_000, fanout);
        assert!(limiter.attach(source(1_000)).await.is_ok());
        tokio::time::sleep(Duration::from_millis(250)).await;

        let mut remainder = limiter.detach().await.expect("upstream");
        assert!(!limiter.is_attached());

        let mut rest = Vec::new();
        remainder.read_to_end(&mut rest).await.unwrap();

        let delivered = listener.drain();
        assert!(delivered > 0);
        assert_eq!(delivered + rest.len(), 1_000);

        // Nothing flows while detached
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(listener.drain(), 0);
        assert!(!limiter.is_exhausted());

        limiter.end().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_without_upstream() {
        let (_registry, fanout) = pipeline();
        let limiter = RateLimiter::spawn(1_000, fanout);

        assert!(limiter.detach().await.is_none());
        limiter.end().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_is_immediate() {
        let (registry, fanout) = pipeline();
        let (_id, mut listener) = registry.connect().await;

        // One byte every 100ms
        let limiter = RateLimiter::spawn(10, fanout);
        assert!(limiter.attach(source(100)).await.is_ok());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(listener.drain(), 1);

        let before = Instant::now();
        limiter.end().await;
        assert_eq!(before.elapsed(), Duration::ZERO);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(listener.drain(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_then_reattach() {
        let (registry, fanout) = pipeline();
        let (_id, mut listener) = registry.connect().await;

        let limiter = RateLimiter::spawn(1_000, fanout);
        let mock = tokio_test::io::Builder::new().read(b"hello").build();
        assert!(limiter.attach(Box::new(mock)).await.is_ok());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(limiter.is_exhausted());
        assert_eq!(listener.recv().await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(limiter.bytes_forwarded(), 5);

        assert!(limiter.attach(source(10)).await.is_ok());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(listener.drain(), 10);
        assert_eq!(limiter.bytes_forwarded(), 15);

        limiter.end().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_closed_after_end() {
        let (_registry, fanout) = pipeline();
        let limiter = RateLimiter::spawn(1_000, fanout);
        let control = limiter.control.clone();
        limiter.end().await;

        let (reply, _ack) = oneshot::channel();
        assert!(control.send(Control::Detach(reply)).await.is_err());
    }
}

//! Broadcast fan-out
//!
//! Duplicates every upstream chunk to all open listeners. Chunks go to each
//! listener in upstream order; a listener that fails a write is removed and
//! never blocks delivery to the others.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::registry::{ClientId, ClientRegistry};
use crate::stats::{FanoutCounters, FanoutStats};

/// Default time a listener gets to accept a chunk
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sink-of-sinks writing each chunk to every registered listener
pub struct BroadcastFanout {
    registry: Arc<ClientRegistry>,
    write_timeout: Duration,
    counters: FanoutCounters,
}

impl BroadcastFanout {
    /// Create a fan-out over `registry`
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self::with_write_timeout(registry, DEFAULT_WRITE_TIMEOUT)
    }

    /// Create a fan-out with a custom per-listener write timeout
    pub fn with_write_timeout(registry: Arc<ClientRegistry>, write_timeout: Duration) -> Self {
        Self {
            registry,
            write_timeout,
            counters: FanoutCounters::new(),
        }
    }

    /// Write one chunk to every open listener
    ///
    /// Returns the number of listeners that accepted the chunk.
    pub async fn write(&self, chunk: Bytes) -> usize {
        let sinks = self.registry.open_sinks().await;
        let mut delivered = 0;
        let mut failed: Vec<ClientId> = Vec::new();

        for (id, sink) in sinks {
            // Bytes clone is a refcount bump
            match sink.write(chunk.clone(), self.write_timeout).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(listener = %id, error = %e, "Dropping listener after failed write");
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            self.counters.record_pruned(failed.len());
            for id in failed {
                self.registry.unregister(id).await;
            }
        }

        self.counters.record_chunk(chunk.len(), delivered);
        delivered
    }

    /// Snapshot of broadcast statistics
    pub fn stats(&self) -> FanoutStats {
        self.counters.snapshot()
    }
}

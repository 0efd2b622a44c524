//! Statistics for the broadcast path

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters updated by the fan-out
#[derive(Debug)]
pub struct FanoutCounters {
    started_at: Instant,
    chunks: AtomicU64,
    bytes: AtomicU64,
    deliveries: AtomicU64,
    pruned: AtomicU64,
}

impl FanoutCounters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            chunks: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            pruned: AtomicU64::new(0),
        }
    }

    /// Record one upstream chunk and how many listeners accepted it
    pub fn record_chunk(&self, len: usize, delivered: usize) {
        self.chunks.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
        self.deliveries.fetch_add(delivered as u64, Ordering::Relaxed);
    }

    /// Record listeners removed after a failed write
    pub fn record_pruned(&self, count: usize) {
        self.pruned.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot for reporting
    pub fn snapshot(&self) -> FanoutStats {
        FanoutStats {
            chunks: self.chunks.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            pruned: self.pruned.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for FanoutCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Fan-out statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanoutStats {
    /// Upstream chunks broadcast
    pub chunks: u64,
    /// Upstream bytes broadcast
    pub bytes: u64,
    /// Chunk deliveries summed over all listeners
    pub deliveries: u64,
    /// Listeners removed after a write failure
    pub pruned: u64,
    /// Time since the fan-out was created
    pub uptime: Duration,
}

impl FanoutStats {
    /// Average upstream rate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes * 8) / secs
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_new() {
        let stats = FanoutCounters::new().snapshot();
        assert_eq!(stats.chunks, 0);
        assert_eq!(stats.bytes, 0);
        assert_eq!(stats.deliveries, 0);
        assert_eq!(stats.pruned, 0);
    }

    #[test]
    fn test_record() {
        let counters = FanoutCounters::new();
        counters.record_chunk(1600, 3);
        counters.record_chunk(400, 2);
        counters.record_pruned(1);

        let stats = counters.snapshot();
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.bytes, 2000);
        assert_eq!(stats.deliveries, 5);
        assert_eq!(stats.pruned, 1);
    }

    #[test]
    fn test_bitrate() {
        let stats = FanoutStats {
            bytes: 1_000_000,
            uptime: Duration::from_secs(10),
            ..Default::default()
        };

        // 1,000,000 bytes * 8 bits / 10 seconds
        assert_eq!(stats.bitrate(), 800_000);
    }

    #[test]
    fn test_bitrate_zero_uptime() {
        let stats = FanoutStats {
            bytes: 1_000_000,
            ..Default::default()
        };
        assert_eq!(stats.bitrate(), 0);
    }
}

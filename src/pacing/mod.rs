//! Real-time pacing of the program stream

pub mod rate_limiter;

pub use rate_limiter::{chunk_size_for, RateLimiter, MAX_CHUNK_SIZE};

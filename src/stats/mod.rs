//! Broadcast statistics

pub mod metrics;

pub use metrics::{FanoutCounters, FanoutStats};

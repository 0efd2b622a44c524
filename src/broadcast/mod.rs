//! Fan-out of the live byte stream to every listener

pub mod fanout;

pub use fanout::{BroadcastFanout, DEFAULT_WRITE_TIMEOUT};

//! Listener registry
//!
//! The registry tracks every connected listener. Each listener is a bounded
//! channel: the registry keeps the [`ClientSink`] and the transport reads from
//! the matching [`ClientStream`].
//!
//! # Architecture
//!
//! ```text
//!                     Arc<ClientRegistry>
//!                 ┌─────────────────────────┐
//!                 │ clients: HashMap<Id,    │
//!                 │   ClientSink (mpsc::Tx) │
//!                 │ >                       │
//!                 └───────────┬─────────────┘
//!                             │ open_sinks()
//!                             ▼
//!                      BroadcastFanout
//!                             │ write(Bytes)
//!         ┌───────────────────┼───────────────────┐
//!         ▼                   ▼                   ▼
//!   [ClientStream]      [ClientStream]      [ClientStream]
//!     transport           transport           transport
//! ```
//!
//! Chunks are `bytes::Bytes`, so every listener shares the same allocation.

pub mod client;
pub mod store;

pub use client::{ClientId, ClientSink, ClientStream, SinkError};
pub use store::{ClientRegistry, DEFAULT_LISTENER_BUFFER};

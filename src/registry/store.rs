//! Client registry implementation
//!
//! Tracks every connected listener sink. Membership changes (listener
//! connect/disconnect, fan-out pruning) are independent of playback state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use super::client::{ClientId, ClientSink, ClientStream};

/// Default number of chunks buffered per listener
pub const DEFAULT_LISTENER_BUFFER: usize = 64;

/// Registry of connected listeners
///
/// Thread-safe via `RwLock`. The lock is only held for map operations, never
/// across a write to a listener, so a slow listener cannot block connects.
pub struct ClientRegistry {
    /// Map of client ID to its sink
    clients: RwLock<HashMap<ClientId, ClientSink>>,

    /// Next client ID to hand out
    next_id: AtomicU64,

    /// Chunks buffered per listener created through `connect`
    listener_buffer: usize,
}

impl ClientRegistry {
    /// Create an empty registry with the default listener buffer
    pub fn new() -> Self {
        Self::with_listener_buffer(DEFAULT_LISTENER_BUFFER)
    }

    /// Create an empty registry buffering `listener_buffer` chunks per listener
    pub fn with_listener_buffer(listener_buffer: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            listener_buffer: listener_buffer.max(1),
        }
    }

    /// Register a sink and return its fresh ID
    pub async fn register(&self, sink: ClientSink) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let mut clients = self.clients.write().await;
        clients.insert(id, sink);

        tracing::info!(listener = %id, listeners = clients.len(), "Listener registered");
        id
    }

    /// Create a listener channel and register its sink
    pub async fn connect(&self) -> (ClientId, ClientStream) {
        let (sink, stream) = ClientSink::channel(self.listener_buffer);
        let id = self.register(sink).await;
        (id, stream)
    }

    /// Remove a listener. No-op if it is not registered.
    pub async fn unregister(&self, id: ClientId) {
        let mut clients = self.clients.write().await;

        if clients.remove(&id).is_some() {
            tracing::info!(listener = %id, listeners = clients.len(), "Listener unregistered");
        }
    }

    /// Visit every open sink
    ///
    /// Closed sinks are pruned in the same pass. Returning `false` from `f`
    /// removes that entry; other entries are visited exactly once regardless.
    pub async fn for_each_open<F>(&self, mut f: F)
    where
        F: FnMut(ClientId, &ClientSink) -> bool,
    {
        let mut clients = self.clients.write().await;

        clients.retain(|id, sink| {
            if sink.is_closed() {
                tracing::debug!(listener = %id, "Pruning closed listener");
                return false;
            }
            f(*id, sink)
        });
    }

    /// Prune closed sinks and snapshot the remaining ones
    ///
    /// The snapshot lets the caller await slow writes without holding the
    /// lock. Sinks are cheap to clone.
    pub async fn open_sinks(&self) -> Vec<(ClientId, ClientSink)> {
        let mut open = Vec::new();
        self.for_each_open(|id, sink| {
            open.push((id, sink.clone()));
            true
        })
        .await;
        open
    }

    /// Whether a listener is registered
    pub async fn contains(&self, id: ClientId) -> bool {
        self.clients.read().await.contains_key(&id)
    }

    /// IDs of all registered listeners
    pub async fn ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.clients.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of registered listeners
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Whether no listener is registered
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

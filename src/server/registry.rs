//! Live-connection table owned by the server.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::Notify;

/// Identity of one accepted connection, unique for the server's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug)]
struct Entry {
    peer: SocketAddr,
    close: Arc<Notify>,
}

/// Connections currently served, with a close signal per connection.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<ConnectionId, Entry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a connection and returns its id and close signal.
    pub fn register(&self, peer: SocketAddr) -> (ConnectionId, Arc<Notify>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let close = Arc::new(Notify::new());
        self.lock().insert(
            id,
            Entry {
                peer,
                close: Arc::clone(&close),
            },
        );
        (id, close)
    }

    /// Removes a connection. Returns whether it was still registered.
    pub fn remove(&self, id: ConnectionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn peer(&self, id: ConnectionId) -> Option<SocketAddr> {
        self.lock().get(&id).map(|entry| entry.peer)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Signals every live connection to close.
    ///
    /// Entries stay registered until their handler finishes its own cleanup.
    pub fn close_all(&self) -> usize {
        let entries = self.lock();
        for entry in entries.values() {
            // `notify_one` keeps a permit if the handler is busy dispatching.
            entry.close.notify_one();
        }
        entries.len()
    }
}

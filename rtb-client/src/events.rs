//! # Client Events
//!
//! Purpose: Report connection lifecycle changes and suspicious replies
//! through a sink injected at construction, instead of a global logger.
//!
//! ## Sinks
//! - `TracingSink` (default): forwards to `tracing`.
//! - `MemorySink`: keeps the most recent events for inspection, mostly in
//!   tests.
//! - `NullSink`: discards everything.

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Something a client observed that a caller may want to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A TCP connection was established.
    Connected { addr: SocketAddr },
    /// The `UNLOCK` handshake succeeded on the new connection.
    Unlocked,
    /// The connection was dropped, by failure or by `close`.
    Disconnected { reason: String },
    /// The server answered a command with `:ERR`.
    Rejected { command: String, reply: String },
    /// A token request got neither a grant nor an error; treated as denied.
    Unrecognized { command: String, reply: String },
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientEvent::Connected { addr } => write!(f, "connected to {}", addr),
            ClientEvent::Unlocked => write!(f, "unlocked"),
            ClientEvent::Disconnected { reason } => write!(f, "disconnected: {}", reason),
            ClientEvent::Rejected { command, reply } => {
                write!(f, "{} rejected: {:?}", command, reply)
            }
            ClientEvent::Unrecognized { command, reply } => {
                write!(f, "unrecognized reply to {}: {:?}", command, reply)
            }
        }
    }
}

/// Receives client events. Implementations must be cheap; they run inline
/// on the calling thread or task.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &ClientEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &ClientEvent) {
        match event {
            ClientEvent::Connected { addr } => tracing::debug!(%addr, "rtb connected"),
            ClientEvent::Unlocked => tracing::debug!("rtb unlocked"),
            ClientEvent::Disconnected { reason } => tracing::debug!(%reason, "rtb disconnected"),
            ClientEvent::Rejected { command, reply } => {
                tracing::warn!(%command, ?reply, "error response")
            }
            ClientEvent::Unrecognized { command, reply } => {
                tracing::warn!(%command, ?reply, "unrecognized response")
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &ClientEvent) {}
}

/// Events a `MemorySink` keeps before evicting the oldest.
pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

/// Stores the most recent events in memory, for tests and diagnostics.
///
/// Clones share the same storage. Once `capacity` events are held, each new
/// event evicts the oldest one and bumps `evicted()`.
#[derive(Debug, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<VecDeque<ClientEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        MemorySink {
            events: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Snapshot of the retained events, oldest first.
    pub fn events(&self) -> Vec<ClientEvent> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events dropped to stay within `capacity`.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    // A panic while holding the lock cannot leave the queue half-updated,
    // so a poisoned lock is still safe to read.
    fn lock(&self) -> MutexGuard<'_, VecDeque<ClientEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &ClientEvent) {
        let mut events = self.lock();
        if events.len() >= self.capacity {
            events.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_clones_share_storage() {
        let sink = MemorySink::new();
        let handle = sink.clone();
        handle.record(&ClientEvent::Unlocked);
        assert_eq!(sink.events(), vec![ClientEvent::Unlocked]);
        sink.clear();
        assert!(handle.is_empty());
    }

    #[test]
    fn memory_sink_evicts_oldest_beyond_capacity() {
        let sink = MemorySink::with_capacity(2);
        for reason in ["a", "b", "c"] {
            sink.record(&ClientEvent::Disconnected {
                reason: reason.to_string(),
            });
        }
        let reasons: Vec<_> = sink
            .events()
            .into_iter()
            .map(|event| event.to_string())
            .collect();
        assert_eq!(reasons, vec!["disconnected: b", "disconnected: c"]);
        assert_eq!(sink.evicted(), 1);
        assert_eq!(MemorySink::with_capacity(0).capacity(), 1);
    }

    #[test]
    fn memory_sink_survives_poisoned_lock() {
        let sink = MemorySink::new();
        sink.record(&ClientEvent::Unlocked);
        let poisoner = sink.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.events.lock().unwrap();
            panic!("poison the sink");
        })
        .join();

        sink.record(&ClientEvent::Unlocked);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn events_render_for_humans() {
        let event = ClientEvent::Unrecognized {
            command: "?b".to_string(),
            reply: "PONG".to_string(),
        };
        assert_eq!(event.to_string(), "unrecognized reply to ?b: \"PONG\"");
        let addr: SocketAddr = "127.0.0.1:1337".parse().unwrap();
        assert_eq!(
            ClientEvent::Connected { addr }.to_string(),
            "connected to 127.0.0.1:1337"
        );
    }

    #[test]
    fn tracing_and_null_sinks_accept_everything() {
        let events = [
            ClientEvent::Unlocked,
            ClientEvent::Disconnected {
                reason: "closed".to_string(),
            },
            ClientEvent::Rejected {
                command: "?b".to_string(),
                reply: ":ERR bad".to_string(),
            },
        ];
        for event in &events {
            TracingSink.record(event);
            NullSink.record(event);
        }
    }
}

//! Shared registry of connected agents.
//!
//! Each connected agent owns a bounded `mpsc` queue feeding its session's
//! write loop, so per-client FIFO order is the channel order and a producer
//! thread never blocks on a slow socket. `DashMap` keeps registration and
//! fan-out contention away from the state store's lock.
//!
//! Delivery here means "handed to the client's queue". A full queue is a
//! failed delivery: the client is not keeping up with its socket and gets
//! disconnected rather than silently skipped.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::event::ClientId;

struct ClientHandle {
    #[allow(dead_code)]
    addr: SocketAddr,
    sender: mpsc::Sender<String>,
}

/// Result of a fan-out pass.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Clients that took every line.
    pub delivered: Vec<ClientId>,
    /// Clients that failed partway, with the reason. They have already been
    /// removed from the registry.
    pub failed: Vec<(ClientId, String)>,
}

/// Registry of live agent connections.
///
/// Cloning is cheap; all clones share the same underlying map.
#[derive(Clone)]
pub struct ClientRegistry {
    clients: Arc<DashMap<ClientId, ClientHandle>>,
    next_id: Arc<AtomicU64>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Allocate a new unique client id.
    pub fn next_client_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a client and return the receiver its write loop drains.
    ///
    /// A stale entry under the same id is replaced; dropping its sender ends
    /// the old write loop.
    pub fn register(
        &self,
        id: ClientId,
        addr: SocketAddr,
        capacity: usize,
    ) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(capacity);
        self.clients.insert(id, ClientHandle { addr, sender: tx });
        rx
    }

    /// Register a client with lines pre-queued before it becomes visible.
    ///
    /// Used for reconnect replay: the seed is in the channel before the entry
    /// lands in the map, so no concurrent broadcast can overtake it. The
    /// queue is widened if the seed alone would overflow `capacity`.
    pub fn register_seeded(
        &self,
        id: ClientId,
        addr: SocketAddr,
        capacity: usize,
        seed: &[String],
    ) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(capacity.max(seed.len() + 1));
        for line in seed {
            // Cannot fail: the channel is fresh and sized for the seed.
            let _ = tx.try_send(line.clone());
        }
        self.clients.insert(id, ClientHandle { addr, sender: tx });
        rx
    }

    /// Remove a client. Returns `true` if it was present.
    pub fn unregister(&self, id: ClientId) -> bool {
        self.clients.remove(&id).is_some()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Queue lines for a single client, preserving order.
    pub fn send_to(&self, id: ClientId, lines: &[String]) -> Result<(), String> {
        let entry = match self.clients.get(&id) {
            Some(entry) => entry,
            None => return Err("client is gone".to_string()),
        };
        for line in lines {
            entry
                .sender
                .try_send(line.clone())
                .map_err(|e| match e {
                    mpsc::error::TrySendError::Full(_) => "write queue full".to_string(),
                    mpsc::error::TrySendError::Closed(_) => "connection closed".to_string(),
                })?;
        }
        Ok(())
    }

    /// Queue lines for every client. Clients that fail are unregistered and
    /// reported; the rest continue unaffected.
    pub fn broadcast(&self, lines: &[String]) -> BroadcastReport {
        let ids: Vec<ClientId> = self.clients.iter().map(|entry| *entry.key()).collect();

        let mut report = BroadcastReport::default();
        for id in ids {
            match self.send_to(id, lines) {
                Ok(()) => report.delivered.push(id),
                Err(reason) => {
                    self.unregister(id);
                    report.failed.push((id, reason));
                }
            }
        }
        report
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000)
    }

    #[tokio::test]
    async fn register_and_unregister() {
        let registry = ClientRegistry::new();
        let id = registry.next_client_id();
        let _rx = registry.register(id, addr(), 8);
        assert_eq!(registry.client_count(), 1);
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert_eq!(registry.client_count(), 0);
    }

    #[tokio::test]
    async fn broadcast_preserves_line_order() {
        let registry = ClientRegistry::new();
        let id = registry.next_client_id();
        let mut rx = registry.register(id, addr(), 8);

        let lines = vec!["first".to_string(), "second".to_string()];
        let report = registry.broadcast(&lines);
        assert_eq!(report.delivered, vec![id]);
        assert!(report.failed.is_empty());

        assert_eq!(rx.recv().await.as_deref(), Some("first"));
        assert_eq!(rx.recv().await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn full_queue_fails_and_unregisters_that_client_only() {
        let registry = ClientRegistry::new();
        let slow = registry.next_client_id();
        let fast = registry.next_client_id();
        let _slow_rx = registry.register(slow, addr(), 1);
        let mut fast_rx = registry.register(fast, addr(), 8);

        let lines = vec!["a".to_string(), "b".to_string()];
        let report = registry.broadcast(&lines);

        assert_eq!(report.delivered, vec![fast]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, slow);
        assert_eq!(registry.client_count(), 1);

        assert_eq!(fast_rx.recv().await.as_deref(), Some("a"));
        assert_eq!(fast_rx.recv().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn send_to_missing_client_reports_gone() {
        let registry = ClientRegistry::new();
        assert!(registry.send_to(99, &["x".to_string()]).is_err());
    }
}

//! Adapter event fan-out.
//!
//! Everything observable about a running adapter is published as an
//! [`AdapterEvent`]: connection lifecycle, heartbeats, each line handed to a
//! client, and the soft failures that never cross the submission API.
//!
//! Emission is fire-and-forget through bounded channels: a subscriber that
//! stops draining loses events rather than stalling the dispatch path.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

/// Identifier of a connected agent, unique for the adapter's lifetime.
pub type ClientId = u64;

/// Events emitted by a running adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// An agent completed its TCP connect and received its replay.
    AgentConnected { client_id: ClientId },
    /// An agent's session ended (EOF, timeout, write failure, shutdown).
    AgentDisconnected { client_id: ClientId },
    /// The listener failed to accept a connection; the listener continues.
    AgentConnectionError { message: String },
    /// `* PING` arrived from an agent.
    PingReceived { client_id: ClientId },
    /// `* PONG <ms>` was queued for an agent.
    PongSent { client_id: ClientId },
    /// A line was handed to a client's write queue.
    LineSent { client_id: ClientId, line: String },
    /// A write to a client failed; the client has been closed.
    SendError { client_id: ClientId, message: String },
    /// A submission was dropped before entering the state store.
    ObservationRejected { reason: String },
}

/// Subscriber list with non-blocking delivery.
///
/// Cloning is cheap; all clones share the subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<AdapterEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and return its receiver.
    ///
    /// `capacity` bounds the queue; once full, further events for this
    /// subscriber are dropped.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<AdapterEvent> {
        let (tx, rx) = mpsc::channel(capacity);
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).push(tx);
        rx
    }

    /// Deliver an event to every live subscriber without blocking.
    ///
    /// Closed subscribers are pruned on the way through.
    pub fn emit(&self, event: AdapterEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("event subscriber queue full; dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

// ════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let bus = EventBus::new();
        let mut a = bus.subscribe(8);
        let mut b = bus.subscribe(8);

        bus.emit(AdapterEvent::AgentConnected { client_id: 1 });

        assert_eq!(
            a.recv().await,
            Some(AdapterEvent::AgentConnected { client_id: 1 })
        );
        assert_eq!(
            b.recv().await,
            Some(AdapterEvent::AgentConnected { client_id: 1 })
        );
    }

    #[tokio::test]
    async fn full_subscriber_loses_events_but_stays() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(1);

        bus.emit(AdapterEvent::PingReceived { client_id: 1 });
        bus.emit(AdapterEvent::PingReceived { client_id: 2 });

        assert_eq!(
            rx.recv().await,
            Some(AdapterEvent::PingReceived { client_id: 1 })
        );
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe(1);
        drop(rx);

        bus.emit(AdapterEvent::PongSent { client_id: 1 });
        assert_eq!(bus.subscriber_count(), 0);
    }
}

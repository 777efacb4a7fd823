//! Fan-out of stored records and periodic summaries to live subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, warn};

/// Messages buffered per subscriber before it counts as lagging.
const SUBSCRIBER_BUFFER: usize = 1024;

/// Registry of live WebSocket subscribers keyed by a monotonic id.
///
/// Delivery is best-effort: [`Broadcaster::publish`] serializes the value
/// once and queues it on every channel. A subscriber whose receive side
/// is gone, or whose buffer of pending messages is full, is dropped from
/// the registry; delivery to the rest is undisturbed.
#[derive(Default)]
pub struct Broadcaster {
    subscribers: Mutex<HashMap<u64, Sender<String>>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber and returns its id and message stream.
    pub fn subscribe(&self) -> (u64, Receiver<String>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry().insert(id, tx);
        debug!(subscriber = id, "subscriber attached");
        (id, rx)
    }

    /// Removes a subscriber. Safe to call for an id already removed.
    pub fn unsubscribe(&self, id: u64) {
        if self.registry().remove(&id).is_some() {
            debug!(subscriber = id, "subscriber detached");
        }
    }

    /// Serializes `value` once and queues it to every live subscriber.
    ///
    /// Channels that refuse the send are removed without disturbing
    /// delivery to the rest. A full buffer counts as a refusal, so a
    /// subscriber that stopped draining holds at most one buffer of
    /// messages before it is cut loose.
    pub fn publish<T: Serialize>(&self, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "broadcast payload failed to serialize");
                return;
            }
        };
        self.registry().retain(|id, tx| match tx.try_send(json.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(subscriber = *id, "dropping lagging subscriber");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(subscriber = *id, "removing unreachable subscriber");
                false
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().len()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<u64, Sender<String>>> {
        // A poisoned lock only means a panic elsewhere; the map is intact.
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Ping {
        seq: u32,
    }

    #[tokio::test]
    async fn subscriber_receives_published_json() {
        let broadcaster = Broadcaster::new();
        let (_, mut rx) = broadcaster.subscribe();

        broadcaster.publish(&Ping { seq: 7 });
        let json = rx.recv().await.unwrap();
        assert_eq!(json, r#"{"seq":7}"#);
    }

    #[tokio::test]
    async fn every_subscriber_gets_its_own_copy() {
        let broadcaster = Broadcaster::new();
        let (_, mut rx_a) = broadcaster.subscribe();
        let (_, mut rx_b) = broadcaster.subscribe();

        broadcaster.publish(&Ping { seq: 1 });
        assert_eq!(rx_a.recv().await.unwrap(), rx_b.recv().await.unwrap());
    }

    #[tokio::test]
    async fn gone_subscriber_is_pruned_on_publish() {
        let broadcaster = Broadcaster::new();
        let (_, rx_dead) = broadcaster.subscribe();
        let (_, mut rx_live) = broadcaster.subscribe();
        drop(rx_dead);
        assert_eq!(broadcaster.subscriber_count(), 2);

        broadcaster.publish(&Ping { seq: 2 });
        assert_eq!(broadcaster.subscriber_count(), 1);
        assert!(rx_live.recv().await.is_some());
    }

    #[tokio::test]
    async fn lagging_subscriber_is_dropped_when_its_buffer_fills() {
        let broadcaster = Broadcaster::new();
        let (_, mut rx) = broadcaster.subscribe();

        for seq in 0..SUBSCRIBER_BUFFER as u32 {
            broadcaster.publish(&Ping { seq });
        }
        assert_eq!(broadcaster.subscriber_count(), 1);

        // One more with the buffer full evicts the subscriber.
        broadcaster.publish(&Ping {
            seq: SUBSCRIBER_BUFFER as u32,
        });
        assert_eq!(broadcaster.subscriber_count(), 0);

        // The buffered messages stay readable; the stream then ends.
        for _ in 0..SUBSCRIBER_BUFFER {
            assert!(rx.recv().await.is_some());
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let broadcaster = Broadcaster::new();
        let (id, mut rx) = broadcaster.subscribe();
        broadcaster.unsubscribe(id);

        broadcaster.publish(&Ping { seq: 3 });
        assert!(rx.try_recv().is_err());
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn ids_are_never_reused() {
        let broadcaster = Broadcaster::new();
        let (first, _rx_a) = broadcaster.subscribe();
        broadcaster.unsubscribe(first);
        let (second, _rx_b) = broadcaster.subscribe();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish(&Ping { seq: 4 });
        assert_eq!(broadcaster.subscriber_count(), 0);
    }
}

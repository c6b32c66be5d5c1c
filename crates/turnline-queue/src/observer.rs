//! Queue observers
//!
//! The runtime reports every transition through [`QueueObserver`]. All hooks
//! default to no-ops, so an observer implements only what it cares about.
//! Hooks run after the runtime's state is fully updated; a panicking hook is
//! caught and logged, never propagated to the producer or consumer.

use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use turnline_core::{BlockedReason, ClearReason, DequeuedBatch, DropReason, QueueItem};

pub trait QueueObserver: Send {
    fn on_enqueued(&mut self, _item: &QueueItem, _queue_len: usize) {}

    fn on_dequeued(&mut self, _batch: &DequeuedBatch) {}

    /// Edge-triggered: fires once per reason change within a blocked-epoch.
    fn on_blocked(&mut self, _reason: BlockedReason, _queue_len: usize) {}

    /// Fires on every clear, including clears of an empty queue.
    fn on_cleared(&mut self, _reason: ClearReason, _removed_count: usize) {}

    /// `item` is either an evicted item or the rejected item that never entered the store.
    fn on_dropped(&mut self, _item: &QueueItem, _reason: DropReason, _queue_len: usize) {}
}

/// Run one observer hook, swallowing any panic it raises.
pub(crate) fn guarded(hook: &'static str, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        warn!("Queue observer {} panicked: {}", hook, message);
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl QueueObserver for NoopObserver {}

// ---------------------------------------------------------------------------
// Queue events - published to subscribers via broadcast
// ---------------------------------------------------------------------------

/// A queue transition as a value, for publish/subscribe consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    Enqueued {
        item: QueueItem,
        queue_len: usize,
    },
    Dequeued {
        batch: DequeuedBatch,
    },
    Blocked {
        reason: BlockedReason,
        queue_len: usize,
    },
    Cleared {
        reason: ClearReason,
        removed_count: usize,
    },
    Dropped {
        item: QueueItem,
        reason: DropReason,
        queue_len: usize,
    },
}

/// Publishes every transition as a [`QueueEvent`] on a broadcast channel.
///
/// Sends with no live subscriber are dropped silently.
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    tx: broadcast::Sender<QueueEvent>,
}

impl BroadcastObserver {
    /// Returns the observer plus its sender, for `subscribe()` calls.
    pub fn new(capacity: usize) -> (Self, broadcast::Sender<QueueEvent>) {
        let (tx, _) = broadcast::channel(capacity);
        (Self { tx: tx.clone() }, tx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: QueueEvent) {
        let _ = self.tx.send(event);
    }
}

impl QueueObserver for BroadcastObserver {
    fn on_enqueued(&mut self, item: &QueueItem, queue_len: usize) {
        self.publish(QueueEvent::Enqueued {
            item: item.clone(),
            queue_len,
        });
    }

    fn on_dequeued(&mut self, batch: &DequeuedBatch) {
        self.publish(QueueEvent::Dequeued {
            batch: batch.clone(),
        });
    }

    fn on_blocked(&mut self, reason: BlockedReason, queue_len: usize) {
        self.publish(QueueEvent::Blocked { reason, queue_len });
    }

    fn on_cleared(&mut self, reason: ClearReason, removed_count: usize) {
        self.publish(QueueEvent::Cleared {
            reason,
            removed_count,
        });
    }

    fn on_dropped(&mut self, item: &QueueItem, reason: DropReason, queue_len: usize) {
        self.publish(QueueEvent::Dropped {
            item: item.clone(),
            reason,
            queue_len,
        });
    }
}

/// Logs transitions through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl QueueObserver for TracingObserver {
    fn on_enqueued(&mut self, item: &QueueItem, queue_len: usize) {
        debug!("Queued {} ({:?}), queue_len={}", item.id(), item.kind(), queue_len);
    }

    fn on_dequeued(&mut self, batch: &DequeuedBatch) {
        debug!(
            "Dequeued {} with {} item(s), {} left",
            batch.batch_id, batch.merged_count, batch.queue_len_after
        );
    }

    fn on_blocked(&mut self, reason: BlockedReason, queue_len: usize) {
        info!("Queue blocked: {} ({} waiting)", reason, queue_len);
    }

    fn on_cleared(&mut self, reason: ClearReason, removed_count: usize) {
        info!("Queue cleared: {} ({} removed)", reason, removed_count);
    }

    fn on_dropped(&mut self, item: &QueueItem, reason: DropReason, queue_len: usize) {
        warn!(
            "Dropped {} ({:?}): {}, queue_len={}",
            item.id(),
            item.kind(),
            reason,
            queue_len
        );
    }
}

/// Forwards each transition to several observers, isolating them from each other.
#[derive(Default)]
pub struct FanoutObserver {
    observers: Vec<Box<dyn QueueObserver>>,
}

impl FanoutObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: impl QueueObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl QueueObserver for FanoutObserver {
    fn on_enqueued(&mut self, item: &QueueItem, queue_len: usize) {
        for observer in &mut self.observers {
            guarded("on_enqueued", || observer.on_enqueued(item, queue_len));
        }
    }

    fn on_dequeued(&mut self, batch: &DequeuedBatch) {
        for observer in &mut self.observers {
            guarded("on_dequeued", || observer.on_dequeued(batch));
        }
    }

    fn on_blocked(&mut self, reason: BlockedReason, queue_len: usize) {
        for observer in &mut self.observers {
            guarded("on_blocked", || observer.on_blocked(reason, queue_len));
        }
    }

    fn on_cleared(&mut self, reason: ClearReason, removed_count: usize) {
        for observer in &mut self.observers {
            guarded("on_cleared", || observer.on_cleared(reason, removed_count));
        }
    }

    fn on_dropped(&mut self, item: &QueueItem, reason: DropReason, queue_len: usize) {
        for observer in &mut self.observers {
            guarded("on_dropped", || observer.on_dropped(item, reason, queue_len));
        }
    }
}

//! Bounded turn queue
//!
//! One runtime per session. Producers call [`QueueRuntime::enqueue`] as input
//! arrives; the single turn driver calls [`QueueRuntime::try_dequeue`] with a
//! blocked reason while a turn cannot start, and with `None` when it can.
//!
//! Methods are synchronous and take `&mut self`. Hosts that share a runtime
//! across threads wrap the whole thing in one mutex.

use crate::config::QueueConfig;
use crate::observer::{guarded, NoopObserver, QueueObserver};
use chrono::Utc;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, warn};
use turnline_core::{
    BatchId, BlockedReason, ClearReason, DequeuedBatch, DropReason, ItemId, NewQueueItem,
    QueueItem, Result,
};

/// Cumulative counters since construction. Not reset by `clear`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub evicted: u64,
    pub rejected: u64,
    pub dequeued_batches: u64,
    pub dequeued_items: u64,
    pub cleared_items: u64,
    pub blocked_notifications: u64,
}

pub struct QueueRuntime {
    config: QueueConfig,
    store: VecDeque<QueueItem>,
    observer: Box<dyn QueueObserver>,
    next_item_id: u64,
    next_batch_id: u64,
    /// Last reason reported through `on_blocked` in the current blocked-epoch
    last_blocked_reason: Option<BlockedReason>,
    stats: QueueStats,
}

impl fmt::Debug for QueueRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueRuntime")
            .field("config", &self.config)
            .field("len", &self.store.len())
            .field("last_blocked_reason", &self.last_blocked_reason)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for QueueRuntime {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl QueueRuntime {
    /// Create a runtime. Out-of-range limits are clamped rather than rejected.
    pub fn new(config: QueueConfig, observer: impl QueueObserver + 'static) -> Self {
        let clamped = config.clamped();
        if clamped != config && config.validate().is_err() {
            warn!(
                "Queue limits clamped: max_items={}, hard_max_items={}",
                clamped.max_items,
                clamped.hard_limit()
            );
        }
        Self {
            config: clamped,
            store: VecDeque::new(),
            observer: Box::new(observer),
            next_item_id: 1,
            next_batch_id: 1,
            last_blocked_reason: None,
            stats: QueueStats::default(),
        }
    }

    /// Create a runtime, rejecting invalid limits.
    pub fn try_new(config: QueueConfig, observer: impl QueueObserver + 'static) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config, observer))
    }

    /// Default limits, no observer.
    pub fn with_defaults() -> Self {
        Self::new(QueueConfig::default(), NoopObserver)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn max_items(&self) -> usize {
        self.config.max_items
    }

    pub fn hard_max_items(&self) -> usize {
        self.config.hard_limit()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Snapshot copy of the queued items, head first.
    pub fn items(&self) -> Vec<QueueItem> {
        self.store.iter().cloned().collect()
    }

    pub fn peek(&self) -> Vec<QueueItem> {
        self.items()
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// Add an item. Returns the stored item, or `None` when the hard ceiling rejected it.
    ///
    /// At the soft limit a coalescable item evicts the oldest queued
    /// coalescable item, keeping the length unchanged. Barriers skip eviction
    /// and may grow the queue up to the hard ceiling.
    pub fn enqueue(&mut self, item: NewQueueItem) -> Option<QueueItem> {
        let len = self.store.len();

        if len >= self.hard_max_items() {
            let rejected = self.stamp(item);
            self.stats.rejected += 1;
            warn!(
                "Queue full ({} items), rejecting {} ({:?})",
                len,
                rejected.id(),
                rejected.kind()
            );
            self.notify("on_dropped", |o| {
                o.on_dropped(&rejected, DropReason::BufferLimit, len)
            });
            return None;
        }

        let item = self.stamp(item);

        if len >= self.config.max_items && item.is_coalescable() {
            let oldest = self.store.iter().position(QueueItem::is_coalescable);
            let evicted = oldest.and_then(|pos| self.store.remove(pos));

            match evicted {
                Some(evicted) => {
                    self.store.push_back(item.clone());
                    let new_len = self.store.len();
                    self.stats.evicted += 1;
                    self.stats.enqueued += 1;
                    debug!(
                        "Soft limit reached, evicted {} for {} (queue_len={})",
                        evicted.id(),
                        item.id(),
                        new_len
                    );
                    self.notify("on_dropped", |o| {
                        o.on_dropped(&evicted, DropReason::BufferLimit, new_len)
                    });
                    self.notify("on_enqueued", |o| o.on_enqueued(&item, new_len));
                    return Some(item);
                }
                // Only barriers are queued; the hard ceiling still bounds the append below.
                None => debug!("Soft limit reached with nothing to evict, appending {}", item.id()),
            }
        }

        self.store.push_back(item.clone());
        let new_len = self.store.len();
        self.stats.enqueued += 1;
        if new_len == 1 {
            self.reset_blocked_state();
        }
        debug!("Enqueued {} ({:?}), queue_len={}", item.id(), item.kind(), new_len);
        self.notify("on_enqueued", |o| o.on_enqueued(&item, new_len));
        Some(item)
    }

    /// Take the next batch, or report why not.
    ///
    /// With `Some(reason)` the store is never touched and `None` is returned;
    /// `on_blocked` fires only when the reason changes within a blocked-epoch.
    /// With `None` the head run of coalescable items is drained, or the single
    /// barrier at the head.
    pub fn try_dequeue(&mut self, blocked_reason: Option<BlockedReason>) -> Option<DequeuedBatch> {
        if let Some(reason) = blocked_reason {
            if self.store.is_empty() {
                return None;
            }
            if self.last_blocked_reason != Some(reason) {
                self.last_blocked_reason = Some(reason);
                self.stats.blocked_notifications += 1;
                let len = self.store.len();
                debug!("Queue blocked: {} ({} waiting)", reason, len);
                self.notify("on_blocked", |o| o.on_blocked(reason, len));
            }
            return None;
        }

        self.reset_blocked_state();
        if self.store.is_empty() {
            return None;
        }

        let run = self
            .store
            .iter()
            .take_while(|item| item.is_coalescable())
            .count();
        Some(self.drain_front(run.max(1)))
    }

    /// Drain up to `n` head items regardless of kind.
    pub fn consume_items(&mut self, n: usize) -> Option<DequeuedBatch> {
        if n == 0 || self.store.is_empty() {
            return None;
        }
        let count = n.min(self.store.len());
        Some(self.drain_front(count))
    }

    /// Start a fresh blocked-epoch: the next blocked check reports its reason again.
    pub fn reset_blocked_state(&mut self) {
        self.last_blocked_reason = None;
    }

    /// Drop every queued item. `on_cleared` fires even if nothing was queued.
    pub fn clear(&mut self, reason: ClearReason) {
        let removed = self.store.len();
        self.store.clear();
        self.reset_blocked_state();
        self.stats.cleared_items += removed as u64;
        debug!("Queue cleared: {} ({} removed)", reason, removed);
        self.notify("on_cleared", |o| o.on_cleared(reason, removed));
    }

    fn drain_front(&mut self, count: usize) -> DequeuedBatch {
        let items: Vec<QueueItem> = self.store.drain(..count).collect();
        let batch_id = BatchId::new(self.next_batch_id);
        self.next_batch_id += 1;

        let batch = DequeuedBatch {
            batch_id,
            merged_count: items.len(),
            queue_len_after: self.store.len(),
            items,
        };
        self.stats.dequeued_batches += 1;
        self.stats.dequeued_items += batch.merged_count as u64;

        if self.store.is_empty() {
            self.reset_blocked_state();
        }
        debug!(
            "Dequeued {} ({} items, {} left)",
            batch.batch_id, batch.merged_count, batch.queue_len_after
        );
        self.notify("on_dequeued", |o| o.on_dequeued(&batch));
        batch
    }

    fn stamp(&mut self, item: NewQueueItem) -> QueueItem {
        let id = ItemId::new(self.next_item_id);
        self.next_item_id += 1;
        QueueItem::from_new(item, id, Utc::now())
    }

    fn notify(&mut self, hook: &'static str, f: impl FnOnce(&mut dyn QueueObserver)) {
        let observer = self.observer.as_mut();
        guarded(hook, || f(observer));
    }
}

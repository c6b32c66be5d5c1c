//! Tests for turnline-queue: QueueRuntime limits, batching, blocked-epochs, observers

use tokio::sync::broadcast;
use turnline_core::*;
use turnline_queue::*;

fn recording(config: QueueConfig) -> (QueueRuntime, broadcast::Receiver<QueueEvent>) {
    let (observer, _tx) = BroadcastObserver::new(1024);
    let rx = observer.subscribe();
    (QueueRuntime::new(config, observer), rx)
}

fn drain(rx: &mut broadcast::Receiver<QueueEvent>) -> Vec<QueueEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn blocked_count(events: &[QueueEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, QueueEvent::Blocked { .. }))
        .count()
}

fn texts(items: &[QueueItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| match &item.payload {
            ItemPayload::Message { content } => content.text(),
            ItemPayload::TaskNotification { text }
            | ItemPayload::ApprovalResult { text }
            | ItemPayload::OverlayAction { text } => text.clone(),
        })
        .collect()
}

struct PanickingObserver;

impl QueueObserver for PanickingObserver {
    fn on_enqueued(&mut self, _item: &QueueItem, _queue_len: usize) {
        panic!("enqueued hook exploded");
    }
    fn on_dequeued(&mut self, _batch: &DequeuedBatch) {
        panic!("dequeued hook exploded");
    }
    fn on_blocked(&mut self, _reason: BlockedReason, _queue_len: usize) {
        panic!("blocked hook exploded");
    }
    fn on_cleared(&mut self, _reason: ClearReason, _removed_count: usize) {
        panic!("cleared hook exploded");
    }
    fn on_dropped(&mut self, _item: &QueueItem, _reason: DropReason, _queue_len: usize) {
        std::panic::panic_any(String::from("dropped hook exploded"));
    }
}

// ===========================================================================
// Construction
// ===========================================================================

#[test]
fn default_limits() {
    let rt = QueueRuntime::with_defaults();
    assert_eq!(rt.max_items(), 100);
    assert_eq!(rt.hard_max_items(), 300);
    assert!(rt.is_empty());
}

#[test]
fn explicit_hard_limit() {
    let rt = QueueRuntime::new(QueueConfig::new(10).with_hard_max_items(12), NoopObserver);
    assert_eq!(rt.max_items(), 10);
    assert_eq!(rt.hard_max_items(), 12);
}

#[test]
fn try_new_rejects_invalid_limits() {
    assert!(QueueRuntime::try_new(QueueConfig::new(0), NoopObserver).is_err());
    let err = QueueRuntime::try_new(QueueConfig::new(10).with_hard_max_items(5), NoopObserver)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn new_clamps_invalid_limits() {
    let rt = QueueRuntime::new(QueueConfig::new(10).with_hard_max_items(5), NoopObserver);
    assert_eq!(rt.max_items(), 10);
    assert_eq!(rt.hard_max_items(), 10);

    let rt = QueueRuntime::new(QueueConfig::new(0), NoopObserver);
    assert_eq!(rt.max_items(), 1);
    assert_eq!(rt.hard_max_items(), 3);
}

// ===========================================================================
// Enqueue
// ===========================================================================

#[test]
fn enqueue_grows_by_one_with_increasing_ids() {
    let (mut rt, mut rx) = recording(QueueConfig::new(10));
    let mut last: Option<ItemId> = None;
    for i in 0..8 {
        let item = rt.enqueue(NewQueueItem::message(format!("m{}", i))).unwrap();
        assert_eq!(rt.len(), i + 1);
        if let Some(prev) = last {
            assert!(item.id() > prev);
        }
        last = Some(item.id());
    }
    let events = drain(&mut rx);
    assert_eq!(events.len(), 8);
    match &events[7] {
        QueueEvent::Enqueued { item, queue_len } => {
            assert_eq!(*queue_len, 8);
            assert_eq!(Some(item.id()), last);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn enqueue_keeps_client_message_id() {
    let mut rt = QueueRuntime::with_defaults();
    let item = rt
        .enqueue(NewQueueItem::message("hi").with_client_message_id("cm-1"))
        .unwrap();
    assert_eq!(item.client_message_id(), Some("cm-1"));
    assert_eq!(rt.items()[0], item);
}

#[test]
fn hard_limit_rejects_every_kind_without_mutation() {
    let (mut rt, mut rx) = recording(QueueConfig::new(2).with_hard_max_items(3));
    rt.enqueue(NewQueueItem::approval_result("a")).unwrap();
    rt.enqueue(NewQueueItem::overlay_action("b")).unwrap();
    rt.enqueue(NewQueueItem::approval_result("c")).unwrap();
    assert_eq!(rt.len(), 3);
    let before = rt.items();
    drain(&mut rx);

    let candidates = [
        NewQueueItem::message("m"),
        NewQueueItem::task_notification("n"),
        NewQueueItem::approval_result("a2"),
        NewQueueItem::overlay_action("o2"),
    ];
    for candidate in candidates {
        let kind = candidate.kind();
        assert!(rt.enqueue(candidate).is_none());
        assert_eq!(rt.items(), before);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            QueueEvent::Dropped {
                item,
                reason,
                queue_len,
            } => {
                assert_eq!(item.kind(), kind);
                assert_eq!(*reason, DropReason::BufferLimit);
                assert_eq!(*queue_len, 3);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(rt.stats().rejected, 4);
}

#[test]
fn soft_limit_evicts_oldest_coalescable() {
    let (mut rt, mut rx) = recording(QueueConfig::new(3).with_hard_max_items(5));
    rt.enqueue(NewQueueItem::approval_result("barrier")).unwrap();
    let oldest = rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.enqueue(NewQueueItem::task_notification("n2")).unwrap();
    drain(&mut rx);

    let newest = rt.enqueue(NewQueueItem::message("m3")).unwrap();
    assert_eq!(rt.len(), 3);
    assert_eq!(texts(&rt.items()), vec!["barrier", "n2", "m3"]);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    match &events[0] {
        QueueEvent::Dropped {
            item,
            reason,
            queue_len,
        } => {
            assert_eq!(item.id(), oldest.id());
            assert_eq!(*reason, DropReason::BufferLimit);
            assert_eq!(*queue_len, 3);
        }
        other => panic!("expected drop first, got {:?}", other),
    }
    match &events[1] {
        QueueEvent::Enqueued { item, queue_len } => {
            assert_eq!(item.id(), newest.id());
            assert_eq!(*queue_len, 3);
        }
        other => panic!("expected enqueue second, got {:?}", other),
    }
    assert_eq!(rt.stats().evicted, 1);
}

#[test]
fn soft_limit_eviction_keeps_length_steady() {
    let mut rt = QueueRuntime::new(QueueConfig::new(4), NoopObserver);
    for i in 0..20 {
        rt.enqueue(NewQueueItem::message(format!("m{}", i))).unwrap();
        assert!(rt.len() <= 4);
    }
    assert_eq!(texts(&rt.items()), vec!["m16", "m17", "m18", "m19"]);
}

#[test]
fn barriers_grow_past_soft_limit_without_eviction() {
    let (mut rt, mut rx) = recording(QueueConfig::new(2).with_hard_max_items(4));
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.enqueue(NewQueueItem::message("m2")).unwrap();
    drain(&mut rx);

    rt.enqueue(NewQueueItem::approval_result("a")).unwrap();
    rt.enqueue(NewQueueItem::overlay_action("o")).unwrap();
    assert_eq!(rt.len(), 4);
    assert_eq!(texts(&rt.items()), vec!["m1", "m2", "a", "o"]);

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .all(|e| matches!(e, QueueEvent::Enqueued { .. })));

    assert!(rt.enqueue(NewQueueItem::overlay_action("o2")).is_none());
    assert_eq!(rt.len(), 4);
}

#[test]
fn coalescable_at_soft_limit_still_evicts_when_barriers_overflow() {
    let mut rt = QueueRuntime::new(QueueConfig::new(2).with_hard_max_items(4), NoopObserver);
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.enqueue(NewQueueItem::approval_result("a")).unwrap();
    rt.enqueue(NewQueueItem::approval_result("b")).unwrap();

    rt.enqueue(NewQueueItem::message("m2")).unwrap();
    assert_eq!(texts(&rt.items()), vec!["a", "b", "m2"]);
}

#[test]
fn soft_limit_with_only_barriers_appends() {
    let mut rt = QueueRuntime::new(QueueConfig::new(2).with_hard_max_items(4), NoopObserver);
    rt.enqueue(NewQueueItem::overlay_action("o1")).unwrap();
    rt.enqueue(NewQueueItem::overlay_action("o2")).unwrap();

    rt.enqueue(NewQueueItem::message("m")).unwrap();
    assert_eq!(rt.len(), 3);
    assert_eq!(texts(&rt.items()), vec!["o1", "o2", "m"]);
}

// ===========================================================================
// Dequeue batching
// ===========================================================================

#[test]
fn dequeue_on_empty_queue_is_none() {
    let (mut rt, mut rx) = recording(QueueConfig::default());
    assert!(rt.try_dequeue(None).is_none());
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn dequeue_splits_at_barriers() {
    let mut rt = QueueRuntime::with_defaults();
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.enqueue(NewQueueItem::message("m2")).unwrap();
    rt.enqueue(NewQueueItem::approval_result("a")).unwrap();
    rt.enqueue(NewQueueItem::message("m3")).unwrap();

    let first = rt.try_dequeue(None).unwrap();
    assert_eq!(texts(&first.items), vec!["m1", "m2"]);
    assert_eq!(first.merged_count, 2);
    assert_eq!(first.queue_len_after, 2);

    let second = rt.try_dequeue(None).unwrap();
    assert_eq!(texts(&second.items), vec!["a"]);
    assert!(second.is_barrier());
    assert_eq!(second.queue_len_after, 1);

    let third = rt.try_dequeue(None).unwrap();
    assert_eq!(texts(&third.items), vec!["m3"]);
    assert_eq!(third.queue_len_after, 0);

    assert!(rt.try_dequeue(None).is_none());
    assert!(first.batch_id < second.batch_id && second.batch_id < third.batch_id);
}

#[test]
fn consecutive_barriers_dequeue_one_at_a_time() {
    let mut rt = QueueRuntime::with_defaults();
    rt.enqueue(NewQueueItem::overlay_action("o1")).unwrap();
    rt.enqueue(NewQueueItem::approval_result("a1")).unwrap();

    assert_eq!(texts(&rt.try_dequeue(None).unwrap().items), vec!["o1"]);
    assert_eq!(texts(&rt.try_dequeue(None).unwrap().items), vec!["a1"]);
}

#[test]
fn notifications_and_messages_coalesce_together() {
    let mut rt = QueueRuntime::with_defaults();
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.enqueue(NewQueueItem::task_notification("n1")).unwrap();
    rt.enqueue(NewQueueItem::message("m2")).unwrap();

    let batch = rt.try_dequeue(None).unwrap();
    assert_eq!(batch.merged_count, 3);
    assert!(rt.is_empty());
}

#[test]
fn dequeue_fires_on_dequeued_with_batch() {
    let (mut rt, mut rx) = recording(QueueConfig::default());
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    drain(&mut rx);

    let batch = rt.try_dequeue(None).unwrap();
    let events = drain(&mut rx);
    assert_eq!(events, vec![QueueEvent::Dequeued { batch }]);
}

// ===========================================================================
// Blocked-epochs
// ===========================================================================

#[test]
fn blocked_dequeue_never_mutates() {
    let mut rt = QueueRuntime::with_defaults();
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.enqueue(NewQueueItem::approval_result("a")).unwrap();
    let before = rt.items();

    for reason in [
        BlockedReason::Streaming,
        BlockedReason::PendingApprovals,
        BlockedReason::Streaming,
    ] {
        assert!(rt.try_dequeue(Some(reason)).is_none());
        assert_eq!(rt.items(), before);
    }
}

#[test]
fn blocked_notification_is_edge_triggered() {
    let (mut rt, mut rx) = recording(QueueConfig::default());
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    drain(&mut rx);

    for _ in 0..5 {
        rt.try_dequeue(Some(BlockedReason::Streaming));
    }
    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![QueueEvent::Blocked {
            reason: BlockedReason::Streaming,
            queue_len: 1
        }]
    );

    rt.enqueue(NewQueueItem::message("m2")).unwrap();
    rt.try_dequeue(Some(BlockedReason::Streaming));
    assert_eq!(blocked_count(&drain(&mut rx)), 0);
}

#[test]
fn blocked_notification_fires_on_reason_change() {
    let (mut rt, mut rx) = recording(QueueConfig::default());
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    drain(&mut rx);

    rt.try_dequeue(Some(BlockedReason::Streaming));
    rt.try_dequeue(Some(BlockedReason::PendingApprovals));
    rt.try_dequeue(Some(BlockedReason::PendingApprovals));
    rt.try_dequeue(Some(BlockedReason::Streaming));

    let reasons: Vec<BlockedReason> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            QueueEvent::Blocked { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(
        reasons,
        vec![
            BlockedReason::Streaming,
            BlockedReason::PendingApprovals,
            BlockedReason::Streaming
        ]
    );
}

#[test]
fn blocked_on_empty_queue_is_silent() {
    let (mut rt, mut rx) = recording(QueueConfig::default());
    assert!(rt.try_dequeue(Some(BlockedReason::Streaming)).is_none());
    assert!(drain(&mut rx).is_empty());
    assert_eq!(rt.stats().blocked_notifications, 0);
}

#[test]
fn unblocked_check_starts_new_epoch() {
    let (mut rt, mut rx) = recording(QueueConfig::default());
    rt.enqueue(NewQueueItem::approval_result("a")).unwrap();
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.try_dequeue(Some(BlockedReason::Streaming));

    rt.try_dequeue(None).unwrap();
    assert_eq!(rt.len(), 1);
    drain(&mut rx);

    rt.try_dequeue(Some(BlockedReason::Streaming));
    assert_eq!(blocked_count(&drain(&mut rx)), 1);
}

#[test]
fn refill_after_drain_starts_new_epoch() {
    let (mut rt, mut rx) = recording(QueueConfig::default());
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.enqueue(NewQueueItem::message("m2")).unwrap();
    rt.try_dequeue(Some(BlockedReason::Streaming));

    rt.consume_items(2).unwrap();
    rt.enqueue(NewQueueItem::message("m3")).unwrap();
    drain(&mut rx);

    rt.try_dequeue(Some(BlockedReason::Streaming));
    assert_eq!(blocked_count(&drain(&mut rx)), 1);
}

#[test]
fn refill_after_clear_starts_new_epoch() {
    let (mut rt, mut rx) = recording(QueueConfig::default());
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.try_dequeue(Some(BlockedReason::CommandRunning));
    rt.clear(ClearReason::Cancelled);
    rt.enqueue(NewQueueItem::message("m2")).unwrap();
    drain(&mut rx);

    rt.try_dequeue(Some(BlockedReason::CommandRunning));
    assert_eq!(blocked_count(&drain(&mut rx)), 1);
}

#[test]
fn explicit_reset_rearms_blocked_notification() {
    let (mut rt, mut rx) = recording(QueueConfig::default());
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.try_dequeue(Some(BlockedReason::Streaming));
    rt.try_dequeue(Some(BlockedReason::Streaming));
    assert_eq!(blocked_count(&drain(&mut rx)), 1);

    rt.reset_blocked_state();
    rt.try_dequeue(Some(BlockedReason::Streaming));
    assert_eq!(blocked_count(&drain(&mut rx)), 1);
    assert_eq!(rt.len(), 1);
}

// ===========================================================================
// consume_items
// ===========================================================================

#[test]
fn consume_items_ignores_barrier_split() {
    let mut rt = QueueRuntime::with_defaults();
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.enqueue(NewQueueItem::approval_result("a")).unwrap();
    rt.enqueue(NewQueueItem::message("m2")).unwrap();
    rt.enqueue(NewQueueItem::overlay_action("o")).unwrap();

    let batch = rt.consume_items(3).unwrap();
    assert_eq!(texts(&batch.items), vec!["m1", "a", "m2"]);
    assert_eq!(batch.merged_count, 3);
    assert_eq!(batch.queue_len_after, 1);
}

#[test]
fn consume_items_caps_at_length() {
    let mut rt = QueueRuntime::with_defaults();
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.enqueue(NewQueueItem::message("m2")).unwrap();

    let batch = rt.consume_items(10).unwrap();
    assert_eq!(batch.merged_count, 2);
    assert!(rt.is_empty());
}

#[test]
fn consume_zero_or_from_empty_is_none() {
    let (mut rt, mut rx) = recording(QueueConfig::default());
    assert!(rt.consume_items(3).is_none());
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    drain(&mut rx);
    assert!(rt.consume_items(0).is_none());
    assert!(drain(&mut rx).is_empty());
    assert_eq!(rt.len(), 1);
}

// ===========================================================================
// clear and accessors
// ===========================================================================

#[test]
fn clear_reports_removed_count() {
    let (mut rt, mut rx) = recording(QueueConfig::default());
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.enqueue(NewQueueItem::overlay_action("o")).unwrap();
    drain(&mut rx);

    rt.clear(ClearReason::Error);
    assert!(rt.is_empty());
    assert_eq!(
        drain(&mut rx),
        vec![QueueEvent::Cleared {
            reason: ClearReason::Error,
            removed_count: 2
        }]
    );
}

#[test]
fn clear_on_empty_queue_still_notifies() {
    let (mut rt, mut rx) = recording(QueueConfig::default());
    rt.clear(ClearReason::Shutdown);
    assert_eq!(
        drain(&mut rx),
        vec![QueueEvent::Cleared {
            reason: ClearReason::Shutdown,
            removed_count: 0
        }]
    );
}

#[test]
fn ids_keep_increasing_across_clear() {
    let mut rt = QueueRuntime::with_defaults();
    let first = rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.clear(ClearReason::Processed);
    let second = rt.enqueue(NewQueueItem::message("m2")).unwrap();
    assert!(second.id() > first.id());
}

#[test]
fn items_is_a_snapshot() {
    let mut rt = QueueRuntime::with_defaults();
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    let snapshot = rt.items();
    rt.enqueue(NewQueueItem::message("m2")).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(rt.peek().len(), 2);
    assert_eq!(rt.peek(), rt.items());
}

#[test]
fn stats_accumulate() {
    let mut rt = QueueRuntime::new(QueueConfig::new(2).with_hard_max_items(3), NoopObserver);
    rt.enqueue(NewQueueItem::message("m1"));
    rt.enqueue(NewQueueItem::message("m2"));
    rt.enqueue(NewQueueItem::message("m3"));
    rt.enqueue(NewQueueItem::approval_result("a"));
    rt.enqueue(NewQueueItem::approval_result("b"));
    rt.try_dequeue(Some(BlockedReason::Streaming));
    rt.try_dequeue(None);
    rt.clear(ClearReason::Processed);

    let stats = rt.stats();
    assert_eq!(stats.enqueued, 4);
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.blocked_notifications, 1);
    assert_eq!(stats.dequeued_batches, 1);
    assert_eq!(stats.dequeued_items, 2);
    assert_eq!(stats.cleared_items, 1);
}

// ===========================================================================
// Observer isolation
// ===========================================================================

#[test]
fn panicking_observer_does_not_break_runtime() {
    let mut rt = QueueRuntime::new(QueueConfig::new(1).with_hard_max_items(2), PanickingObserver);

    assert!(rt.enqueue(NewQueueItem::message("m1")).is_some());
    assert!(rt.enqueue(NewQueueItem::message("m2")).is_some());
    assert_eq!(texts(&rt.items()), vec!["m2"]);
    assert!(rt.enqueue(NewQueueItem::approval_result("a")).is_some());
    assert!(rt.enqueue(NewQueueItem::approval_result("b")).is_none());
    assert_eq!(rt.len(), 2);

    assert!(rt.try_dequeue(Some(BlockedReason::Streaming)).is_none());
    let batch = rt.try_dequeue(None).unwrap();
    assert_eq!(texts(&batch.items), vec!["m2"]);

    rt.clear(ClearReason::Processed);
    assert!(rt.is_empty());

    assert!(rt.enqueue(NewQueueItem::message("m3")).is_some());
    assert_eq!(rt.len(), 1);
}

#[test]
fn fanout_isolates_panicking_observer() {
    let (publisher, _tx) = BroadcastObserver::new(64);
    let mut rx = publisher.subscribe();
    let fanout = FanoutObserver::new()
        .with(PanickingObserver)
        .with(publisher)
        .with(TracingObserver);
    assert_eq!(fanout.len(), 3);

    let mut rt = QueueRuntime::new(QueueConfig::default(), fanout);
    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.try_dequeue(None).unwrap();

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], QueueEvent::Enqueued { queue_len: 1, .. }));
    assert!(matches!(events[1], QueueEvent::Dequeued { .. }));
}

#[tokio::test]
async fn broadcast_subscribers_see_transitions_in_order() {
    let (observer, tx) = BroadcastObserver::new(16);
    let mut rx = tx.subscribe();
    let mut rt = QueueRuntime::new(QueueConfig::default(), observer);

    rt.enqueue(NewQueueItem::message("m1")).unwrap();
    rt.try_dequeue(Some(BlockedReason::Streaming));
    rt.try_dequeue(None).unwrap();
    rt.clear(ClearReason::Processed);

    assert!(matches!(rx.recv().await.unwrap(), QueueEvent::Enqueued { .. }));
    assert!(matches!(
        rx.recv().await.unwrap(),
        QueueEvent::Blocked {
            reason: BlockedReason::Streaming,
            queue_len: 1
        }
    ));
    assert!(matches!(rx.recv().await.unwrap(), QueueEvent::Dequeued { .. }));
    assert!(matches!(
        rx.recv().await.unwrap(),
        QueueEvent::Cleared {
            removed_count: 0,
            ..
        }
    ));
}

#[test]
fn queue_event_serializes_with_event_tag() {
    let event = QueueEvent::Cleared {
        reason: ClearReason::Cancelled,
        removed_count: 3,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["event"], "cleared");
    assert_eq!(json["reason"], "cancelled");
    assert_eq!(json["removed_count"], 3);
}

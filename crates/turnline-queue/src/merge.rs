//! Turn content merger
//!
//! Turns a dequeued batch into the content of one outgoing user turn. Pure:
//! merging the same inputs twice yields equal content, so a failed send can
//! be retried by merging the batch again.

use turnline_core::{Content, ContentPart, DequeuedBatch, ItemPayload, QueueItem};

pub const DEFAULT_SEPARATOR: &str = "\n";

/// One mergeable input. `T` is the host's raw user content.
#[derive(Clone, Debug, PartialEq)]
pub enum QueuedTurnInput<T> {
    User(T),
    TaskNotification(String),
}

impl QueuedTurnInput<Content> {
    /// Barriers have no merged form and yield `None`.
    pub fn from_item(item: &QueueItem) -> Option<Self> {
        match &item.payload {
            ItemPayload::Message { content } => Some(QueuedTurnInput::User(content.clone())),
            ItemPayload::TaskNotification { text } => {
                Some(QueuedTurnInput::TaskNotification(text.clone()))
            }
            ItemPayload::ApprovalResult { .. } | ItemPayload::OverlayAction { .. } => None,
        }
    }

    /// Merger inputs for every coalescable item of a batch, in order.
    pub fn from_batch(batch: &DequeuedBatch) -> Vec<Self> {
        batch.items.iter().filter_map(Self::from_item).collect()
    }
}

/// Merge with the default `"\n"` separator.
pub fn merge_queued_turn_input<T, F>(items: &[QueuedTurnInput<T>], normalize: F) -> Option<Content>
where
    F: Fn(&T) -> Content,
{
    merge_queued_turn_input_with_separator(items, normalize, &Content::from(DEFAULT_SEPARATOR))
}

/// Merge `items` into one multimodal content, `separator` between neighbours.
///
/// Returns `None` for an empty slice; callers treat that as nothing to send.
/// `normalize` resolves host-specific references in user content (paste
/// placeholders and the like) into final parts.
pub fn merge_queued_turn_input_with_separator<T, F>(
    items: &[QueuedTurnInput<T>],
    normalize: F,
    separator: &Content,
) -> Option<Content>
where
    F: Fn(&T) -> Content,
{
    if items.is_empty() {
        return None;
    }

    let mut parts: Vec<ContentPart> = Vec::new();
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            parts.extend(separator.clone().into_parts());
        }
        match item {
            QueuedTurnInput::TaskNotification(text) => parts.push(ContentPart::text(text.clone())),
            QueuedTurnInput::User(raw) => parts.extend(normalize(raw).into_parts()),
        }
    }
    Some(Content::Parts(parts))
}

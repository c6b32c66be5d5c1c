//! Queue item model and the coalescability classifier

use crate::content::Content;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Item identifier, assigned at enqueue and strictly increasing per runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(u64);

impl ItemId {
    pub fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q-{}", self.0)
    }
}

/// Batch identifier, one per successful dequeue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(u64);

impl BatchId {
    pub fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

/// Producer that created an item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    User,
    TaskNotification,
    Subagent,
    System,
}

/// Fieldless mirror of [`ItemPayload`] variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Message,
    TaskNotification,
    ApprovalResult,
    OverlayAction,
}

impl ItemKind {
    pub fn is_coalescable(self) -> bool {
        is_coalescable(self)
    }

    fn default_source(self) -> ItemSource {
        match self {
            ItemKind::Message | ItemKind::ApprovalResult => ItemSource::User,
            ItemKind::TaskNotification => ItemSource::TaskNotification,
            ItemKind::OverlayAction => ItemSource::System,
        }
    }
}

/// Whether items of `kind` may be merged with adjacent items into one turn.
///
/// Both the soft-limit eviction in `enqueue` and the batch boundary in
/// `try_dequeue` go through this function.
pub fn is_coalescable(kind: ItemKind) -> bool {
    match kind {
        ItemKind::Message | ItemKind::TaskNotification => true,
        ItemKind::ApprovalResult | ItemKind::OverlayAction => false,
    }
}

/// What an item carries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemPayload {
    /// User chat input, plain or multimodal
    Message { content: Content },
    /// Pre-formatted background task notification
    TaskNotification { text: String },
    /// Result of an approval decision
    ApprovalResult { text: String },
    /// Administrative or UI-triggered action
    OverlayAction { text: String },
}

impl ItemPayload {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemPayload::Message { .. } => ItemKind::Message,
            ItemPayload::TaskNotification { .. } => ItemKind::TaskNotification,
            ItemPayload::ApprovalResult { .. } => ItemKind::ApprovalResult,
            ItemPayload::OverlayAction { .. } => ItemKind::OverlayAction,
        }
    }
}

/// Identity metadata shared by every queued item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemBase {
    pub id: ItemId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
    pub source: ItemSource,
    pub enqueued_at: DateTime<Utc>,
}

/// An item as stored by the queue. Never mutated after enqueue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    #[serde(flatten)]
    pub base: ItemBase,
    #[serde(flatten)]
    pub payload: ItemPayload,
}

impl QueueItem {
    /// Stamp a new item with its identity.
    pub fn from_new(item: NewQueueItem, id: ItemId, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            base: ItemBase {
                id,
                client_message_id: item.client_message_id,
                source: item.source,
                enqueued_at,
            },
            payload: item.payload,
        }
    }

    pub fn id(&self) -> ItemId {
        self.base.id
    }

    pub fn kind(&self) -> ItemKind {
        self.payload.kind()
    }

    pub fn is_coalescable(&self) -> bool {
        is_coalescable(self.kind())
    }

    pub fn source(&self) -> ItemSource {
        self.base.source
    }

    pub fn client_message_id(&self) -> Option<&str> {
        self.base.client_message_id.as_deref()
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.base.enqueued_at
    }
}

/// An item handed to `enqueue`, before it has an id or timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct NewQueueItem {
    pub client_message_id: Option<String>,
    pub source: ItemSource,
    pub payload: ItemPayload,
}

impl NewQueueItem {
    pub fn new(payload: ItemPayload) -> Self {
        Self {
            client_message_id: None,
            source: payload.kind().default_source(),
            payload,
        }
    }

    pub fn message(content: impl Into<Content>) -> Self {
        Self::new(ItemPayload::Message {
            content: content.into(),
        })
    }

    pub fn task_notification(text: impl Into<String>) -> Self {
        Self::new(ItemPayload::TaskNotification { text: text.into() })
    }

    pub fn approval_result(text: impl Into<String>) -> Self {
        Self::new(ItemPayload::ApprovalResult { text: text.into() })
    }

    pub fn overlay_action(text: impl Into<String>) -> Self {
        Self::new(ItemPayload::OverlayAction { text: text.into() })
    }

    pub fn with_client_message_id(mut self, id: impl Into<String>) -> Self {
        self.client_message_id = Some(id.into());
        self
    }

    pub fn with_source(mut self, source: ItemSource) -> Self {
        self.source = source;
        self
    }

    pub fn kind(&self) -> ItemKind {
        self.payload.kind()
    }

    pub fn is_coalescable(&self) -> bool {
        is_coalescable(self.kind())
    }
}

/// Items removed by one successful dequeue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DequeuedBatch {
    pub batch_id: BatchId,
    pub items: Vec<QueueItem>,
    pub merged_count: usize,
    pub queue_len_after: usize,
}

impl DequeuedBatch {
    /// True when the batch is a single non-coalescable item.
    pub fn is_barrier(&self) -> bool {
        matches!(self.items.as_slice(), [only] if !only.is_coalescable())
    }

    pub fn client_message_ids(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(QueueItem::client_message_id)
            .collect()
    }
}

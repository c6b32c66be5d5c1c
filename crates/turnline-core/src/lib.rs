//! turnline core - item model, content model, and error handling

pub mod content;
pub mod error;
pub mod item;
pub mod reason;

pub use content::{Content, ContentPart, ImageSource};
pub use error::{Error, Result};
pub use item::{
    is_coalescable, BatchId, DequeuedBatch, ItemBase, ItemId, ItemKind, ItemPayload,
    ItemSource, NewQueueItem, QueueItem,
};
pub use reason::{BlockedReason, ClearReason, DropReason};

//! Reasons carried by queue notifications

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the turn driver cannot start a new turn right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedReason {
    /// A turn is already streaming
    Streaming,
    /// Approval decisions are still outstanding
    PendingApprovals,
    /// A modal overlay owns the input
    OverlayOpen,
    /// A local command is executing
    CommandRunning,
    /// The previous turn is being interrupted
    InterruptInProgress,
    /// Catch-all for host-side busy states
    RuntimeBusy,
}

impl BlockedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockedReason::Streaming => "streaming",
            BlockedReason::PendingApprovals => "pending_approvals",
            BlockedReason::OverlayOpen => "overlay_open",
            BlockedReason::CommandRunning => "command_running",
            BlockedReason::InterruptInProgress => "interrupt_in_progress",
            BlockedReason::RuntimeBusy => "runtime_busy",
        }
    }
}

/// Why an item left the queue without being dequeued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    BufferLimit,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::BufferLimit => "buffer_limit",
        }
    }
}

/// Why the whole queue was emptied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearReason {
    Processed,
    Error,
    Cancelled,
    Shutdown,
    StaleGeneration,
}

impl ClearReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClearReason::Processed => "processed",
            ClearReason::Error => "error",
            ClearReason::Cancelled => "cancelled",
            ClearReason::Shutdown => "shutdown",
            ClearReason::StaleGeneration => "stale_generation",
        }
    }
}

impl fmt::Display for BlockedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ClearReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

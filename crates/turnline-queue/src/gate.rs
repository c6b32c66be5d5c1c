//! Turn gate - the driver-side conditions that keep a new turn from starting

use serde::{Deserialize, Serialize};
use turnline_core::BlockedReason;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnGate {
    pub streaming: bool,
    pub pending_approvals: bool,
    pub overlay_open: bool,
    pub command_running: bool,
    pub interrupt_in_progress: bool,
}

impl TurnGate {
    /// The reason to pass to `try_dequeue`, or `None` when a turn may start.
    ///
    /// When several gates are closed the most specific one wins.
    pub fn blocked_reason(&self) -> Option<BlockedReason> {
        if self.interrupt_in_progress {
            Some(BlockedReason::InterruptInProgress)
        } else if self.pending_approvals {
            Some(BlockedReason::PendingApprovals)
        } else if self.overlay_open {
            Some(BlockedReason::OverlayOpen)
        } else if self.command_running {
            Some(BlockedReason::CommandRunning)
        } else if self.streaming {
            Some(BlockedReason::Streaming)
        } else {
            None
        }
    }

    pub fn is_open(&self) -> bool {
        self.blocked_reason().is_none()
    }
}

//! turnline queue - bounded turn queue runtime and turn content merger

pub mod config;
pub mod gate;
pub mod merge;
pub mod observer;
pub mod runtime;

pub use config::QueueConfig;
pub use gate::TurnGate;
pub use merge::{
    merge_queued_turn_input, merge_queued_turn_input_with_separator, QueuedTurnInput,
    DEFAULT_SEPARATOR,
};
pub use observer::{
    BroadcastObserver, FanoutObserver, NoopObserver, QueueEvent, QueueObserver, TracingObserver,
};
pub use runtime::{QueueRuntime, QueueStats};

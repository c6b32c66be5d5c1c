//! turnline - a bounded turn queue and the demo driver around it

pub mod driver;
pub mod settings;

pub use driver::{parse_line, InputLine, PasteStore, Turn, TurnDriver, TurnPayload};
pub use settings::{DriverConfig, Settings};
